//! Pipeline composition utilities
//!
//! This module builds the nested middleware chain around a handler call:
//! - **`compose`**: wrap a terminal continuation with an ordered list of behaviors
//!
//! Composition starts from the terminal call and wraps it with the **last**
//! behavior first, so the **first** registered behavior ends up outermost:
//!
//! ```text
//! Behavior1(pre) → Behavior2(pre) → Handler → Behavior2(post) → Behavior1(post)
//! ```
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use mediator_core::{
//!     compose, BoxFuture, CancellationToken, Next, PipelineBehavior, Request, Result,
//! };
//!
//! #[derive(Debug)]
//! struct Echo {
//!     text: String,
//! }
//!
//! impl Request for Echo {
//!     type Response = String;
//! }
//!
//! struct Suffix(&'static str);
//!
//! impl PipelineBehavior<Echo> for Suffix {
//!     fn handle<'a>(
//!         &'a self,
//!         _request: &'a Echo,
//!         next: Next<'a, String>,
//!         _cancel: &'a CancellationToken,
//!     ) -> BoxFuture<'a, Result<String>> {
//!         Box::pin(async move { Ok(format!("{}{}", next.run().await?, self.0)) })
//!     }
//! }
//!
//! let behaviors: Vec<Arc<dyn PipelineBehavior<Echo>>> =
//!     vec![Arc::new(Suffix("-outer")), Arc::new(Suffix("-inner"))];
//! let request = Echo { text: "a".to_string() };
//! let cancel = CancellationToken::new();
//!
//! let terminal = Next::from_future(async { Ok("aa".to_string()) });
//! let pipeline = compose(&behaviors, &request, &cancel, terminal);
//!
//! let response = futures::executor::block_on(pipeline.run());
//! assert_eq!(response.ok().as_deref(), Some("aa-inner-outer"));
//! ```

use crate::behavior::{Next, PipelineBehavior};
use crate::request::Request;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Wraps `terminal` with `behaviors`, first behavior outermost.
///
/// Nothing runs until the returned continuation is [`run`](Next::run). Every
/// behavior receives the same request borrow and the same cancellation signal.
///
/// With no behaviors the terminal continuation is returned as-is.
///
/// # Type Parameters
///
/// - `R`: The request type the pipeline handles
#[must_use]
pub fn compose<'a, R: Request>(
    behaviors: &'a [Arc<dyn PipelineBehavior<R>>],
    request: &'a R,
    cancel: &'a CancellationToken,
    terminal: Next<'a, R::Response>,
) -> Next<'a, R::Response> {
    behaviors.iter().rev().fold(terminal, |next, behavior| {
        Next::new(move || behavior.handle(request, next, cancel))
    })
}
