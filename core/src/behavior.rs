//! Pipeline behaviors.
//!
//! A behavior wraps the handling of a request. It receives the request, a
//! [`Next`] continuation representing the rest of the pipeline, and the
//! cancellation signal. It may:
//!
//! - run logic before calling `next`, after it, or both
//! - call `next` exactly once (normal continuation)
//! - never call `next` and return its own response (short-circuit)
//!
//! [`Next`] is consumed by [`Next::run`], so a behavior cannot invoke the rest
//! of the pipeline twice.
//!
//! # Typed and Open Behaviors
//!
//! - [`PipelineBehavior<R>`] applies to one request type and sees its real
//!   request and response types (for example, caching a cacheable query).
//! - [`OpenBehavior`] applies to every request type. It sees a
//!   [`RequestContext`] and a type-erased response, which is enough for
//!   instrumentation such as timing or logging.

use crate::BoxFuture;
use crate::error::{MediatorError, Result};
use crate::request::Request;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Response of a request whose concrete type is hidden from an [`OpenBehavior`].
pub type ErasedResponse = Box<dyn Any + Send>;

/// The rest of the pipeline, as seen from one behavior.
///
/// Calling [`run`](Next::run) consumes the continuation. Dropping it without
/// calling `run` short-circuits everything downstream: inner behaviors and the
/// handler never execute.
pub struct Next<'a, T> {
    step: Box<dyn FnOnce() -> BoxFuture<'a, Result<T>> + Send + 'a>,
}

impl<'a, T: 'a> Next<'a, T> {
    /// Create a continuation from a closure that starts the next stage.
    pub fn new<F>(step: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'a, Result<T>> + Send + 'a,
    {
        Self {
            step: Box::new(step),
        }
    }

    /// Create a continuation from a future that has not been polled yet.
    pub fn from_future<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = Result<T>> + Send + 'a,
    {
        Self::new(move || Box::pin(future))
    }

    /// Run the rest of the pipeline.
    ///
    /// # Errors
    ///
    /// Returns whatever error an inner behavior or the handler produced.
    pub fn run(self) -> BoxFuture<'a, Result<T>> {
        (self.step)()
    }

    /// Hide the response type so an [`OpenBehavior`] can drive this continuation.
    #[must_use]
    pub fn erase(self) -> Next<'a, ErasedResponse>
    where
        T: Send + 'static,
    {
        Next::new(move || {
            Box::pin(async move {
                let response = self.run().await?;
                Ok(Box::new(response) as ErasedResponse)
            })
        })
    }
}

impl<T> fmt::Debug for Next<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Next(<continuation>)")
    }
}

/// Middleware around the handling of one request type.
///
/// # Example
///
/// ```
/// use mediator_core::{BoxFuture, CancellationToken, Next, PipelineBehavior, Request, Result};
///
/// #[derive(Debug)]
/// struct Echo {
///     text: String,
/// }
///
/// impl Request for Echo {
///     type Response = String;
/// }
///
/// /// Prefixes every response.
/// struct Wrapped;
///
/// impl PipelineBehavior<Echo> for Wrapped {
///     fn handle<'a>(
///         &'a self,
///         _request: &'a Echo,
///         next: Next<'a, String>,
///         _cancel: &'a CancellationToken,
///     ) -> BoxFuture<'a, Result<String>> {
///         Box::pin(async move {
///             let response = next.run().await?;
///             Ok(format!("wrapped:{response}"))
///         })
///     }
/// }
/// ```
pub trait PipelineBehavior<R: Request>: Send + Sync {
    /// Handle the request, optionally delegating to `next`.
    ///
    /// # Errors
    ///
    /// An error raised before calling `next` aborts the pipeline; an error
    /// raised after it discards the downstream response. Either way it
    /// reaches the caller unchanged.
    fn handle<'a>(
        &'a self,
        request: &'a R,
        next: Next<'a, R::Response>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<R::Response>>;
}

/// What an [`OpenBehavior`] can see of the request it wraps.
#[derive(Clone, Copy)]
pub struct RequestContext<'a> {
    type_name: &'static str,
    request: &'a (dyn fmt::Debug + Send + Sync),
}

impl<'a> RequestContext<'a> {
    /// Build the context for a concrete request
    pub fn of<R: Request>(request: &'a R) -> Self {
        Self {
            type_name: std::any::type_name::<R>(),
            request,
        }
    }

    /// Fully qualified type name of the request
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Type name without its module path
    #[must_use]
    pub fn short_type_name(&self) -> &'static str {
        let base = self.type_name.split('<').next().unwrap_or(self.type_name);
        base.rsplit("::").next().unwrap_or(base)
    }

    /// Debug view of the request
    #[must_use]
    pub const fn request(&self) -> &'a (dyn fmt::Debug + Send + Sync) {
        self.request
    }
}

impl fmt::Debug for RequestContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("type_name", &self.type_name)
            .field("request", &self.request)
            .finish()
    }
}

/// Middleware that applies to every request type.
///
/// The response is type-erased. An open behavior that short-circuits must
/// return a value of the request's real response type, otherwise the call
/// fails with [`MediatorError::ResponseTypeMismatch`].
pub trait OpenBehavior: Send + Sync {
    /// Handle the request, optionally delegating to `next`.
    ///
    /// # Errors
    ///
    /// Same propagation rules as [`PipelineBehavior::handle`].
    fn handle<'a>(
        &'a self,
        context: RequestContext<'a>,
        next: Next<'a, ErasedResponse>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ErasedResponse>>;
}

/// Presents an [`OpenBehavior`] as a [`PipelineBehavior`] for one request type.
pub struct OpenBehaviorAdapter<R> {
    behavior: Arc<dyn OpenBehavior>,
    _request: PhantomData<fn(R)>,
}

impl<R> OpenBehaviorAdapter<R> {
    /// Adapt an open behavior to request type `R`
    #[must_use]
    pub fn new(behavior: Arc<dyn OpenBehavior>) -> Self {
        Self {
            behavior,
            _request: PhantomData,
        }
    }
}

impl<R: Request> PipelineBehavior<R> for OpenBehaviorAdapter<R> {
    fn handle<'a>(
        &'a self,
        request: &'a R,
        next: Next<'a, R::Response>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<R::Response>> {
        Box::pin(async move {
            let context = RequestContext::of(request);
            let response = self.behavior.handle(context, next.erase(), cancel).await?;
            response
                .downcast::<R::Response>()
                .map(|boxed| *boxed)
                .map_err(|_| MediatorError::ResponseTypeMismatch {
                    expected: std::any::type_name::<R::Response>(),
                })
        })
    }
}
