//! # Mediator Core
//!
//! Core traits and types for in-process request/notification dispatch.
//!
//! This crate defines the contracts that the runtime's `Mediator` coordinates.
//! It performs no dispatch itself: it only says what a request, a handler, a
//! behavior and a fan-out strategy look like.
//!
//! ## Core Concepts
//!
//! - **Request**: a value with a compile-time response type, handled by exactly one handler
//! - **Notification**: a broadcast value with zero-to-many handlers
//! - **Behavior**: middleware wrapped around a request's handler (caching, timing, logging)
//! - **Next**: the continuation a behavior calls to run the rest of the pipeline
//! - **Fan-out strategy**: how notification handlers are invoked (sequential, concurrent)
//! - **Environment**: clock and session access injected via traits
//!
//! ## Pipeline Ordering
//!
//! The first-registered behavior is the outermost wrapper:
//!
//! ```text
//! Behavior1(pre) → Behavior2(pre) → Handler → Behavior2(post) → Behavior1(post)
//! ```
//!
//! ## Example
//!
//! ```
//! use mediator_core::{BoxFuture, CancellationToken, Request, RequestHandler, Result};
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
//! struct EchoHandler;
//!
//! impl RequestHandler<Echo> for EchoHandler {
//!     fn handle<'a>(
//!         &'a self,
//!         request: &'a Echo,
//!         _cancel: &'a CancellationToken,
//!     ) -> BoxFuture<'a, Result<String>> {
//!         Box::pin(async move { Ok(format!("{0}{0}", request.text)) })
//!     }
//! }
//!
//! let response = futures::executor::block_on(
//!     EchoHandler.handle(&Echo { text: "a".to_string() }, &CancellationToken::new()),
//! );
//! assert_eq!(response.ok().as_deref(), Some("aa"));
//! ```

use std::future::Future;
use std::pin::Pin;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};
pub use tokio_util::sync::CancellationToken;

/// Error taxonomy shared by handlers, behaviors and the runtime
pub mod error;

/// Requests, request handlers and their type-erased form
pub mod request;

/// Notifications, notification handlers and their type-erased form
pub mod notification;

/// Pipeline behaviors and the `Next` continuation
pub mod behavior;

/// Pipeline composition around a terminal handler call
pub mod composition;

/// Fan-out strategy contract for notification publishing
pub mod publisher;

/// Cacheable request marker and cache store boundary
pub mod cache;

/// Boxed, sendable future returned by every dyn-compatible trait in this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use behavior::{ErasedResponse, Next, OpenBehavior, PipelineBehavior, RequestContext};
pub use cache::{CacheError, CacheStore, CacheableRequest};
pub use composition::compose;
pub use error::{BoxError, MediatorError, Result};
pub use notification::{AnyNotification, Notification, NotificationHandler};
pub use publisher::{FanOutStrategy, HandlerInvocation};
pub use request::{AnyRequest, Request, RequestHandler};

/// Environment module - Dependency injection traits
///
/// Behaviors never reach for global state. Time and the current user come
/// from these traits so tests can substitute deterministic implementations.
pub mod environment {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - uses system clock
    /// let clock = SystemClock;
    ///
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time from the operating system
    ///
    /// Not monotonic. If the system clock steps backwards while something is
    /// being timed, the measured span is negative and
    /// `PerformanceBehavior` treats it as zero elapsed time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Identity of the caller on whose behalf a request runs.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct SessionInfo {
        /// Stable user identifier
        pub user_id: Option<String>,
        /// Display name
        pub user_name: Option<String>,
        /// Contact email
        pub email: Option<String>,
        /// Granted roles
        pub roles: Vec<String>,
        /// Whether the session is authenticated
        pub is_authenticated: bool,
    }

    impl SessionInfo {
        /// Create an authenticated session for a named user
        #[must_use]
        pub fn authenticated(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
            Self {
                user_id: Some(user_id.into()),
                user_name: Some(user_name.into()),
                is_authenticated: true,
                ..Self::default()
            }
        }

        /// Create the guest session used when nobody is signed in
        #[must_use]
        pub fn anonymous() -> Self {
            Self {
                user_name: Some("Anonymous".to_string()),
                ..Self::default()
            }
        }

        /// Add a role
        #[must_use]
        pub fn with_role(mut self, role: impl Into<String>) -> Self {
            self.roles.push(role.into());
            self
        }
    }

    /// Supplies the session of the current caller, if any.
    pub trait SessionAccessor: Send + Sync {
        /// The current session, or `None` outside of a user context
        fn current_session(&self) -> Option<SessionInfo>;

        /// Convenience accessor for the user name of the current session
        fn current_user(&self) -> Option<String> {
            self.current_session().and_then(|session| session.user_name)
        }
    }

    /// Session accessor for background work with no user attached
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NoSession;

    impl SessionAccessor for NoSession {
        fn current_session(&self) -> Option<SessionInfo> {
            None
        }
    }
}
