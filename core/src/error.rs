//! Error taxonomy for request and notification dispatch.
//!
//! Every fallible operation in the mediator returns [`Result`], whose error side is
//! [`MediatorError`]. Handlers and behaviors return the same type, so a failure raised
//! deep inside a pipeline reaches the caller of `send`/`publish` unchanged.
//!
//! # Categories
//!
//! - **Resolution**: [`MediatorError::HandlerNotFound`], [`MediatorError::DuplicateHandler`]
//! - **Processing**: [`MediatorError::HandlerFailure`], [`MediatorError::Cancelled`]
//! - **Fan-out**: [`MediatorError::AggregateFailure`]
//! - **Type erasure**: [`MediatorError::ResponseTypeMismatch`]

use thiserror::Error;

/// Boxed error produced by handler or behavior business logic.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the mediator.
pub type Result<T> = std::result::Result<T, MediatorError>;

/// Errors that can occur while dispatching requests and notifications.
#[derive(Error, Debug)]
pub enum MediatorError {
    /// No handler is registered for the request/response pair.
    ///
    /// Always fatal to the `send` call. The mediator never retries it.
    #[error("No handler registered for request `{request}` with response `{response}`")]
    HandlerNotFound {
        /// Type name of the request
        request: &'static str,
        /// Type name of the declared response
        response: &'static str,
    },

    /// Two handlers were registered for the same request/response pair.
    ///
    /// Returned by the registry builder; dispatch never produces it.
    #[error("Duplicate handler registered for request `{request}` with response `{response}`")]
    DuplicateHandler {
        /// Type name of the request
        request: &'static str,
        /// Type name of the declared response
        response: &'static str,
    },

    /// A handler or behavior raised an error while processing.
    #[error("Handler failed: {0}")]
    HandlerFailure(#[source] BoxError),

    /// One or more concurrently invoked notification handlers failed.
    #[error("{} notification handler(s) failed", .0.len())]
    AggregateFailure(Vec<MediatorError>),

    /// A type-erased value did not have the expected concrete type.
    ///
    /// Raised for responses returned through an open behavior, and also for
    /// erased request or notification inputs whose downcast fails. `expected`
    /// names the response, request or notification type that was wanted.
    #[error("Erased type mismatch: expected `{expected}`")]
    ResponseTypeMismatch {
        /// Type name that was expected
        expected: &'static str,
    },

    /// The operation observed its cancellation signal and stopped early.
    #[error("Operation cancelled")]
    Cancelled,
}

impl MediatorError {
    /// Wrap a business-logic error raised by a handler or behavior.
    ///
    /// # Examples
    ///
    /// ```
    /// use mediator_core::error::MediatorError;
    ///
    /// let err = MediatorError::handler("database unavailable");
    /// assert!(err.is_handler_failure());
    /// ```
    pub fn handler(error: impl Into<BoxError>) -> Self {
        Self::HandlerFailure(error.into())
    }

    /// Check whether this is a [`MediatorError::HandlerNotFound`]
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::HandlerNotFound { .. })
    }

    /// Check whether this is a [`MediatorError::HandlerFailure`]
    #[must_use]
    pub const fn is_handler_failure(&self) -> bool {
        matches!(self, Self::HandlerFailure(_))
    }

    /// Underlying failures of an aggregate, or a single-element slice otherwise.
    #[must_use]
    pub fn failures(&self) -> &[Self] {
        match self {
            Self::AggregateFailure(errors) => errors,
            other => std::slice::from_ref(other),
        }
    }
}
