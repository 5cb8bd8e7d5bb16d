//! Requests and request handlers.
//!
//! A [`Request`] is an opaque value tagged with its response type. Exactly one
//! [`RequestHandler`] is registered per request type; the runtime resolves it by
//! the request's concrete type, never by a name the caller supplies.
//!
//! # Type Erasure
//!
//! Callers that only hold a request behind a trait object use [`AnyRequest`],
//! which every `Request` implements. It exposes the concrete [`TypeId`] so the
//! registry can still find the right handler.

use crate::error::Result;
use crate::BoxFuture;
use std::any::{Any, TypeId};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;

/// A one-shot operation handled by exactly one handler.
///
/// # Thread Safety
///
/// Requests must be `Send + Sync + 'static`: they are borrowed by every
/// behavior in the pipeline and may cross `.await` points on any executor.
///
/// # Example
///
/// ```
/// use mediator_core::Request;
///
/// #[derive(Debug, Clone)]
/// struct GetUser {
///     id: u64,
/// }
///
/// impl Request for GetUser {
///     type Response = Option<String>;
/// }
/// ```
pub trait Request: fmt::Debug + Send + Sync + 'static {
    /// The value the handler produces
    type Response: Send + 'static;
}

/// Handles one request type.
///
/// The handler borrows the request for the duration of the call and receives
/// the cancellation signal threaded through from `send`. A well-behaved handler
/// checks it at each suspension point.
///
/// # Dyn Compatibility
///
/// Returns an explicit [`BoxFuture`] instead of using `async fn` so handlers can
/// be stored as `Arc<dyn RequestHandler<R>>` in the registry.
pub trait RequestHandler<R: Request>: Send + Sync {
    /// Process the request and produce its response.
    ///
    /// # Errors
    ///
    /// Any error is propagated unchanged to the caller of `send`.
    fn handle<'a>(
        &'a self,
        request: &'a R,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<R::Response>>;
}

/// Closure-backed request handler.
///
/// Wraps `F: Fn(R, CancellationToken) -> Fut`, producing a fresh future per call
/// from a clone of the request. Use `Arc<...>` inside the closure for shared state.
///
/// # Example
///
/// ```
/// use mediator_core::request::FnHandler;
/// use mediator_core::{CancellationToken, MediatorError, Request, RequestHandler};
///
/// #[derive(Debug, Clone)]
/// struct Add(i32, i32);
///
/// impl Request for Add {
///     type Response = i32;
/// }
///
/// let handler = FnHandler::<Add, _>::new(|Add(a, b): Add, _cancel: CancellationToken| async move {
///     Ok::<_, MediatorError>(a + b)
/// });
/// let sum = futures::executor::block_on(handler.handle(&Add(2, 3), &CancellationToken::new()));
/// assert_eq!(sum.ok(), Some(5));
/// ```
pub struct FnHandler<R, F> {
    f: F,
    _request: PhantomData<fn(R)>,
}

impl<R, F> FnHandler<R, F> {
    /// Create a new closure-backed handler
    pub const fn new(f: F) -> Self {
        Self {
            f,
            _request: PhantomData,
        }
    }
}

impl<R, F, Fut> RequestHandler<R> for FnHandler<R, F>
where
    R: Request + Clone,
    F: Fn(R, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R::Response>> + Send + 'static,
{
    fn handle<'a>(
        &'a self,
        request: &'a R,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<R::Response>> {
        Box::pin((self.f)(request.clone(), cancel.clone()))
    }
}

/// A request viewed through a trait object with a known response type.
///
/// Blanket-implemented for every [`Request`]; callers never implement it.
pub trait AnyRequest<Resp>: fmt::Debug + Send + Sync {
    /// [`TypeId`] of the concrete request type
    fn request_type_id(&self) -> TypeId;

    /// Name of the concrete request type
    fn request_type_name(&self) -> &'static str;

    /// Convert into `Any` so the runtime can recover the concrete type
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;
}

impl<R: Request> AnyRequest<R::Response> for R {
    fn request_type_id(&self) -> TypeId {
        TypeId::of::<R>()
    }

    fn request_type_name(&self) -> &'static str {
        std::any::type_name::<R>()
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Ping;

    impl Request for Ping {
        type Response = &'static str;
    }

    #[derive(Debug)]
    struct Other;

    impl Request for Other {
        type Response = &'static str;
    }

    #[test]
    fn test_erased_request_keeps_concrete_type() {
        let requests: Vec<Box<dyn AnyRequest<&'static str>>> = vec![Box::new(Ping), Box::new(Other)];

        assert_eq!(requests[0].request_type_id(), TypeId::of::<Ping>());
        assert_eq!(requests[1].request_type_id(), TypeId::of::<Other>());
        assert!(requests[0].request_type_name().ends_with("Ping"));
    }

    #[test]
    fn test_into_any_downcasts() {
        let request: Box<dyn AnyRequest<&'static str>> = Box::new(Ping);
        let any = request.into_any();
        assert!(any.downcast::<Ping>().is_ok());
    }

    #[test]
    fn test_fn_handler_is_executor_agnostic() {
        let handler = FnHandler::<Ping, _>::new(|_: Ping, _: CancellationToken| async {
            Ok::<_, crate::MediatorError>("pong")
        });

        let reply = tokio_test::block_on(handler.handle(&Ping, &CancellationToken::new()));
        tokio_test::assert_ok!(&reply);
    }

    #[tokio::test]
    async fn test_fn_handler_receives_clone() {
        let handler = FnHandler::<Ping, _>::new(|_: Ping, cancel: CancellationToken| async move {
            let reply = if cancel.is_cancelled() { "cancelled" } else { "pong" };
            Ok::<_, crate::MediatorError>(reply)
        });

        let token = CancellationToken::new();
        assert_eq!(handler.handle(&Ping, &token).await.ok(), Some("pong"));

        token.cancel();
        assert_eq!(handler.handle(&Ping, &token).await.ok(), Some("cancelled"));
    }
}
