//! Fan-out strategy contract.
//!
//! Publishing a notification resolves its handlers, turns each into a
//! [`HandlerInvocation`], and hands the ordered list to a [`FanOutStrategy`].
//! The strategy alone decides whether invocations run one after another or
//! concurrently, and how failures are reported.
//!
//! Invocations are deferred calls: a handler's `handle` is not even called
//! until the strategy runs its invocation. A strategy that stops early drops
//! the remaining invocations and those handlers never start.

use crate::BoxFuture;
use crate::error::Result;
use std::fmt;

/// One pending call of a notification handler.
pub struct HandlerInvocation<'a> {
    handler: &'static str,
    call: Box<dyn FnOnce() -> BoxFuture<'a, Result<()>> + Send + 'a>,
}

impl<'a> HandlerInvocation<'a> {
    /// Pair a handler name with the closure that starts it
    #[must_use]
    pub fn new<F>(handler: &'static str, call: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'a, Result<()>> + Send + 'a,
    {
        Self {
            handler,
            call: Box::new(call),
        }
    }

    /// Name of the handler, for logs
    #[must_use]
    pub const fn handler(&self) -> &'static str {
        self.handler
    }

    /// Start the handler
    ///
    /// # Errors
    ///
    /// The returned future yields the handler's own failure.
    #[must_use]
    pub fn run(self) -> BoxFuture<'a, Result<()>> {
        (self.call)()
    }
}

impl fmt::Debug for HandlerInvocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerInvocation")
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

/// Decides how the handlers of one notification are invoked.
///
/// Invocations arrive in handler registration order. The strategy is only
/// called when at least one handler exists.
///
/// # Dyn Compatibility
///
/// Stored as `Arc<dyn FanOutStrategy>` inside the mediator, so the method
/// returns a [`BoxFuture`] rather than using `async fn`.
pub trait FanOutStrategy: Send + Sync {
    /// Run the invocations and report the outcome.
    ///
    /// # Errors
    ///
    /// Returns the failure (or failures) of the handlers, as the strategy
    /// defines it.
    fn publish<'a>(&'a self, invocations: Vec<HandlerInvocation<'a>>) -> BoxFuture<'a, Result<()>>;

    /// Strategy name, for logs
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediatorError;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Runs only the first invocation.
    struct FirstOnly;

    impl FanOutStrategy for FirstOnly {
        fn publish<'a>(
            &'a self,
            invocations: Vec<HandlerInvocation<'a>>,
        ) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                match invocations.into_iter().next() {
                    Some(first) => first.run().await,
                    None => Ok(()),
                }
            })
        }

        fn name(&self) -> &'static str {
            "first-only"
        }
    }

    #[tokio::test]
    async fn test_strategy_drops_unstarted_invocations() {
        let started = AtomicBool::new(false);
        let invocations = vec![
            HandlerInvocation::new("ok", || Box::pin(async { Ok(()) })),
            HandlerInvocation::new("never", || {
                started.store(true, Ordering::SeqCst);
                Box::pin(async { Err(MediatorError::handler("must not run")) })
            }),
        ];
        assert_eq!(invocations[1].handler(), "never");

        let strategy: &dyn FanOutStrategy = &FirstOnly;
        assert!(strategy.publish(invocations).await.is_ok());
        assert_eq!(strategy.name(), "first-only");
        assert!(!started.load(Ordering::SeqCst));
    }

    #[test]
    fn test_invocation_debug_hides_call() {
        let invocation = HandlerInvocation::new("audit", || Box::pin(async { Ok(()) }));
        assert!(format!("{invocation:?}").contains("audit"));
    }
}
