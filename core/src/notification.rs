//! Notifications and notification handlers.
//!
//! A [`Notification`] is a broadcast value with no response. Any number of
//! [`NotificationHandler`]s may be registered for one notification type,
//! including none at all: publishing with no handlers is a successful no-op.

use crate::error::Result;
use crate::BoxFuture;
use std::any::{Any, TypeId};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;

/// A broadcast event with zero-to-many handlers.
///
/// # Example
///
/// ```
/// use mediator_core::Notification;
///
/// #[derive(Debug, Clone)]
/// struct OrderShipped {
///     order_id: u64,
/// }
///
/// impl Notification for OrderShipped {}
/// ```
pub trait Notification: fmt::Debug + Send + Sync + 'static {}

/// Handles one notification type.
///
/// # Dyn Compatibility
///
/// Returns an explicit [`BoxFuture`] so handlers can be stored as
/// `Arc<dyn NotificationHandler<N>>`.
pub trait NotificationHandler<N: Notification>: Send + Sync {
    /// React to the notification.
    ///
    /// # Errors
    ///
    /// Errors are surfaced to the publisher according to the fan-out strategy.
    fn handle<'a>(&'a self, notification: &'a N, cancel: &'a CancellationToken)
    -> BoxFuture<'a, Result<()>>;

    /// Name used in logs and fan-out diagnostics
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Closure-backed notification handler.
///
/// Wraps `F: Fn(N, CancellationToken) -> Fut`; each invocation receives a clone of
/// the notification.
pub struct FnNotificationHandler<N, F> {
    name: &'static str,
    f: F,
    _notification: PhantomData<fn(N)>,
}

impl<N, F> FnNotificationHandler<N, F> {
    /// Create a named closure-backed handler
    pub const fn new(name: &'static str, f: F) -> Self {
        Self {
            name,
            f,
            _notification: PhantomData,
        }
    }
}

impl<N, F, Fut> NotificationHandler<N> for FnNotificationHandler<N, F>
where
    N: Notification + Clone,
    F: Fn(N, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn handle<'a>(
        &'a self,
        notification: &'a N,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin((self.f)(notification.clone(), cancel.clone()))
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// A notification viewed through a trait object.
///
/// Blanket-implemented for every [`Notification`]. Lets a caller publish a
/// heterogeneous batch (for example, the domain events an aggregate raised)
/// while each one still reaches the handlers of its concrete type.
pub trait AnyNotification: fmt::Debug + Send + Sync {
    /// [`TypeId`] of the concrete notification type
    fn notification_type_id(&self) -> TypeId;

    /// Name of the concrete notification type
    fn notification_type_name(&self) -> &'static str;

    /// Convert into `Any` so the runtime can recover the concrete type
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;
}

impl<N: Notification> AnyNotification for N {
    fn notification_type_id(&self) -> TypeId {
        TypeId::of::<N>()
    }

    fn notification_type_name(&self) -> &'static str {
        std::any::type_name::<N>()
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }
}
