//! Handler registry and its builder.
//!
//! Handlers are resolved by the concrete type of the request (or
//! notification), never by a name the caller supplies. The registry is built
//! once at startup and is read-only afterwards: [`Mediator`] shares it behind
//! an `Arc` and every lookup is a plain `HashMap` read.
//!
//! # Storage
//!
//! Each entry is stored type-erased (`Box<dyn Any>`) next to the `TypeId` it
//! was registered under, and downcast back to its concrete type at dispatch.
//! Alongside each entry the builder records a monomorphized dispatch function
//! so that requests and notifications arriving behind a trait object can still
//! reach their handlers.

use crate::config::MediatorConfig;
use crate::mediator::Mediator;
use crate::publishers::strategy_from_config;
use mediator_core::behavior::OpenBehaviorAdapter;
use mediator_core::notification::FnNotificationHandler;
use mediator_core::request::FnHandler;
use mediator_core::{
    BoxFuture, CancellationToken, ErasedResponse, FanOutStrategy, MediatorError, Notification,
    NotificationHandler, OpenBehavior, PipelineBehavior, Request, RequestHandler, Result, SmallVec,
};
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Dispatch of a type-erased request to its typed pipeline
pub(crate) type ErasedSend = for<'a> fn(
    &'a Mediator,
    Box<dyn Any + Send + Sync>,
    &'a CancellationToken,
) -> BoxFuture<'a, Result<ErasedResponse>>;

/// Dispatch of a type-erased notification to its typed handlers
pub(crate) type ErasedPublish = for<'a> fn(
    &'a Mediator,
    Box<dyn Any + Send + Sync>,
    &'a CancellationToken,
) -> BoxFuture<'a, Result<()>>;

/// Behaviors resolved for one request
pub type BehaviorChain<R> = SmallVec<[Arc<dyn PipelineBehavior<R>>; 4]>;

/// Identity of a request handler: request type plus declared response type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestKey {
    request: TypeId,
    response: TypeId,
}

impl RequestKey {
    /// Key of request type `R`
    #[must_use]
    pub fn of<R: Request>() -> Self {
        Self::new(TypeId::of::<R>(), TypeId::of::<R::Response>())
    }

    pub(crate) const fn new(request: TypeId, response: TypeId) -> Self {
        Self { request, response }
    }
}

/// Where a request handler comes from at dispatch time
enum HandlerProvider<R: Request> {
    /// One instance shared by every call
    Shared(Arc<dyn RequestHandler<R>>),
    /// A fresh instance per call
    Factory(Arc<dyn Fn() -> Box<dyn RequestHandler<R>> + Send + Sync>),
}

impl<R: Request> HandlerProvider<R> {
    fn resolve(&self) -> Arc<dyn RequestHandler<R>> {
        match self {
            Self::Shared(handler) => Arc::clone(handler),
            Self::Factory(factory) => Arc::from(factory()),
        }
    }
}

struct RequestEntry {
    request_name: &'static str,
    /// `HandlerProvider<R>`
    provider: Box<dyn Any + Send + Sync>,
    send: ErasedSend,
}

struct NotificationEntry {
    /// `Vec<Arc<dyn NotificationHandler<N>>>`, in registration order
    handlers: Box<dyn Any + Send + Sync>,
    count: usize,
    publish: ErasedPublish,
}

impl NotificationEntry {
    fn new<N: Notification>() -> Self {
        Self {
            handlers: Box::new(Vec::<Arc<dyn NotificationHandler<N>>>::new()),
            count: 0,
            publish: publish_erased::<N>,
        }
    }
}

/// One behavior registration. Open and typed behaviors share one sequence so
/// their relative registration order is preserved.
enum BehaviorRegistration {
    /// Applies to every request type
    Open(Arc<dyn OpenBehavior>),
    /// Applies to one request type; holds `Arc<dyn PipelineBehavior<R>>`
    Typed {
        request: TypeId,
        behavior: Box<dyn Any + Send + Sync>,
    },
}

/// Dispatch an erased request as `R`
///
/// A box that does not hold an `R` fails with
/// [`MediatorError::ResponseTypeMismatch`] naming the request type.
fn send_erased<'a, R: Request>(
    mediator: &'a Mediator,
    request: Box<dyn Any + Send + Sync>,
    cancel: &'a CancellationToken,
) -> BoxFuture<'a, Result<ErasedResponse>> {
    Box::pin(async move {
        let request = request
            .downcast::<R>()
            .map_err(|_| MediatorError::ResponseTypeMismatch {
                expected: type_name::<R>(),
            })?;
        let response = mediator.send_with_cancel(*request, cancel).await?;
        Ok(Box::new(response) as ErasedResponse)
    })
}

/// Publish an erased notification as `N`
///
/// A box that does not hold an `N` fails with
/// [`MediatorError::ResponseTypeMismatch`] naming the notification type.
fn publish_erased<'a, N: Notification>(
    mediator: &'a Mediator,
    notification: Box<dyn Any + Send + Sync>,
    cancel: &'a CancellationToken,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let notification = notification
            .downcast::<N>()
            .map_err(|_| MediatorError::ResponseTypeMismatch {
                expected: type_name::<N>(),
            })?;
        mediator.publish_with_cancel(*notification, cancel).await
    })
}

/// Immutable lookup tables built by [`MediatorBuilder`].
pub struct HandlerRegistry {
    requests: HashMap<RequestKey, RequestEntry>,
    notifications: HashMap<TypeId, NotificationEntry>,
    behaviors: Vec<BehaviorRegistration>,
}

impl HandlerRegistry {
    /// Resolve the handler of request type `R`
    #[must_use]
    pub fn handler<R: Request>(&self) -> Option<Arc<dyn RequestHandler<R>>> {
        self.requests
            .get(&RequestKey::of::<R>())
            .and_then(|entry| entry.provider.downcast_ref::<HandlerProvider<R>>())
            .map(HandlerProvider::resolve)
    }

    /// Whether a handler is registered for request type `R`
    #[must_use]
    pub fn contains_handler<R: Request>(&self) -> bool {
        self.requests.contains_key(&RequestKey::of::<R>())
    }

    /// Behaviors applicable to request type `R`, outermost first
    ///
    /// Open behaviors apply to every request type; typed behaviors only to the
    /// type they were registered for. Registration order is kept across both.
    #[must_use]
    pub fn behaviors_for<R: Request>(&self) -> BehaviorChain<R> {
        let request = TypeId::of::<R>();
        self.behaviors
            .iter()
            .filter_map(|registration| match registration {
                BehaviorRegistration::Open(behavior) => Some(
                    Arc::new(OpenBehaviorAdapter::<R>::new(Arc::clone(behavior)))
                        as Arc<dyn PipelineBehavior<R>>,
                ),
                BehaviorRegistration::Typed {
                    request: target,
                    behavior,
                } if *target == request => behavior
                    .downcast_ref::<Arc<dyn PipelineBehavior<R>>>()
                    .cloned(),
                BehaviorRegistration::Typed { .. } => None,
            })
            .collect()
    }

    /// Handlers of notification type `N`, in registration order
    #[must_use]
    pub fn notification_handlers<N: Notification>(&self) -> &[Arc<dyn NotificationHandler<N>>] {
        self.notifications
            .get(&TypeId::of::<N>())
            .and_then(|entry| {
                entry
                    .handlers
                    .downcast_ref::<Vec<Arc<dyn NotificationHandler<N>>>>()
            })
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of registered request handlers
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    /// Number of registered notification handlers across all types
    #[must_use]
    pub fn notification_handler_count(&self) -> usize {
        self.notifications.values().map(|entry| entry.count).sum()
    }

    /// Number of registered behaviors, open and typed
    #[must_use]
    pub fn behavior_count(&self) -> usize {
        self.behaviors.len()
    }

    pub(crate) fn erased_send(&self, key: RequestKey) -> Option<ErasedSend> {
        self.requests.get(&key).map(|entry| entry.send)
    }

    pub(crate) fn erased_publish(&self, notification: TypeId) -> Option<ErasedPublish> {
        self.notifications.get(&notification).map(|entry| entry.publish)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut requests: Vec<&str> = self.requests.values().map(|entry| entry.request_name).collect();
        requests.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("requests", &requests)
            .field("notification_handlers", &self.notification_handler_count())
            .field("behaviors", &self.behaviors.len())
            .finish()
    }
}

/// Collects handlers, behaviors and the fan-out strategy, then builds a [`Mediator`].
///
/// # Example
///
/// ```
/// use mediator_core::{CancellationToken, MediatorError, Request};
/// use mediator_runtime::MediatorBuilder;
///
/// #[derive(Debug, Clone)]
/// struct Echo(String);
///
/// impl Request for Echo {
///     type Response = String;
/// }
///
/// # fn main() -> Result<(), MediatorError> {
/// let mediator = MediatorBuilder::new()
///     .handler_fn(|Echo(text): Echo, _cancel: CancellationToken| async move {
///         Ok::<_, MediatorError>(text.repeat(2))
///     })
///     .build()?;
///
/// let response = futures::executor::block_on(mediator.send(Echo("a".to_string())))?;
/// assert_eq!(response, "aa");
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MediatorBuilder {
    requests: HashMap<RequestKey, RequestEntry>,
    duplicates: Vec<MediatorError>,
    notifications: HashMap<TypeId, NotificationEntry>,
    behaviors: Vec<BehaviorRegistration>,
    strategy: Option<Arc<dyn FanOutStrategy>>,
    config: MediatorConfig,
}

impl MediatorBuilder {
    /// Create an empty builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config`; its publish section selects the fan-out strategy unless
    /// one is set explicitly
    #[must_use]
    pub fn with_config(mut self, config: MediatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom fan-out strategy
    #[must_use]
    pub fn with_fan_out(mut self, strategy: Arc<dyn FanOutStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Register the handler of request type `R`, shared by every call
    #[must_use]
    pub fn handler<R: Request>(self, handler: impl RequestHandler<R> + 'static) -> Self {
        self.register(HandlerProvider::Shared(Arc::new(handler)))
    }

    /// Register a factory producing a fresh handler for every call
    #[must_use]
    pub fn handler_factory<R, H, F>(self, factory: F) -> Self
    where
        R: Request,
        H: RequestHandler<R> + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.register(HandlerProvider::Factory(Arc::new(move || {
            Box::new(factory()) as Box<dyn RequestHandler<R>>
        })))
    }

    /// Register a closure as the handler of request type `R`
    #[must_use]
    pub fn handler_fn<R, F, Fut>(self, f: F) -> Self
    where
        R: Request + Clone,
        F: Fn(R, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R::Response>> + Send + 'static,
    {
        self.handler(FnHandler::<R, F>::new(f))
    }

    /// Add a handler for notification type `N`
    #[must_use]
    pub fn notification_handler<N: Notification>(
        mut self,
        handler: impl NotificationHandler<N> + 'static,
    ) -> Self {
        let entry = self
            .notifications
            .entry(TypeId::of::<N>())
            .or_insert_with(NotificationEntry::new::<N>);
        if let Some(handlers) = entry
            .handlers
            .downcast_mut::<Vec<Arc<dyn NotificationHandler<N>>>>()
        {
            handlers.push(Arc::new(handler));
            entry.count += 1;
        }
        self
    }

    /// Add a named closure as a handler for notification type `N`
    #[must_use]
    pub fn notification_fn<N, F, Fut>(self, name: &'static str, f: F) -> Self
    where
        N: Notification + Clone,
        F: Fn(N, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.notification_handler(FnNotificationHandler::<N, F>::new(name, f))
    }

    /// Add a behavior around request type `R`
    #[must_use]
    pub fn behavior<R: Request>(mut self, behavior: impl PipelineBehavior<R> + 'static) -> Self {
        let behavior: Arc<dyn PipelineBehavior<R>> = Arc::new(behavior);
        self.behaviors.push(BehaviorRegistration::Typed {
            request: TypeId::of::<R>(),
            behavior: Box::new(behavior),
        });
        self
    }

    /// Add a behavior around every request type
    #[must_use]
    pub fn open_behavior(self, behavior: impl OpenBehavior + 'static) -> Self {
        self.shared_open_behavior(Arc::new(behavior))
    }

    /// Add an already shared behavior around every request type
    #[must_use]
    pub fn shared_open_behavior(mut self, behavior: Arc<dyn OpenBehavior>) -> Self {
        self.behaviors.push(BehaviorRegistration::Open(behavior));
        self
    }

    /// Freeze the registrations into a [`Mediator`].
    ///
    /// # Errors
    ///
    /// Returns [`MediatorError::DuplicateHandler`] if a request type was
    /// registered more than once.
    pub fn build(self) -> Result<Mediator> {
        if let Some(duplicate) = self.duplicates.into_iter().next() {
            return Err(duplicate);
        }

        let strategy = self
            .strategy
            .unwrap_or_else(|| strategy_from_config(&self.config.publish));
        let registry = HandlerRegistry {
            requests: self.requests,
            notifications: self.notifications,
            behaviors: self.behaviors,
        };

        tracing::debug!(
            requests = registry.request_count(),
            notification_handlers = registry.notification_handler_count(),
            behaviors = registry.behavior_count(),
            strategy = strategy.name(),
            "Mediator built"
        );
        Ok(Mediator::new(registry, strategy))
    }

    fn register<R: Request>(mut self, provider: HandlerProvider<R>) -> Self {
        let key = RequestKey::of::<R>();
        if self.requests.contains_key(&key) {
            tracing::warn!(request = type_name::<R>(), "Duplicate request handler registration");
            self.duplicates.push(MediatorError::DuplicateHandler {
                request: type_name::<R>(),
                response: type_name::<R::Response>(),
            });
            return self;
        }
        self.requests.insert(
            key,
            RequestEntry {
                request_name: type_name::<R>(),
                provider: Box::new(provider),
                send: send_erased::<R>,
            },
        );
        self
    }
}

impl std::fmt::Debug for MediatorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediatorBuilder")
            .field("requests", &self.requests.len())
            .field("notifications", &self.notifications.len())
            .field("behaviors", &self.behaviors.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
