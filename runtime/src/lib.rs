//! # Mediator Runtime
//!
//! Runtime implementation of the in-process mediator.
//!
//! This crate provides the [`Mediator`] that routes requests and notifications
//! to the handlers registered with a [`MediatorBuilder`].
//!
//! ## Core Components
//!
//! - **Registry**: type-indexed handler and behavior tables, immutable after build
//! - **Mediator**: `send` (one handler, through the behavior pipeline) and
//!   `publish` (zero-to-many handlers, through the fan-out strategy)
//! - **Publishers**: sequential and concurrent fan-out strategies
//! - **Behaviors**: response caching and slow request detection
//!
//! ## Example
//!
//! ```
//! use mediator_core::{
//!     BoxFuture, CancellationToken, MediatorError, Next, PipelineBehavior, Request, Result,
//! };
//! use mediator_runtime::Mediator;
//!
//! #[derive(Debug, Clone)]
//! struct Echo {
//!     text: String,
//! }
//!
//! impl Request for Echo {
//!     type Response = String;
//! }
//!
//! struct Wrap;
//!
//! impl PipelineBehavior<Echo> for Wrap {
//!     fn handle<'a>(
//!         &'a self,
//!         _request: &'a Echo,
//!         next: Next<'a, String>,
//!         _cancel: &'a CancellationToken,
//!     ) -> BoxFuture<'a, Result<String>> {
//!         Box::pin(async move { Ok(format!("wrapped:{}", next.run().await?)) })
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let mediator = Mediator::builder()
//!     .handler_fn(|echo: Echo, _cancel: CancellationToken| async move {
//!         Ok::<_, MediatorError>(echo.text.repeat(2))
//!     })
//!     .behavior(Wrap)
//!     .build()?;
//!
//! let response = futures::executor::block_on(mediator.send(Echo { text: "a".to_string() }))?;
//! assert_eq!(response, "wrapped:aa");
//! # Ok(())
//! # }
//! ```

/// Handler registry and builder
pub mod registry;

/// Built-in fan-out strategies
pub mod publishers;

/// Built-in pipeline behaviors
pub mod behaviors;

/// In-memory cache store
pub mod cache_store;

/// Configuration for publishing, caching and slow request detection
pub mod config;

/// Prometheus metrics for observability
pub mod metrics;

pub use behaviors::{
    CacheBehavior, ExecutionCounter, PerformanceBehavior, SlowRequest, SlowRequestReporter,
    TracingReporter,
};
pub use cache_store::CacheStats;
pub use config::{CacheConfig, ConfigError, PerformanceConfig, PublishConfig, PublishStrategy};
pub use metrics::MetricsRecorder;
pub use registry::RequestKey;
pub use cache_store::InMemoryCacheStore;
pub use config::MediatorConfig;
pub use mediator::Mediator;
pub use publishers::{ConcurrentPublisher, FailurePolicy, SequentialPublisher};
pub use registry::{HandlerRegistry, MediatorBuilder};

/// Mediator module - the dispatch surface
pub mod mediator {
    use crate::metrics::{NotificationMetrics, RequestMetrics};
    use crate::registry::{HandlerRegistry, MediatorBuilder, RequestKey};
    use mediator_core::{
        AnyNotification, AnyRequest, CancellationToken, FanOutStrategy, HandlerInvocation,
        MediatorError, Next, Notification, Request, Result, compose,
    };
    use std::any::{TypeId, type_name};
    use std::sync::Arc;
    use std::time::Instant;

    struct MediatorInner {
        registry: HandlerRegistry,
        strategy: Arc<dyn FanOutStrategy>,
    }

    /// Single entry point for requests and notifications
    ///
    /// The Mediator:
    /// 1. Resolves the handler of a request by its concrete type
    /// 2. Wraps it with the behaviors that apply to that type, first registered outermost
    /// 3. Runs the pipeline with the caller's cancellation signal
    /// 4. Hands notification handlers to the fan-out strategy
    ///
    /// Cloning is cheap: clones share the same registry.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mediator = Mediator::builder()
    ///     .handler(GetOrderHandler::new(orders))
    ///     .notification_handler(SendConfirmationEmail)
    ///     .open_behavior(PerformanceBehavior::new())
    ///     .build()?;
    ///
    /// let order = mediator.send(GetOrder { id }).await?;
    /// mediator.publish(OrderShipped { id }).await?;
    /// ```
    #[derive(Clone)]
    pub struct Mediator {
        inner: Arc<MediatorInner>,
    }

    impl Mediator {
        /// Start registering handlers
        #[must_use]
        pub fn builder() -> MediatorBuilder {
            MediatorBuilder::new()
        }

        pub(crate) fn new(registry: HandlerRegistry, strategy: Arc<dyn FanOutStrategy>) -> Self {
            Self {
                inner: Arc::new(MediatorInner { registry, strategy }),
            }
        }

        /// The handler registry
        #[must_use]
        pub fn registry(&self) -> &HandlerRegistry {
            &self.inner.registry
        }

        /// Name of the fan-out strategy in use
        #[must_use]
        pub fn strategy_name(&self) -> &'static str {
            self.inner.strategy.name()
        }

        /// Send a request to its handler through the behavior pipeline
        ///
        /// # Errors
        ///
        /// - [`MediatorError::HandlerNotFound`]: no handler is registered for `R`
        /// - Any error raised by a behavior or the handler, unchanged
        pub async fn send<R: Request>(&self, request: R) -> Result<R::Response> {
            self.send_with_cancel(request, &CancellationToken::new()).await
        }

        /// Send a request with a cancellation signal
        ///
        /// The same token reaches every behavior and the handler.
        ///
        /// # Errors
        ///
        /// Same as [`send`](Self::send).
        #[tracing::instrument(skip_all, name = "mediator_send", fields(request = type_name::<R>()))]
        pub async fn send_with_cancel<R: Request>(
            &self,
            request: R,
            cancel: &CancellationToken,
        ) -> Result<R::Response> {
            let Some(handler) = self.inner.registry.handler::<R>() else {
                tracing::warn!("No handler registered for request");
                RequestMetrics::record_not_found();
                return Err(MediatorError::HandlerNotFound {
                    request: type_name::<R>(),
                    response: type_name::<R::Response>(),
                });
            };

            let behaviors = self.inner.registry.behaviors_for::<R>();
            tracing::debug!(behaviors = behaviors.len(), "Dispatching request");

            let start = Instant::now();
            let terminal = Next::new(|| handler.handle(&request, cancel));
            let result = compose(&behaviors, &request, cancel, terminal).run().await;
            RequestMetrics::record_request(start.elapsed(), result.is_ok());

            match &result {
                Ok(_) => tracing::trace!("Request completed"),
                Err(error) => tracing::debug!(error = %error, "Request failed"),
            }
            result
        }

        /// Send a request known only through a trait object
        ///
        /// The handler is resolved by the runtime concrete type of `request`.
        ///
        /// # Errors
        ///
        /// - [`MediatorError::HandlerNotFound`]: no handler for the concrete type
        /// - [`MediatorError::ResponseTypeMismatch`]: the handler produced another response type
        /// - Any error raised by a behavior or the handler, unchanged
        pub async fn send_boxed<Resp: Send + 'static>(
            &self,
            request: Box<dyn AnyRequest<Resp>>,
        ) -> Result<Resp> {
            self.send_boxed_with_cancel(request, &CancellationToken::new()).await
        }

        /// Send a request known only through a trait object, with a cancellation signal
        ///
        /// # Errors
        ///
        /// Same as [`send_boxed`](Self::send_boxed).
        #[tracing::instrument(skip_all, name = "mediator_send_boxed", fields(request = request.request_type_name()))]
        pub async fn send_boxed_with_cancel<Resp: Send + 'static>(
            &self,
            request: Box<dyn AnyRequest<Resp>>,
            cancel: &CancellationToken,
        ) -> Result<Resp> {
            let key = RequestKey::new(request.request_type_id(), TypeId::of::<Resp>());
            let Some(send) = self.inner.registry.erased_send(key) else {
                tracing::warn!("No handler registered for request");
                RequestMetrics::record_not_found();
                return Err(MediatorError::HandlerNotFound {
                    request: request.request_type_name(),
                    response: type_name::<Resp>(),
                });
            };

            let response = send(self, request.into_any(), cancel).await?;
            response
                .downcast::<Resp>()
                .map(|boxed| *boxed)
                .map_err(|_| MediatorError::ResponseTypeMismatch {
                    expected: type_name::<Resp>(),
                })
        }

        /// Publish a notification to every handler registered for `N`
        ///
        /// Completes immediately when no handler is registered.
        ///
        /// # Errors
        ///
        /// Returns the failure reported by the fan-out strategy.
        pub async fn publish<N: Notification>(&self, notification: N) -> Result<()> {
            self.publish_with_cancel(notification, &CancellationToken::new()).await
        }

        /// Publish a notification with a cancellation signal
        ///
        /// # Errors
        ///
        /// Same as [`publish`](Self::publish).
        #[tracing::instrument(skip_all, name = "mediator_publish", fields(notification = type_name::<N>()))]
        pub async fn publish_with_cancel<N: Notification>(
            &self,
            notification: N,
            cancel: &CancellationToken,
        ) -> Result<()> {
            let handlers = self.inner.registry.notification_handlers::<N>();
            NotificationMetrics::record_publish(handlers.len());
            if handlers.is_empty() {
                tracing::trace!("No handlers registered for notification");
                return Ok(());
            }

            let strategy = &self.inner.strategy;
            tracing::debug!(
                handlers = handlers.len(),
                strategy = strategy.name(),
                "Publishing notification"
            );

            let notification = &notification;
            let invocations: Vec<_> = handlers
                .iter()
                .map(|handler| {
                    HandlerInvocation::new(handler.name(), move || handler.handle(notification, cancel))
                })
                .collect();
            let result = strategy.publish(invocations).await;

            if let Err(error) = &result {
                NotificationMetrics::record_failure();
                tracing::warn!(strategy = strategy.name(), error = %error, "Notification publish failed");
            }
            result
        }

        /// Publish a notification known only through a trait object
        ///
        /// The handlers are resolved by the runtime concrete type of `notification`.
        ///
        /// # Errors
        ///
        /// Same as [`publish`](Self::publish).
        pub async fn publish_boxed(&self, notification: Box<dyn AnyNotification>) -> Result<()> {
            self.publish_boxed_with_cancel(notification, &CancellationToken::new()).await
        }

        /// Publish a notification known only through a trait object, with a
        /// cancellation signal
        ///
        /// # Errors
        ///
        /// Same as [`publish`](Self::publish).
        pub async fn publish_boxed_with_cancel(
            &self,
            notification: Box<dyn AnyNotification>,
            cancel: &CancellationToken,
        ) -> Result<()> {
            match self.inner.registry.erased_publish(notification.notification_type_id()) {
                Some(publish) => publish(self, notification.into_any(), cancel).await,
                None => {
                    tracing::trace!(
                        notification = notification.notification_type_name(),
                        "No handlers registered for notification"
                    );
                    Ok(())
                }
            }
        }

        /// Publish a batch of notifications of mixed types, in order
        ///
        /// Typical use is dispatching the domain events an aggregate raised.
        /// Publishing stops at the first notification that fails.
        ///
        /// # Errors
        ///
        /// Returns the failure of the first notification that failed.
        #[tracing::instrument(skip_all, name = "mediator_publish_all", fields(count = notifications.len()))]
        pub async fn publish_all(&self, notifications: Vec<Box<dyn AnyNotification>>) -> Result<()> {
            let cancel = CancellationToken::new();
            for notification in notifications {
                self.publish_boxed_with_cancel(notification, &cancel).await?;
            }
            Ok(())
        }
    }

    impl std::fmt::Debug for Mediator {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Mediator")
                .field("registry", &self.inner.registry)
                .field("strategy", &self.inner.strategy.name())
                .finish()
        }
    }
}
