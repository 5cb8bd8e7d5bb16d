//! Prometheus metrics for observability and monitoring.
//!
//! The mediator records through the `metrics` facade. Without an installed
//! recorder every call is a no-op. [`MetricsRecorder`] installs a Prometheus
//! recorder and renders the text exposition; serving it over HTTP is left to
//! the host application.
//!
//! # Example
//!
//! ```rust,no_run
//! use mediator_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut recorder = MetricsRecorder::new();
//! recorder.install()?;
//!
//! // ... dispatch requests ...
//!
//! if let Some(text) = recorder.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Process-wide Prometheus recorder.
#[derive(Default)]
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Create a recorder that is not yet installed
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., by another test), this logs a
    /// warning, succeeds, and leaves [`handle`](Self::handle) empty.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        describe_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this recorder was not the one installed.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("installed", &self.handle.is_some())
            .finish()
    }
}

/// Register all metric descriptions.
pub fn describe_metrics() {
    // Request dispatch
    describe_counter!("mediator.requests.total", "Total number of requests sent");
    describe_counter!(
        "mediator.requests.failed",
        "Total number of requests whose pipeline returned an error"
    );
    describe_counter!(
        "mediator.requests.not_found",
        "Total number of requests with no registered handler"
    );
    describe_histogram!(
        "mediator.request.duration_seconds",
        "Time taken to run a request pipeline"
    );
    describe_counter!(
        "mediator.requests.slow",
        "Total number of requests above the slow threshold"
    );

    // Notification dispatch
    describe_counter!(
        "mediator.notifications.total",
        "Total number of notifications published"
    );
    describe_counter!(
        "mediator.notifications.handlers",
        "Total number of notification handler invocations"
    );
    describe_counter!(
        "mediator.notifications.failed",
        "Total number of publishes that reported a failure"
    );

    // Cache
    describe_counter!("mediator.cache.hits", "Total number of cache hits");
    describe_counter!("mediator.cache.misses", "Total number of cache misses");
}

/// Request dispatch metrics recorder.
pub struct RequestMetrics;

impl RequestMetrics {
    /// Record a completed request pipeline.
    pub fn record_request(duration: Duration, succeeded: bool) {
        counter!("mediator.requests.total").increment(1);
        histogram!("mediator.request.duration_seconds").record(duration.as_secs_f64());
        if !succeeded {
            counter!("mediator.requests.failed").increment(1);
        }
    }

    /// Record a request with no handler.
    pub fn record_not_found() {
        counter!("mediator.requests.total").increment(1);
        counter!("mediator.requests.not_found").increment(1);
    }

    /// Record a slow request.
    pub fn record_slow() {
        counter!("mediator.requests.slow").increment(1);
    }
}

/// Notification dispatch metrics recorder.
pub struct NotificationMetrics;

impl NotificationMetrics {
    /// Record a publish and the number of handlers it reached.
    pub fn record_publish(handlers: usize) {
        counter!("mediator.notifications.total").increment(1);
        counter!("mediator.notifications.handlers").increment(handlers as u64);
    }

    /// Record a publish that reported a failure.
    pub fn record_failure() {
        counter!("mediator.notifications.failed").increment(1);
    }
}

/// Cache behavior metrics recorder.
pub struct CacheMetrics;

impl CacheMetrics {
    /// Record a cache hit.
    pub fn record_hit() {
        counter!("mediator.cache.hits").increment(1);
    }

    /// Record a cache miss.
    pub fn record_miss() {
        counter!("mediator.cache.misses").increment(1);
    }
}
