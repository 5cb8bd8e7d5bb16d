use crate::config::PerformanceConfig;
use crate::metrics::RequestMetrics;
use mediator_core::environment::{Clock, NoSession, SessionAccessor, SystemClock};
use mediator_core::{
    BoxFuture, CancellationToken, ErasedResponse, Next, OpenBehavior, RequestContext, Result,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Shared count of requests seen by a [`PerformanceBehavior`].
///
/// Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct ExecutionCounter(Arc<AtomicU64>);

impl ExecutionCounter {
    /// Create a counter starting at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request and return the new total
    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Current total
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Set the total back to zero
    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

/// A request that took longer than the slow threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlowRequest {
    /// Request type name without module path
    pub request_name: &'static str,
    /// Time spent in the rest of the pipeline
    pub elapsed: Duration,
    /// `Debug` rendering of the request
    pub request: String,
    /// User on whose behalf the request ran, if known
    pub user_name: Option<String>,
}

/// Receives slow request records.
pub trait SlowRequestReporter: Send + Sync {
    /// Report one slow request
    fn report(&self, slow: &SlowRequest);
}

/// Logs slow requests as `tracing` warnings
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl SlowRequestReporter for TracingReporter {
    fn report(&self, slow: &SlowRequest) {
        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = slow.elapsed.as_millis() as u64;
        tracing::warn!(
            request_name = slow.request_name,
            elapsed_ms,
            request = %slow.request,
            user = ?slow.user_name,
            "Long running request: {} ({} milliseconds)",
            slow.request_name,
            elapsed_ms
        );
    }
}

/// Reports requests whose handling exceeds a threshold.
///
/// Every call increments the [`ExecutionCounter`]. Timing only starts once the
/// counter exceeds the warm-up count. Elapsed time is truncated to whole
/// milliseconds before it is compared with the threshold. The response or
/// error of the wrapped pipeline is always returned unchanged.
///
/// Register it with `MediatorBuilder::open_behavior` to cover every request type.
pub struct PerformanceBehavior {
    counter: ExecutionCounter,
    warmup_requests: u64,
    threshold: Duration,
    clock: Arc<dyn Clock>,
    session: Arc<dyn SessionAccessor>,
    reporter: Arc<dyn SlowRequestReporter>,
}

impl PerformanceBehavior {
    /// Create a behavior with default settings, the system clock, no session and
    /// the tracing reporter
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(&PerformanceConfig::default())
    }

    /// Create a behavior from configuration
    #[must_use]
    pub fn from_config(config: &PerformanceConfig) -> Self {
        Self {
            counter: ExecutionCounter::new(),
            warmup_requests: config.warmup_requests,
            threshold: config.slow_threshold(),
            clock: Arc::new(SystemClock),
            session: Arc::new(NoSession),
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Measure time with `clock`
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach the current user from `session` to reports
    #[must_use]
    pub fn with_session(mut self, session: Arc<dyn SessionAccessor>) -> Self {
        self.session = session;
        self
    }

    /// Send reports to `reporter`
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn SlowRequestReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Count requests in `counter`
    #[must_use]
    pub fn with_counter(mut self, counter: ExecutionCounter) -> Self {
        self.counter = counter;
        self
    }

    /// Set the slow threshold
    #[must_use]
    pub const fn with_threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the number of warm-up requests
    #[must_use]
    pub const fn with_warmup_requests(mut self, warmup_requests: u64) -> Self {
        self.warmup_requests = warmup_requests;
        self
    }

    /// The counter of requests seen
    #[must_use]
    pub const fn counter(&self) -> &ExecutionCounter {
        &self.counter
    }

    fn report(&self, context: RequestContext<'_>, elapsed: Duration) {
        let slow = SlowRequest {
            request_name: context.short_type_name(),
            elapsed,
            request: format!("{:?}", context.request()),
            user_name: self.session.current_user(),
        };
        RequestMetrics::record_slow();
        self.reporter.report(&slow);
    }
}

impl Default for PerformanceBehavior {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PerformanceBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceBehavior")
            .field("counter", &self.counter.get())
            .field("warmup_requests", &self.warmup_requests)
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl OpenBehavior for PerformanceBehavior {
    fn handle<'a>(
        &'a self,
        context: RequestContext<'a>,
        next: Next<'a, ErasedResponse>,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ErasedResponse>> {
        Box::pin(async move {
            if self.counter.increment() <= self.warmup_requests {
                return next.run().await;
            }

            let started = self.clock.now();
            let result = next.run().await;
            // Whole milliseconds; a clock that stepped backwards reads as zero.
            let millis = (self.clock.now() - started).num_milliseconds();
            let elapsed = Duration::from_millis(u64::try_from(millis).unwrap_or_default());

            if elapsed > self.threshold {
                self.report(context, elapsed);
            }
            result
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use mediator_core::{MediatorError, Request};
    use mediator_core::environment::SessionInfo;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Report {
        year: i32,
    }

    impl Request for Report {
        type Response = ();
    }

    /// Clock advanced by the handler under test
    struct StepClock(Mutex<DateTime<Utc>>);

    impl StepClock {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())))
        }

        fn advance(&self, by: Duration) {
            *self.0.lock().unwrap() += chrono::Duration::from_std(by).unwrap();
        }
    }

    impl Clock for StepClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<SlowRequest>>);

    impl SlowRequestReporter for Collect {
        fn report(&self, slow: &SlowRequest) {
            self.0.lock().unwrap().push(slow.clone());
        }
    }

    struct Alice;

    impl SessionAccessor for Alice {
        fn current_session(&self) -> Option<SessionInfo> {
            Some(SessionInfo::authenticated("u-1", "alice"))
        }
    }

    fn taking<'a>(clock: &'a StepClock, by: Duration) -> Next<'a, ErasedResponse> {
        Next::from_future(async move {
            clock.advance(by);
            Ok(Box::new(()) as ErasedResponse)
        })
    }

    fn behavior(clock: &Arc<StepClock>, reporter: &Arc<Collect>) -> PerformanceBehavior {
        PerformanceBehavior::new()
            .with_clock(Arc::clone(clock) as Arc<dyn Clock>)
            .with_session(Arc::new(Alice))
            .with_reporter(Arc::clone(reporter) as Arc<dyn SlowRequestReporter>)
    }

    #[tokio::test]
    async fn test_warmup_requests_are_not_timed() {
        let clock = StepClock::new();
        let reporter = Arc::new(Collect::default());
        let behavior = behavior(&clock, &reporter);
        let request = Report { year: 2024 };
        let cancel = CancellationToken::new();

        for _ in 0..3 {
            let context = RequestContext::of(&request);
            behavior
                .handle(context, taking(&clock, Duration::from_secs(2)), &cancel)
                .await
                .unwrap();
        }

        assert!(reporter.0.lock().unwrap().is_empty());
        assert_eq!(behavior.counter().get(), 3);
    }

    #[tokio::test]
    async fn test_slow_request_reported_after_warmup() {
        let clock = StepClock::new();
        let reporter = Arc::new(Collect::default());
        let behavior = behavior(&clock, &reporter);
        let request = Report { year: 2024 };
        let cancel = CancellationToken::new();

        for elapsed in [1, 1, 1, 600, 100] {
            let context = RequestContext::of(&request);
            behavior
                .handle(context, taking(&clock, Duration::from_millis(elapsed)), &cancel)
                .await
                .unwrap();
        }

        let reports = reporter.0.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].request_name, "Report");
        assert_eq!(reports[0].elapsed, Duration::from_millis(600));
        assert_eq!(reports[0].request, "Report { year: 2024 }");
        assert_eq!(reports[0].user_name.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_failure_passes_through_and_is_still_timed() {
        let clock = StepClock::new();
        let reporter = Arc::new(Collect::default());
        let behavior = behavior(&clock, &reporter).with_warmup_requests(0);
        let request = Report { year: 2023 };
        let cancel = CancellationToken::new();
        let step_clock = Arc::clone(&clock);

        let failing: Next<'_, ErasedResponse> = Next::from_future(async move {
            step_clock.advance(Duration::from_secs(1));
            Err(MediatorError::handler("report generation failed"))
        });
        let result = behavior.handle(RequestContext::of(&request), failing, &cancel).await;

        assert!(matches!(result, Err(MediatorError::HandlerFailure(_))));
        assert_eq!(reporter.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_threshold_is_exclusive() {
        let clock = StepClock::new();
        let reporter = Arc::new(Collect::default());
        let behavior = behavior(&clock, &reporter)
            .with_warmup_requests(0)
            .with_threshold(Duration::from_millis(500));
        let request = Report { year: 2022 };
        let cancel = CancellationToken::new();

        behavior
            .handle(RequestContext::of(&request), taking(&clock, Duration::from_millis(500)), &cancel)
            .await
            .unwrap();

        assert!(reporter.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sub_millisecond_overrun_is_not_reported() {
        let clock = StepClock::new();
        let reporter = Arc::new(Collect::default());
        let behavior = behavior(&clock, &reporter)
            .with_warmup_requests(0)
            .with_threshold(Duration::from_millis(500));
        let request = Report { year: 2022 };
        let cancel = CancellationToken::new();

        behavior
            .handle(RequestContext::of(&request), taking(&clock, Duration::from_micros(500_400)), &cancel)
            .await
            .unwrap();
        assert!(reporter.0.lock().unwrap().is_empty());

        behavior
            .handle(RequestContext::of(&request), taking(&clock, Duration::from_micros(501_700)), &cancel)
            .await
            .unwrap();
        let reports = reporter.0.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].elapsed, Duration::from_millis(501));
    }

    #[test]
    fn test_counter_is_shared_and_resettable() {
        let counter = ExecutionCounter::new();
        let behavior = PerformanceBehavior::new().with_counter(counter.clone());

        assert_eq!(counter.increment(), 1);
        assert_eq!(behavior.counter().get(), 1);

        behavior.counter().reset();
        assert_eq!(counter.get(), 0);
    }
}
