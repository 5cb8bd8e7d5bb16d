//! # Mediator Testing
//!
//! Testing utilities and helpers for the mediator.
//!
//! This crate provides:
//! - Deterministic implementations of the environment traits (clock, session)
//! - Recording behaviors, handlers and reporters that capture what ran, in order
//! - A fan-out strategy wrapper that counts how often it was invoked
//!
//! ## Example
//!
//! ```
//! use mediator_core::CancellationToken;
//! use mediator_core::{MediatorError, Request};
//! use mediator_runtime::Mediator;
//! use mediator_testing::{CallLog, RecordingBehavior};
//!
//! #[derive(Debug, Clone)]
//! struct Echo(String);
//!
//! impl Request for Echo {
//!     type Response = String;
//! }
//!
//! # fn main() -> Result<(), MediatorError> {
//! let log = CallLog::new();
//! let mediator = Mediator::builder()
//!     .handler_fn(|echo: Echo, _: CancellationToken| async move { Ok::<_, MediatorError>(echo.0) })
//!     .open_behavior(RecordingBehavior::new("B1", log.clone()))
//!     .open_behavior(RecordingBehavior::new("B2", log.clone()))
//!     .build()?;
//!
//! futures::executor::block_on(mediator.send(Echo("hi".to_string())))?;
//! assert_eq!(log.entries(), ["Before B1", "Before B2", "After B2", "After B1"]);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use mediator_core::environment::Clock;
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Mutex, Utc, lock};
    use mediator_core::environment::{SessionAccessor, SessionInfo};
    use std::time::Duration;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use mediator_testing::mocks::FixedClock;
    /// use mediator_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Clock that only moves when told to
    ///
    /// Share it with a handler through an `Arc` and call
    /// [`advance`](ManualClock::advance) from inside the handler to simulate
    /// slow work without sleeping.
    ///
    /// # Example
    ///
    /// ```
    /// use mediator_testing::mocks::ManualClock;
    /// use mediator_core::environment::Clock;
    /// use std::time::Duration;
    ///
    /// let clock = ManualClock::starting_at_test_epoch();
    /// let before = clock.now();
    /// clock.advance(Duration::from_millis(750));
    /// assert_eq!((clock.now() - before).num_milliseconds(), 750);
    /// ```
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a clock reading `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Create a clock reading the same instant as [`test_clock`]
        #[must_use]
        pub fn starting_at_test_epoch() -> Self {
            Self::new(test_clock().now())
        }

        /// Move the clock forward
        ///
        /// Durations that do not fit the calendar range leave the clock unchanged.
        pub fn advance(&self, by: Duration) {
            let mut time = lock(&self.time);
            if let Some(later) = chrono::TimeDelta::from_std(by)
                .ok()
                .and_then(|delta| time.checked_add_signed(delta))
            {
                *time = later;
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *lock(&self.time)
        }
    }

    /// Session accessor that always reports the same session
    #[derive(Debug, Clone)]
    pub struct StaticSessionAccessor {
        session: Option<SessionInfo>,
    }

    impl StaticSessionAccessor {
        /// A signed-in user
        #[must_use]
        pub fn user(user_id: &str, user_name: &str) -> Self {
            Self {
                session: Some(SessionInfo::authenticated(user_id, user_name)),
            }
        }

        /// No current session
        #[must_use]
        pub const fn none() -> Self {
            Self { session: None }
        }
    }

    impl SessionAccessor for StaticSessionAccessor {
        fn current_session(&self) -> Option<SessionInfo> {
            self.session.clone()
        }
    }
}

/// Recording doubles for behaviors, handlers, reporters and fan-out.
pub mod recording {
    use super::{Mutex, lock};
    use mediator_core::{
        BoxFuture, CancellationToken, ErasedResponse, FanOutStrategy, HandlerInvocation,
        MediatorError, Next, Notification, NotificationHandler, OpenBehavior, RequestContext,
        Result,
    };
    use mediator_runtime::{SlowRequest, SlowRequestReporter};
    use std::marker::PhantomData;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Ordered log shared between test doubles
    ///
    /// Clones append to the same log.
    #[derive(Debug, Clone, Default)]
    pub struct CallLog(Arc<Mutex<Vec<String>>>);

    impl CallLog {
        /// Create an empty log
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Append an entry
        pub fn record(&self, entry: impl Into<String>) {
            lock(&self.0).push(entry.into());
        }

        /// Snapshot of the entries so far
        #[must_use]
        pub fn entries(&self) -> Vec<String> {
            lock(&self.0).clone()
        }

        /// Number of entries so far
        #[must_use]
        pub fn len(&self) -> usize {
            lock(&self.0).len()
        }

        /// Whether nothing was recorded
        #[must_use]
        pub fn is_empty(&self) -> bool {
            lock(&self.0).is_empty()
        }

        /// Drop all entries
        pub fn clear(&self) {
            lock(&self.0).clear();
        }
    }

    /// Open behavior that logs `Before <label>` and `After <label>` around the
    /// rest of the pipeline
    ///
    /// `After` is logged whether the pipeline succeeded or failed.
    #[derive(Debug, Clone)]
    pub struct RecordingBehavior {
        label: String,
        log: CallLog,
    }

    impl RecordingBehavior {
        /// Record into `log` under `label`
        #[must_use]
        pub fn new(label: impl Into<String>, log: CallLog) -> Self {
            Self {
                label: label.into(),
                log,
            }
        }
    }

    impl OpenBehavior for RecordingBehavior {
        fn handle<'a>(
            &'a self,
            _context: RequestContext<'a>,
            next: Next<'a, ErasedResponse>,
            _cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, Result<ErasedResponse>> {
            Box::pin(async move {
                self.log.record(format!("Before {}", self.label));
                let result = next.run().await;
                self.log.record(format!("After {}", self.label));
                result
            })
        }
    }

    /// Notification handler that logs its name on every call
    ///
    /// Built with [`failing`](RecordingNotificationHandler::failing) it logs
    /// and then returns a handler failure.
    pub struct RecordingNotificationHandler<N> {
        name: &'static str,
        log: CallLog,
        fails: bool,
        _notification: PhantomData<fn(N)>,
    }

    impl<N> RecordingNotificationHandler<N> {
        /// A handler that succeeds
        #[must_use]
        pub const fn new(name: &'static str, log: CallLog) -> Self {
            Self {
                name,
                log,
                fails: false,
                _notification: PhantomData,
            }
        }

        /// A handler that fails with a message naming it
        #[must_use]
        pub const fn failing(name: &'static str, log: CallLog) -> Self {
            Self {
                name,
                log,
                fails: true,
                _notification: PhantomData,
            }
        }
    }

    impl<N: Notification> NotificationHandler<N> for RecordingNotificationHandler<N> {
        fn handle<'a>(
            &'a self,
            _notification: &'a N,
            _cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                self.log.record(self.name);
                if self.fails {
                    Err(MediatorError::handler(format!("{} failed", self.name)))
                } else {
                    Ok(())
                }
            })
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    /// Slow request reporter that keeps every report
    #[derive(Debug, Clone, Default)]
    pub struct RecordingReporter(Arc<Mutex<Vec<SlowRequest>>>);

    impl RecordingReporter {
        /// Create a reporter with no reports
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Snapshot of the reports so far
        #[must_use]
        pub fn reports(&self) -> Vec<SlowRequest> {
            lock(&self.0).clone()
        }
    }

    impl SlowRequestReporter for RecordingReporter {
        fn report(&self, slow: &SlowRequest) {
            lock(&self.0).push(slow.clone());
        }
    }

    /// Fan-out strategy wrapper that counts invocations and handlers seen
    pub struct CountingStrategy {
        inner: Arc<dyn FanOutStrategy>,
        calls: AtomicUsize,
        handlers: AtomicUsize,
    }

    impl CountingStrategy {
        /// Count calls made to `inner`
        #[must_use]
        pub fn new(inner: Arc<dyn FanOutStrategy>) -> Self {
            Self {
                inner,
                calls: AtomicUsize::new(0),
                handlers: AtomicUsize::new(0),
            }
        }

        /// Number of times `publish` was called
        #[must_use]
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Total number of handler invocations handed to `publish`
        #[must_use]
        pub fn handlers(&self) -> usize {
            self.handlers.load(Ordering::SeqCst)
        }
    }

    impl FanOutStrategy for CountingStrategy {
        fn publish<'a>(&'a self, invocations: Vec<HandlerInvocation<'a>>) -> BoxFuture<'a, Result<()>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.handlers.fetch_add(invocations.len(), Ordering::SeqCst);
            self.inner.publish(invocations)
        }

        fn name(&self) -> &'static str {
            self.inner.name()
        }
    }
}

/// Test helpers and utilities.
pub mod helpers {
    /// Install a `tracing` subscriber that writes to the test output
    ///
    /// Honors `RUST_LOG`. Safe to call from every test; only the first call
    /// installs.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use helpers::init_test_tracing;
pub use mocks::{FixedClock, ManualClock, StaticSessionAccessor, test_clock};
pub use recording::{
    CallLog, CountingStrategy, RecordingBehavior, RecordingNotificationHandler, RecordingReporter,
};
