//! Built-in pipeline behaviors.
//!
//! - [`CacheBehavior`]: serves cacheable requests from a [`CacheStore`](mediator_core::CacheStore),
//!   short-circuiting the pipeline on a hit
//! - [`PerformanceBehavior`]: reports requests slower than a threshold without
//!   altering their outcome

/// Response caching for cacheable requests
pub mod cache;

/// Slow request detection
pub mod performance;

pub use cache::CacheBehavior;
pub use performance::{
    ExecutionCounter, PerformanceBehavior, SlowRequest, SlowRequestReporter, TracingReporter,
};
