//! Built-in fan-out strategies.
//!
//! - [`SequentialPublisher`]: registration order, stops at the first failure
//! - [`ConcurrentPublisher`]: polls every handler together and waits for all
//!
//! Neither strategy spawns tasks. The concurrent strategy interleaves the
//! handler futures on the publishing task with `join_all`, so a failing
//! handler never cancels its siblings.

use crate::config::{PublishConfig, PublishStrategy};
use futures::future::join_all;
use mediator_core::{BoxFuture, FanOutStrategy, HandlerInvocation, MediatorError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How the concurrent strategy reports handler failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Report the failure of the earliest-registered failing handler
    #[default]
    FirstFailure,
    /// Report every failure; two or more become [`MediatorError::AggregateFailure`]
    CollectAll,
}

/// Invokes handlers one after another.
///
/// The first failure is returned immediately and the remaining handlers are
/// never invoked.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialPublisher;

impl FanOutStrategy for SequentialPublisher {
    fn publish<'a>(&'a self, invocations: Vec<HandlerInvocation<'a>>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let total = invocations.len();
            for (index, invocation) in invocations.into_iter().enumerate() {
                let handler = invocation.handler();
                tracing::trace!(handler, "Invoking notification handler");
                if let Err(error) = invocation.run().await {
                    tracing::warn!(
                        handler,
                        error = %error,
                        skipped = total - index - 1,
                        "Notification handler failed, skipping remaining handlers"
                    );
                    return Err(error);
                }
            }
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "sequential"
    }
}

/// Invokes all handlers concurrently and waits for every one of them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcurrentPublisher {
    policy: FailurePolicy,
}

impl ConcurrentPublisher {
    /// Create a concurrent publisher with the given failure policy
    #[must_use]
    pub const fn new(policy: FailurePolicy) -> Self {
        Self { policy }
    }

    /// The failure policy in effect
    #[must_use]
    pub const fn policy(&self) -> FailurePolicy {
        self.policy
    }
}

impl FanOutStrategy for ConcurrentPublisher {
    fn publish<'a>(&'a self, invocations: Vec<HandlerInvocation<'a>>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let (handlers, calls): (Vec<_>, Vec<_>) = invocations
                .into_iter()
                .map(|invocation| (invocation.handler(), invocation.run()))
                .unzip();

            let results = join_all(calls).await;

            let mut failures: Vec<MediatorError> = Vec::new();
            for (handler, result) in handlers.into_iter().zip(results) {
                if let Err(error) = result {
                    tracing::warn!(handler, error = %error, "Notification handler failed");
                    failures.push(error);
                }
            }

            match self.policy {
                FailurePolicy::FirstFailure => failures.into_iter().next().map_or(Ok(()), Err),
                FailurePolicy::CollectAll => match failures.len() {
                    0 => Ok(()),
                    1 => failures.pop().map_or(Ok(()), Err),
                    _ => Err(MediatorError::AggregateFailure(failures)),
                },
            }
        })
    }

    fn name(&self) -> &'static str {
        "concurrent"
    }
}

/// Build the fan-out strategy described by `config`
#[must_use]
pub fn strategy_from_config(config: &PublishConfig) -> Arc<dyn FanOutStrategy> {
    match config.strategy {
        PublishStrategy::Sequential => Arc::new(SequentialPublisher),
        PublishStrategy::Concurrent => Arc::new(ConcurrentPublisher::new(config.failure_policy)),
    }
}
