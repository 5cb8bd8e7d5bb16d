//! Integration tests for request dispatch through the mediator
//!
//! Covers handler resolution, pipeline ordering across open and typed
//! behaviors, short-circuits, cancellation and type-erased sends.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use mediator_core::{
    AnyRequest, BoxFuture, CancellationToken, ErasedResponse, MediatorError, Next, OpenBehavior,
    PipelineBehavior, Request, RequestContext, RequestHandler, Result,
};
use mediator_runtime::{Mediator, MediatorBuilder};
use mediator_testing::{CallLog, RecordingBehavior, init_test_tracing};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Debug, Clone)]
struct Echo {
    text: String,
}

impl Request for Echo {
    type Response = String;
}

#[derive(Debug, Clone)]
struct Ping;

impl Request for Ping {
    type Response = &'static str;
}

struct EchoHandler {
    log: CallLog,
}

impl RequestHandler<Echo> for EchoHandler {
    fn handle<'a>(&'a self, request: &'a Echo, _: &'a CancellationToken) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.log.record("Handle");
            Ok(format!("{0}{0}", request.text))
        })
    }
}

/// Typed behavior that prefixes the response
struct Wrap;

impl PipelineBehavior<Echo> for Wrap {
    fn handle<'a>(
        &'a self,
        _request: &'a Echo,
        next: Next<'a, String>,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { Ok(format!("wrapped:{}", next.run().await?)) })
    }
}

/// Typed behavior that logs like `RecordingBehavior`
struct TypedRecorder {
    label: &'static str,
    log: CallLog,
}

impl PipelineBehavior<Echo> for TypedRecorder {
    fn handle<'a>(
        &'a self,
        _request: &'a Echo,
        next: Next<'a, String>,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.log.record(format!("Before {}", self.label));
            let result = next.run().await;
            self.log.record(format!("After {}", self.label));
            result
        })
    }
}

/// Typed behavior that answers without calling `next`
struct Canned;

impl PipelineBehavior<Echo> for Canned {
    fn handle<'a>(
        &'a self,
        _request: &'a Echo,
        _next: Next<'a, String>,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async { Ok("canned".to_string()) })
    }
}

/// Open behavior that short-circuits with a value of the wrong type
struct WrongShortCircuit;

impl OpenBehavior for WrongShortCircuit {
    fn handle<'a>(
        &'a self,
        _context: RequestContext<'a>,
        _next: Next<'a, ErasedResponse>,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ErasedResponse>> {
        Box::pin(async { Ok(Box::new(7_u8) as ErasedResponse) })
    }
}

fn echo(text: &str) -> Echo {
    Echo {
        text: text.to_string(),
    }
}

fn echo_mediator(log: &CallLog) -> MediatorBuilder {
    Mediator::builder().handler(EchoHandler { log: log.clone() })
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_send_through_wrapping_behavior() {
    init_test_tracing();
    let log = CallLog::new();
    let mediator = echo_mediator(&log).behavior(Wrap).build().unwrap();

    let response = mediator.send(echo("a")).await.unwrap();

    assert_eq!(response, "wrapped:aa");
    assert_eq!(log.entries(), ["Handle"]);
}

#[tokio::test]
async fn test_first_registered_behavior_is_outermost() {
    let log = CallLog::new();
    let mediator = echo_mediator(&log)
        .open_behavior(RecordingBehavior::new("B1", log.clone()))
        .open_behavior(RecordingBehavior::new("B2", log.clone()))
        .build()
        .unwrap();

    mediator.send(echo("x")).await.unwrap();

    assert_eq!(log.entries(), ["Before B1", "Before B2", "Handle", "After B2", "After B1"]);
}

#[tokio::test]
async fn test_open_and_typed_behaviors_keep_registration_order() {
    let log = CallLog::new();
    let mediator = echo_mediator(&log)
        .open_behavior(RecordingBehavior::new("Open1", log.clone()))
        .behavior(TypedRecorder {
            label: "Typed",
            log: log.clone(),
        })
        .open_behavior(RecordingBehavior::new("Open2", log.clone()))
        .build()
        .unwrap();

    mediator.send(echo("x")).await.unwrap();

    assert_eq!(
        log.entries(),
        ["Before Open1", "Before Typed", "Before Open2", "Handle", "After Open2", "After Typed", "After Open1"]
    );
}

#[tokio::test]
async fn test_open_behaviors_apply_to_every_request_type() {
    let log = CallLog::new();
    let mediator = echo_mediator(&log)
        .handler_fn(|_: Ping, _: CancellationToken| async { Ok::<_, MediatorError>("pong") })
        .open_behavior(RecordingBehavior::new("All", log.clone()))
        .build()
        .unwrap();

    assert_eq!(mediator.send(Ping).await.unwrap(), "pong");
    mediator.send(echo("x")).await.unwrap();

    assert_eq!(log.entries(), ["Before All", "After All", "Before All", "Handle", "After All"]);
}

#[tokio::test]
async fn test_short_circuit_skips_inner_behaviors_and_handler() {
    let log = CallLog::new();
    let mediator = echo_mediator(&log)
        .behavior(Canned)
        .open_behavior(RecordingBehavior::new("Inner", log.clone()))
        .build()
        .unwrap();

    assert_eq!(mediator.send(echo("x")).await.unwrap(), "canned");
    assert!(log.is_empty());
}

#[tokio::test]
async fn test_open_short_circuit_with_wrong_type_is_rejected() {
    let log = CallLog::new();
    let mediator = echo_mediator(&log).open_behavior(WrongShortCircuit).build().unwrap();

    let result = mediator.send(echo("x")).await;

    assert!(matches!(result, Err(MediatorError::ResponseTypeMismatch { .. })));
    assert!(log.is_empty());
}

#[tokio::test]
async fn test_missing_handler_is_not_found() {
    let mediator = Mediator::builder().build().unwrap();

    match mediator.send(Ping).await {
        Err(MediatorError::HandlerNotFound { request, response }) => {
            assert!(request.ends_with("Ping"));
            assert_eq!(response, "&str");
        }
        other => panic!("expected HandlerNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_handler_skips_behaviors() {
    let log = CallLog::new();
    let mediator = Mediator::builder()
        .open_behavior(RecordingBehavior::new("B1", log.clone()))
        .build()
        .unwrap();

    assert!(mediator.send(Ping).await.unwrap_err().is_not_found());
    assert!(log.is_empty());
}

#[test]
fn test_duplicate_registration_fails_build() {
    let result = Mediator::builder()
        .handler_fn(|_: Ping, _: CancellationToken| async { Ok::<_, MediatorError>("one") })
        .handler_fn(|_: Ping, _: CancellationToken| async { Ok::<_, MediatorError>("two") })
        .build();

    assert!(matches!(result, Err(MediatorError::DuplicateHandler { .. })));
}

#[tokio::test]
async fn test_handler_failure_passes_through_behaviors_unchanged() {
    let log = CallLog::new();
    let mediator = Mediator::builder()
        .handler_fn(|_: Echo, _: CancellationToken| async {
            Err::<String, _>(MediatorError::handler("inventory offline"))
        })
        .open_behavior(RecordingBehavior::new("B1", log.clone()))
        .behavior(Wrap)
        .build()
        .unwrap();

    let error = mediator.send(echo("x")).await.unwrap_err();

    assert_eq!(error.to_string(), "Handler failed: inventory offline");
    assert_eq!(log.entries(), ["Before B1", "After B1"]);
}

#[tokio::test]
async fn test_cancellation_token_reaches_handler() {
    let mediator = Mediator::builder()
        .handler_fn(|echo: Echo, cancel: CancellationToken| async move {
            if cancel.is_cancelled() {
                return Err(MediatorError::Cancelled);
            }
            Ok(echo.text)
        })
        .build()
        .unwrap();

    let token = CancellationToken::new();
    let live = tokio_test::assert_ok!(mediator.send_with_cancel(echo("live"), &token).await);
    assert_eq!(live, "live");

    token.cancel();
    let result = mediator.send_with_cancel(echo("late"), &token).await;
    assert!(matches!(result, Err(MediatorError::Cancelled)));
}

#[tokio::test]
async fn test_factory_handler_is_built_per_send() {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&built);
    let log = CallLog::new();
    let handler_log = log.clone();
    let mediator = Mediator::builder()
        .handler_factory::<Echo, _, _>(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            EchoHandler {
                log: handler_log.clone(),
            }
        })
        .build()
        .unwrap();

    mediator.send(echo("a")).await.unwrap();
    mediator.send(echo("b")).await.unwrap();

    assert_eq!(built.load(Ordering::SeqCst), 2);
    assert_eq!(log.len(), 2);
}

#[tokio::test]
async fn test_send_boxed_uses_runtime_type() {
    let log = CallLog::new();
    let mediator = echo_mediator(&log)
        .handler_fn(|_: Ping, _: CancellationToken| async { Ok::<_, MediatorError>("pong") })
        .behavior(Wrap)
        .build()
        .unwrap();

    let requests: Vec<Box<dyn AnyRequest<String>>> = vec![Box::new(echo("a")), Box::new(echo("b"))];
    let mut responses = Vec::new();
    for request in requests {
        responses.push(mediator.send_boxed(request).await.unwrap());
    }

    assert_eq!(responses, ["wrapped:aa", "wrapped:bb"]);
    assert_eq!(mediator.send_boxed::<&str>(Box::new(Ping)).await.unwrap(), "pong");
}

#[tokio::test]
async fn test_mediator_errors_convert_into_application_errors() -> anyhow::Result<()> {
    let log = CallLog::new();
    let mediator = echo_mediator(&log).behavior(Wrap).build()?;

    let response = mediator.send(echo("ok")).await?;
    assert_eq!(response, "wrapped:okok");

    let missing: anyhow::Error = mediator.send(Ping).await.unwrap_err().into();
    assert!(missing.downcast_ref::<MediatorError>().is_some_and(MediatorError::is_not_found));
    Ok(())
}

#[tokio::test]
async fn test_send_boxed_without_handler_is_not_found() {
    let mediator = Mediator::builder().build().unwrap();

    let error = mediator.send_boxed::<String>(Box::new(echo("a"))).await.unwrap_err();

    assert!(error.is_not_found());
}

#[tokio::test]
async fn test_concurrent_sends_share_one_mediator() {
    let log = CallLog::new();
    let mediator = echo_mediator(&log)
        .open_behavior(RecordingBehavior::new("B1", log.clone()))
        .build()
        .unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let mediator = mediator.clone();
            tokio::spawn(async move { mediator.send(echo(&i.to_string())).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(log.len(), 48);
    assert_eq!(mediator.registry().request_count(), 1);
    assert_eq!(mediator.registry().behavior_count(), 1);
}
