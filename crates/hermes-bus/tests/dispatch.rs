//! End-to-end dispatch scenarios.

use hermes_bus::{BackPressureStrategy, CommandBus, DispatchOptions};
use hermes_core::{
    Command, CommandContext, CommandEnvelope, CommandHandler, CommandMetadata, HermesError,
};
use hermes_middleware::stages::{KeyExtractor, RateLimitMiddleware};
use hermes_middleware::{BoxFuture, Middleware, MiddlewareResult, Next, Priority};
use hermes_resilience::{BreakerState, CircuitBreakerConfig, DelayStrategy, RetryPolicy};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
struct AddNumbers {
    a: i64,
    b: i64,
}

impl Command for AddNumbers {
    type Output = i64;
}

struct AddNumbersHandler;

impl CommandHandler<AddNumbers> for AddNumbersHandler {
    async fn handle(&self, command: AddNumbers, _ctx: &CommandContext) -> Result<i64, HermesError> {
        Ok(command.a + command.b)
    }
}

#[derive(Clone)]
struct TestCommand;

impl Command for TestCommand {
    type Output = ();
}

/// Handler whose failure behaviour and invocation count are observable.
struct FlakyHandler {
    fail: Arc<AtomicBool>,
    invocations: Arc<AtomicU32>,
}

impl CommandHandler<TestCommand> for FlakyHandler {
    async fn handle(&self, _command: TestCommand, _ctx: &CommandContext) -> Result<(), HermesError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            Err(HermesError::execution_failed("transient backend failure"))
        } else {
            Ok(())
        }
    }
}

/// Records Before/After markers around the rest of the chain.
struct OrderTrackingMiddleware {
    name: &'static str,
    priority: Priority,
    log: Arc<Mutex<Vec<String>>>,
}

impl Middleware for OrderTrackingMiddleware {
    fn name(&self) -> &'static str {
        self.name
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn execute<'a>(
        &'a self,
        command: CommandEnvelope,
        ctx: &'a CommandContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            self.log.lock().push(format!("Before:{}", self.name));
            let result = next.run(command, ctx).await;
            self.log.lock().push(format!("After:{}", self.name));
            result
        })
    }
}

fn ordered_middleware(
    name: &'static str,
    priority: i32,
    log: Arc<Mutex<Vec<String>>>,
) -> Arc<dyn Middleware> {
    Arc::new(OrderTrackingMiddleware {
        name,
        priority: Priority::new(priority),
        log,
    })
}

/// Scenario: a registered add handler produces the sum.
#[tokio::test]
async fn basic_dispatch_returns_handler_output() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let bus = CommandBus::new();
    bus.register::<AddNumbers, _>(AddNumbersHandler).unwrap();

    let sum = bus.send(AddNumbers { a: 5, b: 3 }).await.unwrap();
    assert_eq!(sum, 8);
}

/// Scenario: middleware with priorities 100, 150, 500 wrap the handler as
/// an onion.
#[tokio::test]
async fn middleware_executes_in_priority_order() {
    let bus = CommandBus::new();
    bus.register::<AddNumbers, _>(AddNumbersHandler).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    // Registration order deliberately differs from priority order.
    bus.add_middleware(ordered_middleware("500", 500, Arc::clone(&log)));
    bus.add_middleware(ordered_middleware("100", 100, Arc::clone(&log)));
    bus.add_middleware(ordered_middleware("150", 150, Arc::clone(&log)));

    bus.send(AddNumbers { a: 1, b: 1 }).await.unwrap();

    assert_eq!(
        log.lock().as_slice(),
        [
            "Before:100",
            "Before:150",
            "Before:500",
            "After:500",
            "After:150",
            "After:100"
        ]
    );
}

/// Scenario: a token bucket of capacity 5 admits five commands from one
/// user, rejects the sixth, and leaves other users unaffected.
#[tokio::test]
async fn rate_limit_is_per_user() {
    let bus = CommandBus::new();
    bus.register::<TestCommand, _>(FlakyHandler {
        fail: Arc::new(AtomicBool::new(false)),
        invocations: Arc::new(AtomicU32::new(0)),
    })
    .unwrap();
    bus.add_middleware(Arc::new(
        RateLimitMiddleware::builder()
            .capacity(5.0)
            .refill_per_sec(1.0)
            .key_extractor(KeyExtractor::UserId)
            .build(),
    ));

    for _ in 0..5 {
        bus.send_with_metadata(TestCommand, CommandMetadata::new().with_user_id("user1"))
            .await
            .unwrap();
    }

    let err = bus
        .send_with_metadata(TestCommand, CommandMetadata::new().with_user_id("user1"))
        .await
        .unwrap_err();
    assert!(matches!(err, HermesError::RateLimitExceeded { .. }));

    // user2's first call still succeeds.
    bus.send_with_metadata(TestCommand, CommandMetadata::new().with_user_id("user2"))
        .await
        .unwrap();
}

/// Scenario: three failures open the breaker; dispatches fail fast until
/// the open timeout elapses; a successful probe closes it again.
#[tokio::test(start_paused = true)]
async fn circuit_breaker_opens_probes_and_closes() {
    let fail = Arc::new(AtomicBool::new(true));
    let invocations = Arc::new(AtomicU32::new(0));

    let bus = CommandBus::builder()
        .circuit_breaker(CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 1,
            open_timeout: Duration::from_millis(100),
        })
        .build();
    bus.register::<TestCommand, _>(FlakyHandler {
        fail: Arc::clone(&fail),
        invocations: Arc::clone(&invocations),
    })
    .unwrap();

    for _ in 0..3 {
        let err = bus.send(TestCommand).await.unwrap_err();
        assert!(matches!(err, HermesError::ExecutionFailed { .. }));
    }
    assert_eq!(bus.breaker().unwrap().state(), BreakerState::Open);

    // The handler would now succeed, but the open breaker fails fast
    // without invoking the pipeline.
    fail.store(false, Ordering::SeqCst);
    let err = bus.send(TestCommand).await.unwrap_err();
    assert!(matches!(err, HermesError::CircuitBreakerOpen { .. }));
    assert_eq!(invocations.load(Ordering::SeqCst), 3);

    tokio::time::sleep(Duration::from_millis(150)).await;

    // The probe succeeds and the breaker returns to closed.
    bus.send(TestCommand).await.unwrap();
    assert_eq!(bus.breaker().unwrap().state(), BreakerState::Closed);
    assert_eq!(invocations.load(Ordering::SeqCst), 4);
}

/// Scenario: a retrying dispatch is cancelled during the first back-off
/// sleep; the cancellation surfaces immediately and no further attempt is
/// made.
#[tokio::test(start_paused = true)]
async fn retry_aborts_on_cancellation() {
    let invocations = Arc::new(AtomicU32::new(0));

    let bus = CommandBus::builder()
        .dispatch_timeout(Duration::from_millis(200))
        .build();
    bus.register::<TestCommand, _>(FlakyHandler {
        fail: Arc::new(AtomicBool::new(true)),
        invocations: Arc::clone(&invocations),
    })
    .unwrap();

    let policy = RetryPolicy::new(5, DelayStrategy::constant(Duration::from_millis(500)));
    let err = bus
        .send_with_policy(TestCommand, CommandMetadata::new(), &policy)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(
        invocations.load(Ordering::SeqCst),
        1,
        "no attempt may follow a cancellation"
    );
}

/// Handler that holds its execution open until released.
struct BlockingHandler {
    release: Arc<tokio::sync::Semaphore>,
}

impl CommandHandler<TestCommand> for BlockingHandler {
    async fn handle(&self, _command: TestCommand, _ctx: &CommandContext) -> Result<(), HermesError> {
        let permit = self
            .release
            .acquire()
            .await
            .map_err(|_| HermesError::execution_failed("release semaphore closed"))?;
        permit.forget();
        Ok(())
    }
}

/// Scenario: maxConcurrency=2, maxOutstanding=3, error(nil): two commands
/// run, a third queues, a fourth fails immediately with queueFull.
#[tokio::test]
async fn back_pressure_bounds_active_and_outstanding() {
    let release = Arc::new(tokio::sync::Semaphore::new(0));

    let bus = Arc::new(
        CommandBus::builder()
            .options(DispatchOptions {
                max_concurrency: Some(2),
                max_outstanding: Some(3),
                strategy: BackPressureStrategy::Error { timeout: None },
                dispatch_timeout: None,
            })
            .build(),
    );
    bus.register::<TestCommand, _>(BlockingHandler {
        release: Arc::clone(&release),
    })
    .unwrap();

    let mut in_flight = Vec::new();
    for _ in 0..3 {
        let bus = Arc::clone(&bus);
        in_flight.push(tokio::spawn(async move { bus.send(TestCommand).await }));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let stats = bus.gate_stats().unwrap();
    assert_eq!(stats.active_operations, 2, "only two executions may run");
    assert_eq!(stats.pending_waiters, 1, "the third call queues");

    // The fourth admission exceeds maxOutstanding and fails immediately.
    let err = bus.send(TestCommand).await.unwrap_err();
    assert!(matches!(err, HermesError::QueueFull));

    // Releasing the handlers drains the queue; everything completes.
    release.add_permits(3);
    for handle in in_flight {
        handle.await.unwrap().unwrap();
    }

    let stats = bus.gate_stats().unwrap();
    assert_eq!(stats.active_operations, 0);
    assert_eq!(stats.pending_waiters, 0);
    assert_eq!(stats.total_acquired, 3);
}

/// Stable tie-break: equal-priority middleware run in registration order.
#[tokio::test]
async fn equal_priority_middleware_keep_registration_order() {
    let bus = CommandBus::new();
    bus.register::<AddNumbers, _>(AddNumbersHandler).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    bus.add_middleware(ordered_middleware("A", 100, Arc::clone(&log)));
    bus.add_middleware(ordered_middleware("B", 100, Arc::clone(&log)));

    bus.send(AddNumbers { a: 0, b: 0 }).await.unwrap();

    assert_eq!(
        log.lock().as_slice(),
        ["Before:A", "Before:B", "After:B", "After:A"]
    );
}
