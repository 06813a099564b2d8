use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use taskpool::{Handler, HandlerFactoryError, PoolConfig, PoolContext, PoolError, WorkerPool};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Sleeps for a fixed duration before recording the item it saw, so tests
/// can assert both "was handled" and "was handled with this context".
struct SleepingHandler {
    sleep: Duration,
    seen: Arc<Mutex<Vec<(u64, Option<String>)>>>,
}

#[async_trait]
impl Handler<u64> for SleepingHandler {
    async fn handle(&mut self, ctx: PoolContext, item: u64) {
        tokio::time::sleep(self.sleep).await;
        let marker = ctx.field("marker").map(String::from);
        self.seen.lock().await.push((item, marker));
    }
}

fn handler_factory(
    sleep: Duration,
    seen: Arc<Mutex<Vec<(u64, Option<String>)>>>,
) -> Box<dyn Fn() -> Result<Box<dyn Handler<u64>>, HandlerFactoryError> + Send + Sync> {
    Box::new(move || {
        Ok(Box::new(SleepingHandler {
            sleep,
            seen: seen.clone(),
        }) as Box<dyn Handler<u64>>)
    })
}

#[tokio::test]
async fn cold_start_absorbs_a_burst_then_retires_to_the_floor() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let config = PoolConfig::new("cold-start", handler_factory(Duration::from_millis(50), seen.clone()))
        .min_workers(1)
        .max_workers(4)
        .queue_size(0)
        .worker_idle_timeout(Duration::from_millis(200));

    let pool: WorkerPool<u64> = WorkerPool::new(config).await.unwrap();

    for i in 0..4 {
        let ctx = PoolContext::new();
        pool.publish(&ctx, i).await.unwrap();
    }

    assert_eq!(pool.worker_count(), 4);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(pool.worker_count(), 1);
    assert_eq!(seen.lock().await.len(), 4);
}

#[tokio::test]
async fn overflow_beyond_queue_and_one_worker_is_dropped() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let config = PoolConfig::new("overflow", handler_factory(Duration::from_millis(500), seen.clone()))
        .min_workers(1)
        .max_workers(1)
        .queue_size(1)
        .worker_busy_timeout(Duration::from_millis(10));

    let pool: WorkerPool<u64> = WorkerPool::new(config).await.unwrap();

    let ctx = PoolContext::new();
    pool.publish(&ctx, 1).await.unwrap();
    pool.publish(&ctx, 2).await.unwrap();

    let third = pool.publish(&ctx, 3).await;
    assert!(matches!(third, Err(PoolError::PoolFull(_))));
}

#[tokio::test]
async fn root_cancellation_wins_over_the_busy_wait() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let root = CancellationToken::new();
    let config = PoolConfig::new("root-cancel", handler_factory(Duration::from_secs(1), seen.clone()))
        .min_workers(1)
        .max_workers(1)
        .queue_size(0)
        .worker_busy_timeout(Duration::from_secs(5))
        .root(root.clone());

    let pool: WorkerPool<u64> = WorkerPool::new(config).await.unwrap();

    let ctx = PoolContext::new();
    pool.publish(&ctx, 1).await.unwrap();

    let pool2 = pool.clone();
    let handle = tokio::spawn(async move {
        let ctx = PoolContext::new();
        pool2.publish(&ctx, 2).await
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    root.cancel();

    let result = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("second publish should resolve well before WorkerBusyTimeout")
        .unwrap();

    assert!(matches!(result, Err(PoolError::RootTerminated(_))));
}

#[tokio::test]
async fn per_item_context_survives_worker_turnover() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let config = PoolConfig::new("turnover", handler_factory(Duration::from_millis(10), seen.clone()))
        .min_workers(1)
        .max_workers(1)
        .queue_size(1)
        .worker_idle_timeout(Duration::from_millis(50));

    let pool: WorkerPool<u64> = WorkerPool::new(config).await.unwrap();

    let ctx_x = PoolContext::new().with_field("marker", "X");
    pool.publish(&ctx_x, 1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let ctx_y = PoolContext::new().with_field("marker", "Y");
    pool.publish(&ctx_y, 2).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let seen = seen.lock().await;
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], (1, Some("X".to_string())));
    assert_eq!(seen[1], (2, Some("Y".to_string())));
}

#[tokio::test]
async fn handler_factory_failure_is_returned_and_count_is_unchanged() {
    let calls = Arc::new(AtomicU64::new(0));
    let calls2 = calls.clone();
    let create_handler: Box<
        dyn Fn() -> Result<Box<dyn Handler<u64>>, HandlerFactoryError> + Send + Sync,
    > = Box::new(move || {
        let n = calls2.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            Ok(Box::new(SleepingHandler {
                sleep: Duration::from_millis(10),
                seen: Arc::new(Mutex::new(Vec::new())),
            }) as Box<dyn Handler<u64>>)
        } else {
            Err("handler construction failed".into())
        }
    });

    let config = PoolConfig::new("factory-failure", create_handler)
        .min_workers(1)
        .max_workers(2)
        .queue_size(0);

    let pool: WorkerPool<u64> = WorkerPool::new(config).await.unwrap();
    let count_before = pool.worker_count();

    let ctx = PoolContext::new();
    pool.publish(&ctx, 1).await.unwrap();

    let second = pool.publish(&ctx, 2).await;
    assert!(matches!(second, Err(PoolError::HandlerFactory { .. })));
    assert_eq!(pool.worker_count(), count_before);
}

/// Handler that panics on a chosen item, so the panic unwinds out of
/// `worker::run` with nothing in this crate catching it locally (only
/// `TokioTaskHost`'s outer wrapper task observes the `JoinError`).
struct PanickingHandler {
    panic_on: u64,
    seen: Arc<Mutex<Vec<u64>>>,
}

#[async_trait]
impl Handler<u64> for PanickingHandler {
    async fn handle(&mut self, _ctx: PoolContext, item: u64) {
        if item == self.panic_on {
            panic!("handler intentionally panicked on item {item}");
        }
        self.seen.lock().await.push(item);
    }
}

#[tokio::test]
async fn handler_panic_still_decrements_the_worker_count() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = seen.clone();
    let create_handler: Box<
        dyn Fn() -> Result<Box<dyn Handler<u64>>, HandlerFactoryError> + Send + Sync,
    > = Box::new(move || {
        Ok(Box::new(PanickingHandler {
            panic_on: 1,
            seen: seen2.clone(),
        }) as Box<dyn Handler<u64>>)
    });

    let config = PoolConfig::new("panic-unwind", create_handler)
        .min_workers(1)
        .max_workers(1)
        .queue_size(0);

    let pool: WorkerPool<u64> = WorkerPool::new(config).await.unwrap();
    assert_eq!(pool.worker_count(), 1);

    let ctx = PoolContext::new();
    // Accepted by the sole worker's rendezvous slot; that worker's task then
    // panics inside the handler.
    pool.publish(&ctx, 1).await.unwrap();

    // Give the panicking task time to unwind and the counter's `Drop` guard
    // time to run.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(pool.worker_count(), 0, "a panicked worker must not leak its counter slot");

    // The pool is still usable: publishing again spawns a fresh worker.
    pool.publish(&ctx, 2).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.worker_count(), 1);
    assert_eq!(seen.lock().await.as_slice(), &[2]);
}

#[tokio::test]
async fn rendezvous_queue_never_buffers_while_the_only_worker_is_busy() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let config = PoolConfig::new(
        "rendezvous-contention",
        handler_factory(Duration::from_millis(200), seen.clone()),
    )
    .min_workers(1)
    .max_workers(1)
    .queue_size(0)
    .worker_busy_timeout(Duration::from_millis(20));

    let pool: WorkerPool<u64> = WorkerPool::new(config).await.unwrap();

    let ctx = PoolContext::new();
    // Taken immediately by the sole parked worker, which then spends
    // 200ms inside the handler.
    pool.publish(&ctx, 1).await.unwrap();

    // The only worker is now busy, not parked. With max_workers == 1 no
    // second worker can be spawned, so this publish must not be able to
    // place an item in the rendezvous slot: it should time out as
    // `pool_full` well before the first handler call returns, rather than
    // succeeding into an unattended buffered slot.
    let second = pool.publish(&ctx, 2).await;
    assert!(
        matches!(second, Err(PoolError::PoolFull(_))),
        "expected pool_full while the only worker was mid-handler, got {second:?}"
    );

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(seen.lock().await.as_slice(), &[1]);
}

#[tokio::test]
async fn worker_count_never_goes_negative_under_bursts() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let config = PoolConfig::new("no-underflow", handler_factory(Duration::from_millis(1), seen.clone()))
        .min_workers(0)
        .max_workers(8)
        .queue_size(4)
        .worker_idle_timeout(Duration::from_millis(5));

    let pool: WorkerPool<u64> = WorkerPool::new(config).await.unwrap();
    assert_eq!(pool.worker_count(), 1);

    for burst in 0..20u64 {
        for i in 0..8u64 {
            let ctx = PoolContext::new();
            let _ = pool.publish(&ctx, burst * 8 + i).await;
        }
        assert!(pool.worker_count() >= 0);
        tokio::time::sleep(Duration::from_millis(15)).await;
    }

    assert!(pool.worker_count() >= 0);
}
