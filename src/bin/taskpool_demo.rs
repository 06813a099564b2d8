use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use taskpool::{AtomicMetrics, Handler, PoolConfig, PoolContext, WorkerPool};

/// Counts items it receives; stands in for real work an embedding
/// application would hand to its own `Handler`.
struct PrintingHandler {
    seen: Arc<AtomicU64>,
}

#[async_trait]
impl Handler<u64> for PrintingHandler {
    async fn handle(&mut self, ctx: PoolContext, item: u64) {
        let total = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(
            item,
            total,
            trace_id = ctx.field("trace_id").unwrap_or("none"),
            "handled item"
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let min_workers: i32 = std::env::var("TASKPOOL_MIN_WORKERS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(2);
    let max_workers: i32 = std::env::var("TASKPOOL_MAX_WORKERS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8);
    let queue_size: i32 = std::env::var("TASKPOOL_QUEUE_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(16);
    let item_count: u64 = std::env::var("TASKPOOL_ITEM_COUNT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(64);

    tracing::info!(
        min_workers,
        max_workers,
        queue_size,
        item_count,
        "starting taskpool demo"
    );

    let seen = Arc::new(AtomicU64::new(0));
    let metrics = Arc::new(AtomicMetrics::new());

    let config = PoolConfig::new(
        "demo",
        Box::new({
            let seen = seen.clone();
            move || Ok(Box::new(PrintingHandler { seen: seen.clone() }) as Box<dyn Handler<u64>>)
        }),
    )
    .min_workers(min_workers)
    .max_workers(max_workers)
    .queue_size(queue_size)
    .worker_idle_timeout(Duration::from_millis(250))
    .worker_busy_timeout(Duration::from_millis(500))
    .metrics(metrics.clone());

    let pool: WorkerPool<u64> = WorkerPool::new(config).await?;

    for i in 0..item_count {
        let ctx = PoolContext::new().with_field("trace_id", format!("demo-{i}"));
        if let Err(err) = pool.publish(&ctx, i).await {
            tracing::warn!(item = i, error = %err, "publish failed");
        }
    }

    tokio::time::sleep(Duration::from_millis(750)).await;

    let snapshot = metrics.snapshot();
    tracing::info!(
        worker_count = pool.worker_count(),
        ?snapshot,
        "demo complete"
    );

    pool.shutdown();
    Ok(())
}
