use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::PoolContext;

/// Fire-and-forget counters, keyed by pool name.
///
/// Every method must return without blocking the caller — workers and
/// publishers call these inline on the hot path. The three per-item hooks
/// take the item's [`PoolContext`] so an implementation can extract labels
/// from it (trace id, tenant); the pool never inspects the return value or
/// awaits these calls.
pub trait PoolMetrics: Send + Sync {
    fn worker_started(&self, pool: &str) {
        let _ = pool;
    }
    fn worker_stopped(&self, pool: &str) {
        let _ = pool;
    }
    fn work_enqueued(&self, pool: &str, ctx: &PoolContext) {
        let _ = (pool, ctx);
    }
    fn work_dequeued(&self, pool: &str, ctx: &PoolContext) {
        let _ = (pool, ctx);
    }
    fn work_dropped(&self, pool: &str, ctx: &PoolContext) {
        let _ = (pool, ctx);
    }
}

/// Default [`PoolMetrics`]: emits a `tracing` event per counter, matching
/// this crate's logging conventions elsewhere. Suitable when the embedding
/// application already scrapes metrics out of its tracing subscriber.
pub struct TracingMetrics;

impl PoolMetrics for TracingMetrics {
    fn worker_started(&self, pool: &str) {
        tracing::debug!(pool, "worker_started");
    }
    fn worker_stopped(&self, pool: &str) {
        tracing::debug!(pool, "worker_stopped");
    }
    fn work_enqueued(&self, pool: &str, ctx: &PoolContext) {
        tracing::trace!(pool, trace_id = ctx.field("trace_id").unwrap_or("-"), "work_enqueued");
    }
    fn work_dequeued(&self, pool: &str, ctx: &PoolContext) {
        tracing::trace!(pool, trace_id = ctx.field("trace_id").unwrap_or("-"), "work_dequeued");
    }
    fn work_dropped(&self, pool: &str, ctx: &PoolContext) {
        tracing::warn!(pool, trace_id = ctx.field("trace_id").unwrap_or("-"), "work_dropped");
    }
}

/// A zero-dependency [`PoolMetrics`] backed by five `AtomicU64` counters, for
/// tests and for callers that want numbers without wiring a telemetry
/// backend.
#[derive(Default)]
pub struct AtomicMetrics {
    pub worker_started: AtomicU64,
    pub worker_stopped: AtomicU64,
    pub work_enqueued: AtomicU64,
    pub work_dequeued: AtomicU64,
    pub work_dropped: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            worker_started: self.worker_started.load(Ordering::SeqCst),
            worker_stopped: self.worker_stopped.load(Ordering::SeqCst),
            work_enqueued: self.work_enqueued.load(Ordering::SeqCst),
            work_dequeued: self.work_dequeued.load(Ordering::SeqCst),
            work_dropped: self.work_dropped.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub worker_started: u64,
    pub worker_stopped: u64,
    pub work_enqueued: u64,
    pub work_dequeued: u64,
    pub work_dropped: u64,
}

impl PoolMetrics for AtomicMetrics {
    fn worker_started(&self, _pool: &str) {
        self.worker_started.fetch_add(1, Ordering::SeqCst);
    }
    fn worker_stopped(&self, _pool: &str) {
        self.worker_stopped.fetch_add(1, Ordering::SeqCst);
    }
    fn work_enqueued(&self, _pool: &str, _ctx: &PoolContext) {
        self.work_enqueued.fetch_add(1, Ordering::SeqCst);
    }
    fn work_dequeued(&self, _pool: &str, _ctx: &PoolContext) {
        self.work_dequeued.fetch_add(1, Ordering::SeqCst);
    }
    fn work_dropped(&self, _pool: &str, _ctx: &PoolContext) {
        self.work_dropped.fetch_add(1, Ordering::SeqCst);
    }
}
