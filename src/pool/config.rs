use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::context::{ContextAdapter, DetachingAdapter};
use crate::metrics::{PoolMetrics, TracingMetrics};
use crate::task_host::{TaskHost, TokioTaskHost};

use super::handler::CreateHandler;

pub const DEFAULT_WORKER_IDLE_TIMEOUT: Duration = Duration::from_millis(128);
pub const DEFAULT_WORKER_BUSY_TIMEOUT: Duration = Duration::from_millis(64);

/// Configuration for a [`super::WorkerPool`], consumed once at construction
/// time — the pool is deliberately not reconfigurable afterward (see
/// spec Non-goals: dynamic reconfiguration of bounds is out of scope).
pub struct PoolConfig<T: Send + 'static> {
    /// Identifier used in metrics and log fields.
    pub name: String,
    pub create_handler: CreateHandler<T>,
    /// Floor enforced by worker retirement. `<= 0` is coerced to `1`.
    pub min_workers: i32,
    /// Ceiling enforced by worker spawn. `<= 0` is coerced to `1`, then
    /// raised to `min_workers` if still below it.
    pub max_workers: i32,
    /// Capacity of the internal queue. Negative is coerced to `0`, which is
    /// valid and means every push requires a worker ready to receive
    /// immediately.
    pub queue_size: i32,
    /// Per-worker idle clock. `<= 0` is replaced by
    /// [`DEFAULT_WORKER_IDLE_TIMEOUT`].
    pub worker_idle_timeout: Duration,
    /// Publisher patience after a spawn attempt. `<= 0` is replaced by
    /// [`DEFAULT_WORKER_BUSY_TIMEOUT`].
    pub worker_busy_timeout: Duration,
    /// The lifetime under which all workers run. Its cancellation is a hard
    /// stop signal for every worker and for in-flight `publish` calls.
    pub root: CancellationToken,
    pub task_host: Arc<dyn TaskHost>,
    pub context_adapter: Arc<dyn ContextAdapter>,
    pub metrics: Arc<dyn PoolMetrics>,
}

impl<T: Send + 'static> PoolConfig<T> {
    /// A config with every collaborator defaulted except `name` and
    /// `create_handler`, which have no sensible default.
    pub fn new(name: impl Into<String>, create_handler: CreateHandler<T>) -> Self {
        Self {
            name: name.into(),
            create_handler,
            min_workers: 1,
            max_workers: 1,
            queue_size: 0,
            worker_idle_timeout: DEFAULT_WORKER_IDLE_TIMEOUT,
            worker_busy_timeout: DEFAULT_WORKER_BUSY_TIMEOUT,
            root: CancellationToken::new(),
            task_host: Arc::new(TokioTaskHost),
            context_adapter: Arc::new(DetachingAdapter),
            metrics: Arc::new(TracingMetrics),
        }
    }

    pub fn min_workers(mut self, n: i32) -> Self {
        self.min_workers = n;
        self
    }

    pub fn max_workers(mut self, n: i32) -> Self {
        self.max_workers = n;
        self
    }

    pub fn queue_size(mut self, n: i32) -> Self {
        self.queue_size = n;
        self
    }

    pub fn worker_idle_timeout(mut self, d: Duration) -> Self {
        self.worker_idle_timeout = d;
        self
    }

    pub fn worker_busy_timeout(mut self, d: Duration) -> Self {
        self.worker_busy_timeout = d;
        self
    }

    pub fn root(mut self, root: CancellationToken) -> Self {
        self.root = root;
        self
    }

    pub fn task_host(mut self, host: Arc<dyn TaskHost>) -> Self {
        self.task_host = host;
        self
    }

    pub fn context_adapter(mut self, adapter: Arc<dyn ContextAdapter>) -> Self {
        self.context_adapter = adapter;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn PoolMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Applies the constructor-time defaulting and coercion rules: zero
    /// timeouts fall back to their defaults, `min_workers <= 0` becomes `1`,
    /// `max_workers` is clamped to be at least `min_workers`, and a
    /// negative `queue_size` becomes `0`.
    pub(super) fn resolve(self) -> ResolvedPoolConfig<T> {
        let min_workers = if self.min_workers <= 0 { 1 } else { self.min_workers };
        let mut max_workers = if self.max_workers <= 0 { 1 } else { self.max_workers };
        if max_workers < min_workers {
            max_workers = min_workers;
        }
        let queue_size = if self.queue_size < 0 { 0 } else { self.queue_size } as usize;
        let worker_idle_timeout = if self.worker_idle_timeout.is_zero() {
            DEFAULT_WORKER_IDLE_TIMEOUT
        } else {
            self.worker_idle_timeout
        };
        let worker_busy_timeout = if self.worker_busy_timeout.is_zero() {
            DEFAULT_WORKER_BUSY_TIMEOUT
        } else {
            self.worker_busy_timeout
        };

        ResolvedPoolConfig {
            name: self.name,
            create_handler: self.create_handler,
            min_workers,
            max_workers,
            queue_size,
            worker_idle_timeout,
            worker_busy_timeout,
            root: self.root,
            task_host: self.task_host,
            context_adapter: self.context_adapter,
            metrics: self.metrics,
        }
    }
}

/// The defaulted, coerced form of [`PoolConfig`] the pool actually runs
/// with. Not exposed outside the crate — external callers only ever see
/// `PoolConfig`, with defaults and coercions applied once at construction.
pub(super) struct ResolvedPoolConfig<T: Send + 'static> {
    pub name: String,
    pub create_handler: CreateHandler<T>,
    pub min_workers: i32,
    pub max_workers: i32,
    pub queue_size: usize,
    pub worker_idle_timeout: Duration,
    pub worker_busy_timeout: Duration,
    pub root: CancellationToken,
    pub task_host: Arc<dyn TaskHost>,
    pub context_adapter: Arc<dyn ContextAdapter>,
    pub metrics: Arc<dyn PoolMetrics>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_create_handler() -> CreateHandler<()> {
        Box::new(|| Err("unused".into()))
    }

    #[test]
    fn defaults_coerce_out_of_range_values() {
        let cfg = PoolConfig::new("p", dummy_create_handler())
            .min_workers(0)
            .max_workers(0)
            .queue_size(-5)
            .worker_idle_timeout(Duration::ZERO)
            .worker_busy_timeout(Duration::ZERO)
            .resolve();

        assert_eq!(cfg.min_workers, 1);
        assert_eq!(cfg.max_workers, 1);
        assert_eq!(cfg.queue_size, 0);
        assert_eq!(cfg.worker_idle_timeout, DEFAULT_WORKER_IDLE_TIMEOUT);
        assert_eq!(cfg.worker_busy_timeout, DEFAULT_WORKER_BUSY_TIMEOUT);
    }

    #[test]
    fn max_workers_is_raised_to_min_workers() {
        let cfg = PoolConfig::new("p", dummy_create_handler())
            .min_workers(5)
            .max_workers(2)
            .resolve();

        assert_eq!(cfg.min_workers, 5);
        assert_eq!(cfg.max_workers, 5);
    }
}
