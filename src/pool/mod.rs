//! The elastic worker pool: a bounded queue, a lock-free worker population
//! counter, demand-driven spawn, idle-driven retirement, and bounded-wait
//! backpressure on the publisher path. See `SPEC_FULL.md` §2-§5 for the
//! design this module implements.

mod config;
mod counter;
mod handler;
mod queue;
mod worker;

pub use config::PoolConfig;
pub use handler::{CreateHandler, FnHandler, Handler, HandlerFactoryError};
pub use queue::ContextualItem;

use std::sync::Arc;

use config::ResolvedPoolConfig;
use counter::WorkerCounter;
use queue::{Queue, TryPushOutcome};

use crate::context::{ContextAdapter, PoolContext};
use crate::error::{PoolError, Result};
use crate::metrics::PoolMetrics;
use crate::task_host::{TaskHost, TaskSpec};

/// An elastic pool of long-lived worker tasks dispatching items of type `T`.
///
/// `WorkerPool` is cheap to clone — cloning shares the same queue, counter,
/// and collaborators, so any number of publisher handles may be held
/// concurrently.
pub struct WorkerPool<T: Send + 'static> {
    name: Arc<str>,
    queue: Queue<T>,
    counter: Arc<WorkerCounter>,
    create_handler: Arc<CreateHandler<T>>,
    min_workers: i32,
    max_workers: i32,
    worker_idle_timeout: std::time::Duration,
    worker_busy_timeout: std::time::Duration,
    root: tokio_util::sync::CancellationToken,
    task_host: Arc<dyn TaskHost>,
    context_adapter: Arc<dyn ContextAdapter>,
    metrics: Arc<dyn PoolMetrics>,
    next_worker_id: Arc<std::sync::atomic::AtomicU64>,
}

impl<T: Send + 'static> Clone for WorkerPool<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            queue: self.queue.clone(),
            counter: self.counter.clone(),
            create_handler: self.create_handler.clone(),
            min_workers: self.min_workers,
            max_workers: self.max_workers,
            worker_idle_timeout: self.worker_idle_timeout,
            worker_busy_timeout: self.worker_busy_timeout,
            root: self.root.clone(),
            task_host: self.task_host.clone(),
            context_adapter: self.context_adapter.clone(),
            metrics: self.metrics.clone(),
            next_worker_id: self.next_worker_id.clone(),
        }
    }
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Constructs a pool per §6's constructor surface: defaults and
    /// coercions are applied to `config` first, then `min_workers` workers
    /// are spawned eagerly. If any of those eager spawns hits a handler
    /// factory failure, construction fails and no partially-started pool is
    /// returned.
    pub async fn new(config: PoolConfig<T>) -> Result<Self> {
        let resolved: ResolvedPoolConfig<T> = config.resolve();

        let pool = Self {
            name: Arc::from(resolved.name.as_str()),
            queue: Queue::bounded(resolved.queue_size),
            counter: Arc::new(WorkerCounter::new()),
            create_handler: Arc::new(resolved.create_handler),
            min_workers: resolved.min_workers,
            max_workers: resolved.max_workers,
            worker_idle_timeout: resolved.worker_idle_timeout,
            worker_busy_timeout: resolved.worker_busy_timeout,
            root: resolved.root,
            task_host: resolved.task_host,
            context_adapter: resolved.context_adapter,
            metrics: resolved.metrics,
            next_worker_id: Arc::new(std::sync::atomic::AtomicU64::new(0)),
        };

        for _ in 0..pool.min_workers {
            pool.spawn_worker().await?;
        }

        // Give the eagerly-spawned workers a chance to actually reach their
        // select loop (and park) before handing callers a pool they might
        // immediately publish into — spawning only queues the task, it
        // doesn't run it.
        tokio::task::yield_now().await;

        Ok(pool)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current worker population. May be transiently stale under
    /// concurrent spawn/retire activity, but never observed outside
    /// `[0, max_workers]`.
    pub fn worker_count(&self) -> i32 {
        self.counter.get()
    }

    /// The sole public runtime operation (§4.4). Adapts `ctx`, then:
    /// non-blocking push; on failure, an attempt to spawn a worker; then a
    /// bounded wait for capacity, racing root termination, the caller's own
    /// cancellation, and `worker_busy_timeout`.
    pub async fn publish(&self, ctx: &PoolContext, item: T) -> Result<()> {
        if self.root.is_cancelled() {
            return Err(PoolError::RootTerminated(self.name.to_string()));
        }
        if ctx.is_cancelled() {
            return Err(PoolError::PublisherCancelled);
        }

        let adapted = self.context_adapter.adapt(ctx);
        let metrics_ctx = adapted.clone();

        match self.queue.try_push(adapted, item) {
            TryPushOutcome::Pushed => {
                self.metrics.work_enqueued(&self.name, &metrics_ctx);
                Ok(())
            }
            TryPushOutcome::Full(adapted, item) => {
                // A handler-factory failure here is returned directly; the
                // cap being already reached (spawn declined, no error) is
                // not a failure — fall through to the bounded wait either
                // way per §4.4 step 3.
                self.spawn_worker().await?;

                let outcome = self
                    .queue
                    .push_wait(
                        &self.name,
                        adapted,
                        item,
                        &self.root,
                        self.worker_busy_timeout,
                    )
                    .await;

                match &outcome {
                    Ok(()) => self.metrics.work_enqueued(&self.name, &metrics_ctx),
                    Err(PoolError::PoolFull(_)) => self.metrics.work_dropped(&self.name, &metrics_ctx),
                    Err(_) => {}
                }

                outcome
            }
        }
    }

    async fn spawn_worker(&self) -> Result<bool> {
        let handler = (self.create_handler)().map_err(|source| PoolError::HandlerFactory {
            pool: self.name.to_string(),
            source,
        })?;

        if !self.counter.try_increment_below(self.max_workers) {
            return Ok(false);
        }

        let worker_id = self
            .next_worker_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let worker_name = format!("{}-{worker_id}", self.name);

        let queue = self.queue.clone();
        let counter = self.counter.clone();
        let root = self.root.clone();
        let min_workers = self.min_workers;
        let idle_timeout = self.worker_idle_timeout;
        let metrics = self.metrics.clone();
        let pool_name = self.name.to_string();

        let body = Box::pin(worker::run(
            pool_name,
            worker_id.to_string(),
            queue,
            counter,
            root.clone(),
            min_workers,
            idle_timeout,
            handler,
            metrics,
        ));

        self.task_host
            .start_task(TaskSpec::new(worker_name, root, body))
            .await;

        Ok(true)
    }

    /// Signals the root lifetime ended, waking every worker and failing any
    /// in-flight `publish` calls. Does not wait for worker tasks to join —
    /// callers that need that should keep the `JoinHandle`s returned by
    /// their own `TaskHost`, or use a host that tracks them.
    pub fn shutdown(&self) {
        tracing::info!(pool = %self.name, "worker pool shutting down");
        self.root.cancel();
        self.queue.close();
    }
}
