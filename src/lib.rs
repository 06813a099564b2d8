//! `taskpool`: an elastic, lock-free worker pool.
//!
//! A [`pool::WorkerPool`] dispatches items of a caller-chosen type `T` to a
//! dynamically sized set of long-lived worker tasks. The population grows on
//! demand (a publisher finding the queue full tries to spawn a worker before
//! waiting) and shrinks on its own (an idle worker retires itself once no
//! item arrives within its idle timeout), bounded below by `min_workers` and
//! above by `max_workers`. The worker count itself is a pair of
//! compare-and-swap retry loops — there is no mutex anywhere in the hot path.
//!
//! The collaborator seams a host application plugs into are [`TaskHost`]
//! (how worker tasks actually get spawned and supervised), [`ContextAdapter`]
//! (how a caller's request-scoped context is carried forward onto queued
//! work), and [`PoolMetrics`] (where the five pool counters go). Each has a
//! sensible default so `PoolConfig::new` is usable out of the box.

pub mod context;
pub mod error;
#[macro_use]
pub mod logging;
pub mod metrics;
pub mod pool;
pub mod task_host;

pub use context::{ContextAdapter, DetachingAdapter, PoolContext};
pub use error::{PoolError, Result};
pub use metrics::{AtomicMetrics, MetricsSnapshot, PoolMetrics, TracingMetrics};
pub use pool::{ContextualItem, CreateHandler, FnHandler, Handler, HandlerFactoryError, PoolConfig, WorkerPool};
pub use task_host::{BackoffSpec, RestartPolicy, TaskHost, TaskSpec, TokioTaskHost};
