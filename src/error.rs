use thiserror::Error;

/// Errors surfaced to a publisher by [`crate::pool::WorkerPool::publish`].
///
/// Worker-internal exits (idle retirement, context cancellation while waiting
/// for work) are never surfaced here; they are only observable through
/// [`crate::metrics::PoolMetrics::worker_stopped`].
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool '{0}' is shutting down")]
    RootTerminated(String),

    #[error("publish was cancelled by the caller")]
    PublisherCancelled,

    #[error("worker pool '{0}' is full")]
    PoolFull(String),

    #[error("failed to construct a handler for worker pool '{pool}': {source}")]
    HandlerFactory {
        pool: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type Result<T> = std::result::Result<T, PoolError>;
