use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Restart policy requested when starting a long-lived task.
///
/// The pool always requests [`RestartPolicy::Never`] for its worker tasks:
/// restarting a worker would race with the counter decrement the worker
/// performs on exit (see the worker loop's exit bookkeeping), so elasticity
/// is achieved purely by on-demand spawning from the publisher path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    Never,
    OnFailure,
    Always,
}

/// Backoff applied between restart attempts, when the restart policy is not
/// [`RestartPolicy::Never`]. The pool never exercises this itself, but a
/// [`TaskHost`] shared with other long-lived tasks needs somewhere to carry
/// it.
#[derive(Debug, Clone, Copy)]
pub struct BackoffSpec {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffSpec {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(30),
        }
    }
}

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A task submitted to a [`TaskHost`].
pub struct TaskSpec {
    /// Identifier used in log fields (typically the pool name, possibly
    /// suffixed with a worker id).
    pub name: String,
    pub root: CancellationToken,
    pub restart: RestartPolicy,
    pub backoff: BackoffSpec,
    pub body: BoxedTask,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, root: CancellationToken, body: BoxedTask) -> Self {
        Self {
            name: name.into(),
            root,
            restart: RestartPolicy::Never,
            backoff: BackoffSpec::default(),
            body,
        }
    }
}

/// Spawns and (per its restart policy) restarts long-lived background tasks
/// under a root lifetime.
///
/// The pool's only requirement of its host is that `start_task` actually
/// runs the body exactly once when the policy is [`RestartPolicy::Never`] —
/// which is the only policy the pool ever requests.
#[async_trait]
pub trait TaskHost: Send + Sync {
    async fn start_task(&self, spec: TaskSpec) -> JoinHandle<()>;
}

/// The default [`TaskHost`]: spawns directly onto the ambient tokio runtime.
/// A panic in the task body is logged (restart policy `Never` means the
/// host reports the failure but does not resubmit the task).
///
/// The body runs on its own inner task so a panic there unwinds into a
/// `JoinError` this host can observe, rather than unwinding straight out of
/// the task whose exit the caller's returned `JoinHandle` reports.
pub struct TokioTaskHost;

#[async_trait]
impl TaskHost for TokioTaskHost {
    async fn start_task(&self, spec: TaskSpec) -> JoinHandle<()> {
        let name = spec.name;
        tokio::spawn(async move {
            match tokio::spawn(spec.body).await {
                Ok(()) => tracing::debug!(task = %name, "task host task exited"),
                Err(join_err) if join_err.is_panic() => {
                    tracing::error!(task = %name, error = %join_err, "task host task panicked");
                }
                Err(join_err) => {
                    tracing::debug!(task = %name, error = %join_err, "task host task cancelled");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn tokio_task_host_runs_the_body() {
        let host = TokioTaskHost;
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        let root = CancellationToken::new();

        let handle = host
            .start_task(TaskSpec::new(
                "test",
                root,
                Box::pin(async move {
                    ran2.store(true, Ordering::SeqCst);
                }),
            ))
            .await;

        handle.await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn tokio_task_host_contains_a_panicking_body() {
        let host = TokioTaskHost;
        let root = CancellationToken::new();

        let handle = host
            .start_task(TaskSpec::new(
                "panicking",
                root,
                Box::pin(async move {
                    panic!("boom");
                }),
            ))
            .await;

        // The supervising task itself must complete normally even though
        // the body it ran panicked.
        assert!(handle.await.is_ok());
    }
}
