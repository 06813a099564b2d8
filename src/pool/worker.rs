use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::metrics::PoolMetrics;

use super::counter::WorkerCounter;
use super::handler::Handler;
use super::queue::{ContextualItem, Queue};

/// Ensures `counter` is decremented exactly once when a worker exits, no
/// matter which path it exits by — including a handler panic unwinding
/// straight out of [`run`]. Constructed before the loop; a retirement exit
/// calls [`DecrementGuard::mark_decremented`] so `Drop` doesn't double-count
/// it, every other exit (including unwind) leaves the flag unset and `Drop`
/// performs the decrement.
struct DecrementGuard<'a> {
    counter: &'a WorkerCounter,
    already_decremented: Cell<bool>,
}

impl<'a> DecrementGuard<'a> {
    fn new(counter: &'a WorkerCounter) -> Self {
        Self {
            counter,
            already_decremented: Cell::new(false),
        }
    }

    fn mark_decremented(&self) {
        self.already_decremented.set(true);
    }
}

impl Drop for DecrementGuard<'_> {
    fn drop(&mut self) {
        if !self.already_decremented.get() {
            self.counter.decrement();
        }
    }
}

/// Runs one worker's state machine until it exits, per §4.3:
///
/// ```text
/// WAITING: select root-end / idle-timeout / item-dequeued
/// HANDLE:  record dequeue metric, invoke handler, back to WAITING
/// idle-timeout: try to retire (decrement above min); if declined, keep waiting
/// ```
///
/// The idle timer is constructed fresh on every loop iteration — reusing a
/// single `tokio::time::sleep` across iterations would measure time since
/// the worker started rather than time since its last activity, which is
/// not what "idle" means here.
pub(super) async fn run<T: Send + 'static>(
    pool_name: String,
    worker_id: String,
    queue: Queue<T>,
    counter: Arc<WorkerCounter>,
    root: CancellationToken,
    min_workers: i32,
    idle_timeout: Duration,
    mut handler: Box<dyn Handler<T>>,
    metrics: Arc<dyn PoolMetrics>,
) {
    metrics.worker_started(&pool_name);
    crate::log_pool_event!(debug, pool_name, worker_id, "worker started");

    // Guards the counter decrement across every exit path, including a
    // handler panic unwinding out of this function — `tokio::spawn`'s task
    // wrapper catches that unwind one frame up (see `TokioTaskHost`), but
    // nothing here catches it, so only `Drop` is guaranteed to run.
    let decrement_guard = DecrementGuard::new(&counter);

    loop {
        let idle_sleep = tokio::time::sleep(idle_timeout);
        // Held only for the span of the `select!` below: marks the worker as
        // able to receive so a rendezvous (queue_size == 0) publisher can
        // tell a push would actually be picked up, rather than just
        // buffered unattended. Must not still be held while a dequeued item
        // is being handled — a busy worker is not a ready receiver.
        let parked = queue.park_guard();

        tokio::select! {
            _ = root.cancelled() => {
                crate::log_pool_event!(debug, pool_name, worker_id, "worker exiting: root terminated");
                break;
            }
            received = queue.recv() => {
                drop(parked);
                match received {
                    Ok(ContextualItem { ctx, item }) => {
                        metrics.work_dequeued(&pool_name, &ctx);
                        handler.handle(ctx, item).await;
                    }
                    Err(_) => {
                        tracing::debug!(pool = %pool_name, worker = %worker_id, "worker exiting: queue closed");
                        break;
                    }
                }
            }
            _ = idle_sleep => {
                if counter.try_decrement_above(min_workers) {
                    decrement_guard.mark_decremented();
                    tracing::debug!(pool = %pool_name, worker = %worker_id, "worker retiring after idle timeout");
                    break;
                }
                // Floor reached: stay up and keep waiting.
            }
        }
    }

    drop(decrement_guard);
    metrics.worker_stopped(&pool_name);
}
