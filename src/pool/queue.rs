use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::context::PoolContext;
use crate::error::PoolError;

/// A pair carrying the pool-adapted context captured at publish time and
/// the opaque item payload. The item's own context — not a worker's — is
/// what the handler receives, preserving per-publish scoping (deadlines,
/// trace ids) across the asynchronous hop through the queue.
pub struct ContextualItem<T> {
    pub ctx: PoolContext,
    pub item: T,
}

/// The bounded FIFO shared by every publisher and every worker. Backed by
/// `async-channel`, which (unlike `tokio::mpsc`) supports multiple
/// concurrent consumers natively — workers race each other for items
/// without the pool wrapping the receiver in a mutex.
pub struct Queue<T> {
    sender: async_channel::Sender<ContextualItem<T>>,
    receiver: async_channel::Receiver<ContextualItem<T>>,
    /// `true` when the pool was configured with `queue_size == 0`. The
    /// channel still needs one real slot to hand an item through —
    /// `async-channel` has no zero-capacity mode — but a rendezvous queue
    /// must additionally refuse to place anything in that slot unless a
    /// worker is actually parked waiting to take it; otherwise an item can
    /// sit buffered with nobody receiving, which is exactly what "every
    /// push requires a worker ready to receive immediately" rules out.
    rendezvous: bool,
    parked: Arc<AtomicUsize>,
    parked_notify: Arc<Notify>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            rendezvous: self.rendezvous,
            parked: self.parked.clone(),
            parked_notify: self.parked_notify.clone(),
        }
    }
}

/// Outcome of a non-blocking push. On failure, the context and item are
/// handed back so the caller can retry them through [`Queue::push_wait`]
/// without having cloned either speculatively.
pub enum TryPushOutcome<T> {
    Pushed,
    Full(PoolContext, T),
}

/// Held by a worker for the duration of one `select!` iteration, marking it
/// as able to receive so that a rendezvous queue's publishers can tell a
/// push would actually be picked up. Dropped — decrementing the count —
/// the instant that iteration's `select!` resolves, whichever arm wins.
pub struct ParkGuard<'a> {
    parked: &'a AtomicUsize,
}

impl<'a> ParkGuard<'a> {
    fn new(parked: &'a AtomicUsize, notify: &'a Notify) -> Self {
        parked.fetch_add(1, Ordering::SeqCst);
        notify.notify_one();
        Self { parked }
    }
}

impl Drop for ParkGuard<'_> {
    fn drop(&mut self) {
        self.parked.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T: Send + 'static> Queue<T> {
    /// `capacity` of `0` is modeled as a rendezvous queue over a
    /// capacity-1 channel: the single slot exists only because
    /// `async-channel` requires at least one, but [`Queue::try_push`] and
    /// [`Queue::push_wait`] refuse to use it unless a worker is currently
    /// parked (see [`ParkGuard`]), so the observable behavior matches a
    /// true zero-capacity handoff.
    pub fn bounded(capacity: usize) -> Self {
        let (sender, receiver) = async_channel::bounded(capacity.max(1));
        Self {
            sender,
            receiver,
            rendezvous: capacity == 0,
            parked: Arc::new(AtomicUsize::new(0)),
            parked_notify: Arc::new(Notify::new()),
        }
    }

    fn may_place_without_waiting(&self) -> bool {
        !self.rendezvous || self.parked.load(Ordering::SeqCst) > 0
    }

    /// Non-blocking push: succeeds iff there is free capacity right now
    /// and — for a rendezvous queue — a worker is actually parked to
    /// receive it.
    pub fn try_push(&self, ctx: PoolContext, item: T) -> TryPushOutcome<T> {
        if !self.may_place_without_waiting() {
            return TryPushOutcome::Full(ctx, item);
        }
        match self.sender.try_send(ContextualItem { ctx, item }) {
            Ok(()) => TryPushOutcome::Pushed,
            Err(async_channel::TrySendError::Full(ContextualItem { ctx, item })) => {
                TryPushOutcome::Full(ctx, item)
            }
            Err(async_channel::TrySendError::Closed(ContextualItem { ctx, item })) => {
                TryPushOutcome::Full(ctx, item)
            }
        }
    }

    /// Waits up to `timeout` for capacity to free up, racing the root
    /// lifetime and the publisher's own context ending. Root termination
    /// takes precedence if both it and the publisher context end at once
    /// (the `biased` select tries arms top to bottom).
    ///
    /// For a rendezvous queue, a plain buffered `send` would resolve the
    /// instant the one real slot drains even if no worker were waiting on
    /// it, so this additionally loops on a parked-worker signal instead of
    /// sending unconditionally.
    pub async fn push_wait(
        &self,
        pool_name: &str,
        ctx: PoolContext,
        item: T,
        root: &CancellationToken,
        timeout: Duration,
    ) -> Result<(), PoolError> {
        let ctx_cancel = ctx.cancellation().clone();
        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);

        if !self.rendezvous {
            return tokio::select! {
                biased;
                _ = root.cancelled() => Err(PoolError::RootTerminated(pool_name.to_string())),
                _ = ctx_cancel.cancelled() => Err(PoolError::PublisherCancelled),
                result = self.sender.send(ContextualItem { ctx, item }) => {
                    result.map_err(|_| PoolError::RootTerminated(pool_name.to_string()))
                }
                _ = &mut sleep => Err(PoolError::PoolFull(pool_name.to_string())),
            };
        }

        let mut payload = Some(ContextualItem { ctx, item });
        loop {
            if self.parked.load(Ordering::SeqCst) > 0 {
                let pending = payload.take().expect("payload only taken once per delivery attempt");
                match self.sender.try_send(pending) {
                    Ok(()) => return Ok(()),
                    Err(async_channel::TrySendError::Full(returned)) => payload = Some(returned),
                    Err(async_channel::TrySendError::Closed(_)) => {
                        return Err(PoolError::RootTerminated(pool_name.to_string()));
                    }
                }
            }

            tokio::select! {
                biased;
                _ = root.cancelled() => return Err(PoolError::RootTerminated(pool_name.to_string())),
                _ = ctx_cancel.cancelled() => return Err(PoolError::PublisherCancelled),
                _ = self.parked_notify.notified() => {}
                _ = &mut sleep => return Err(PoolError::PoolFull(pool_name.to_string())),
            }
        }
    }

    /// Blocking receive. Raced by the worker loop against root cancellation
    /// and the idle timer.
    pub async fn recv(&self) -> Result<ContextualItem<T>, async_channel::RecvError> {
        self.receiver.recv().await
    }

    /// Marks the caller as parked — able to receive — for as long as the
    /// returned guard is alive.
    pub fn park_guard(&self) -> ParkGuard<'_> {
        ParkGuard::new(&self.parked, &self.parked_notify)
    }

    pub fn close(&self) {
        self.sender.close();
        self.receiver.close();
    }
}
