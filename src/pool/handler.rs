use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use crate::context::PoolContext;

/// Per-worker consumer of items. Each worker owns exactly one handler
/// instance, produced fresh by the pool's handler factory — handlers are
/// never shared across workers, so `&mut self` is safe here even though the
/// trait is `Send`.
///
/// A handler must not panic out of [`Handler::handle`]: the worker loop does
/// not catch panics, and a panicking worker task is simply gone (the task
/// host does not restart it, and the worker never reaches its own exit
/// bookkeeping to decrement the population counter — see the worker loop's
/// invariant notes).
#[async_trait]
pub trait Handler<T: Send + 'static>: Send {
    async fn handle(&mut self, ctx: PoolContext, item: T);
}

/// Error produced by a handler factory. Carried back to the publisher whose
/// `publish` call triggered the failed spawn attempt.
pub type HandlerFactoryError = Box<dyn std::error::Error + Send + Sync>;

/// Factory that yields a fresh [`Handler`] per worker. Invoked once per
/// spawn attempt, strictly before the worker population counter is
/// incremented — see [`crate::pool::WorkerPool`]'s spawn ordering notes.
pub type CreateHandler<T> =
    Box<dyn Fn() -> Result<Box<dyn Handler<T>>, HandlerFactoryError> + Send + Sync>;

type BoxedHandleFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Adapts a plain async closure into a [`Handler`], for callers who don't
/// need per-worker state beyond what the closure itself captures.
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<T, F> Handler<T> for FnHandler<F>
where
    T: Send + 'static,
    F: for<'a> FnMut(PoolContext, T) -> BoxedHandleFuture<'a> + Send,
{
    async fn handle(&mut self, ctx: PoolContext, item: T) {
        (self.f)(ctx, item).await
    }
}
