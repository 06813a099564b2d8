/// Structured logging helpers shared by the pool and worker loop.
///
/// Mirrors this crate's convention of keying every event on the pool name
/// and, where relevant, the worker id, rather than composing ad hoc field
/// sets at each call site.

/// Emits a `tracing` event tagged with `pool` and (optionally) `worker`
/// fields, at the given level.
#[macro_export]
macro_rules! log_pool_event {
    ($level:ident, $pool:expr, $worker:expr, $msg:expr) => {
        tracing::$level!(pool = %$pool, worker = %$worker, $msg)
    };
    ($level:ident, $pool:expr, $msg:expr) => {
        tracing::$level!(pool = %$pool, $msg)
    };
}
