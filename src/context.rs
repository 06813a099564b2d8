use std::collections::HashMap;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

/// The context carried alongside an item from publish time through to the
/// handler invocation that consumes it.
///
/// This is the pool's analogue of a request context: it carries scoped
/// values (trace id, tenant, arbitrary string fields) and an optional
/// deadline, plus its own [`CancellationToken`]. A `PoolContext` produced by
/// a [`ContextAdapter`] is deliberately *not* a child of the caller's
/// cancellation — see the module docs on [`ContextAdapter`] for why.
#[derive(Clone, Debug)]
pub struct PoolContext {
    fields: HashMap<String, String>,
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl PoolContext {
    /// A fresh, never-cancelled context with no fields and no deadline.
    pub fn new() -> Self {
        Self {
            fields: HashMap::new(),
            deadline: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// A context whose cancellation token is `token` — typically the
    /// publisher's own per-call cancellation.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            fields: HashMap::new(),
            deadline: None,
            cancellation: token,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Waits until this context's cancellation fires. Used by the publisher
    /// path's selects; never by the pool after an item has been enqueued.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl Default for PoolContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives a pool-owned context from a caller-supplied one.
///
/// This is the design's answer to "what lifetime governs queued work": not
/// the publisher's, because the publisher may already have returned by the
/// time the item is handled; not a worker's, because workers are ephemeral
/// and retire independently of any one item. An adapter yields a third
/// lifetime that carries values (trace id, tenant, deadline) forward but
/// detaches cancellation, so a caller giving up on its own request does not
/// silently orphan work already queued on its behalf.
pub trait ContextAdapter: Send + Sync {
    fn adapt(&self, caller: &PoolContext) -> PoolContext;
}

/// The default [`ContextAdapter`]: copies fields and the deadline forward,
/// but gives the result a fresh, independent cancellation token rather than
/// inheriting the caller's.
pub struct DetachingAdapter;

impl ContextAdapter for DetachingAdapter {
    fn adapt(&self, caller: &PoolContext) -> PoolContext {
        let mut adapted = PoolContext::new();
        adapted.fields = caller.fields.clone();
        adapted.deadline = caller.deadline;
        adapted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detaching_adapter_copies_fields_but_not_cancellation() {
        let caller_token = CancellationToken::new();
        let caller = PoolContext::with_cancellation(caller_token.clone()).with_field("trace_id", "abc123");

        let adapted = DetachingAdapter.adapt(&caller);
        assert_eq!(adapted.field("trace_id"), Some("abc123"));

        caller_token.cancel();
        assert!(caller.is_cancelled());
        assert!(!adapted.is_cancelled());
    }
}
