use std::sync::atomic::{AtomicI32, Ordering};

/// The pool's worker population, source of truth for how many worker tasks
/// are currently alive.
///
/// Mutated only through the two CAS retry loops below — never directly —
/// so that `0 <= count <= max` holds at every linearization point
/// regardless of how spawners and retirees interleave. No mutex is
/// involved; contention is resolved purely by retrying the compare-exchange.
pub struct WorkerCounter {
    count: AtomicI32,
}

impl WorkerCounter {
    pub fn new() -> Self {
        Self {
            count: AtomicI32::new(0),
        }
    }

    pub fn get(&self) -> i32 {
        self.count.load(Ordering::SeqCst)
    }

    /// Attempts to increment the count, failing if it is already at or
    /// above `max`. Used by the publisher path before spawning a worker.
    pub fn try_increment_below(&self, max: i32) -> bool {
        let mut current = self.count.load(Ordering::SeqCst);
        loop {
            if current >= max {
                return false;
            }
            match self.count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Attempts to decrement the count, failing if it is already at or
    /// below `min`. Used by an idle worker deciding whether it may retire.
    pub fn try_decrement_above(&self, min: i32) -> bool {
        let mut current = self.count.load(Ordering::SeqCst);
        loop {
            if current <= min {
                return false;
            }
            match self.count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Unconditional decrement used on the non-retirement exit paths of the
    /// worker loop (root cancellation, channel closed). These paths have
    /// already committed to exiting regardless of the floor, so there is no
    /// bound to check here — only retirement is gated by `min`.
    pub fn decrement(&self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for WorkerCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn increment_respects_max() {
        let c = WorkerCounter::new();
        assert!(c.try_increment_below(2));
        assert!(c.try_increment_below(2));
        assert!(!c.try_increment_below(2));
        assert_eq!(c.get(), 2);
    }

    #[test]
    fn decrement_respects_min() {
        let c = WorkerCounter::new();
        c.try_increment_below(5);
        c.try_increment_below(5);
        assert!(c.try_decrement_above(1));
        assert!(!c.try_decrement_above(1));
        assert_eq!(c.get(), 1);
    }

    #[test]
    fn concurrent_increment_never_exceeds_max() {
        let c = Arc::new(WorkerCounter::new());
        let max = 8;
        let mut handles = Vec::new();
        for _ in 0..64 {
            let c = c.clone();
            handles.push(std::thread::spawn(move || {
                c.try_increment_below(max);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert!(c.get() <= max);
        assert_eq!(c.get(), max);
    }

    #[test]
    fn concurrent_increment_and_decrement_never_goes_negative() {
        let c = Arc::new(WorkerCounter::new());
        c.try_increment_below(8);
        c.try_increment_below(8);
        c.try_increment_below(8);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let c = c.clone();
            handles.push(std::thread::spawn(move || {
                c.try_decrement_above(1);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert!(c.get() >= 1);
    }
}
