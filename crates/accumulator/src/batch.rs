//! Pending-message queue shared between the fill and drain phases.
//!
//! The batch is deliberately opaque: it can be appended to, popped from the
//! front, measured and cleared, but never iterated. Draining therefore always
//! sees each message exactly once, and a concurrent `clear` from
//! [`stop`](crate::BatchAccumulator::stop) simply ends the drain early.
//!
//! The `_if` variants evaluate their gate while holding the lock, so a gate
//! that flips before a `clear` can never let a message in (or out) after it.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Ordered batch of pending messages, insertion order = arrival order.
pub struct Batch<M> {
    items: Mutex<VecDeque<M>>,
}

impl<M> Batch<M> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Create a batch with room for `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    // A panic while holding the guard cannot leave the deque half-updated,
    // so a poisoned lock is still usable.
    fn items(&self) -> MutexGuard<'_, VecDeque<M>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a message at the back.
    pub fn append(&self, message: M) {
        self.items().push_back(message);
    }

    /// Remove and return the oldest message.
    pub fn pop_front(&self) -> Option<M> {
        self.items().pop_front()
    }

    /// Append only if `admit` holds. Returns `false` (dropping the message)
    /// otherwise.
    pub fn append_if(&self, message: M, admit: impl FnOnce() -> bool) -> bool {
        let mut items = self.items();
        if !admit() {
            return false;
        }
        items.push_back(message);
        true
    }

    /// Pop the oldest message only if `release` holds.
    pub fn pop_front_if(&self, release: impl FnOnce() -> bool) -> Option<M> {
        let mut items = self.items();
        if release() {
            items.pop_front()
        } else {
            None
        }
    }

    /// Number of messages currently pending.
    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Drop every pending message, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut items = self.items();
        let dropped = items.len();
        items.clear();
        dropped
    }
}

impl<M> Default for Batch<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_front_preserves_arrival_order() {
        let batch = Batch::new();
        batch.append("a");
        batch.append("b");
        batch.append("c");
        assert_eq!(batch.pop_front(), Some("a"));
        assert_eq!(batch.pop_front(), Some("b"));
        assert_eq!(batch.pop_front(), Some("c"));
        assert_eq!(batch.pop_front(), None);
    }

    #[test]
    fn test_len_tracks_appends_and_pops() {
        let batch = Batch::with_capacity(4);
        assert!(batch.is_empty());
        batch.append(1);
        batch.append(2);
        assert_eq!(batch.len(), 2);
        batch.pop_front();
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_clear_reports_dropped_count() {
        let batch = Batch::new();
        for i in 0..5 {
            batch.append(i);
        }
        assert_eq!(batch.clear(), 5);
        assert!(batch.is_empty());
        assert_eq!(batch.clear(), 0);
    }

    #[test]
    fn test_gated_append_and_pop() {
        let batch = Batch::new();
        assert!(batch.append_if("kept", || true));
        assert!(!batch.append_if("dropped", || false));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.pop_front_if(|| false), None);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.pop_front_if(|| true), Some("kept"));
    }

    #[test]
    fn test_interleaved_append_after_pop() {
        let batch = Batch::new();
        batch.append("first");
        assert_eq!(batch.pop_front(), Some("first"));
        batch.append("second");
        batch.append("third");
        assert_eq!(batch.pop_front(), Some("second"));
        assert_eq!(batch.len(), 1);
    }
}
