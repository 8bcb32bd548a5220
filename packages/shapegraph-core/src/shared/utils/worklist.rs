//! FIFO worklist of items pending (re)processing

use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::hash::Hash;

/// An item is queued at most once at a time; once popped it may be
/// scheduled again. Every item ever scheduled is remembered.
#[derive(Debug, Clone)]
pub struct WorkList<T> {
    queue: VecDeque<T>,
    queued: FxHashSet<T>,
    seen: FxHashSet<T>,
}

impl<T: Copy + Eq + Hash> WorkList<T> {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            queued: FxHashSet::default(),
            seen: FxHashSet::default(),
        }
    }

    pub fn with_item(item: T) -> Self {
        let mut wl = Self::new();
        wl.schedule(item);
        wl
    }

    /// Returns true if the item was not already waiting
    pub fn schedule(&mut self, item: T) -> bool {
        self.seen.insert(item);
        if !self.queued.insert(item) {
            return false;
        }
        self.queue.push_back(item);
        true
    }

    pub fn next(&mut self) -> Option<T> {
        let item = self.queue.pop_front()?;
        self.queued.remove(&item);
        Some(item)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn seen(&self, item: &T) -> bool {
        self.seen.contains(item)
    }

    pub fn into_seen(self) -> FxHashSet<T> {
        self.seen
    }
}

impl<T: Copy + Eq + Hash> Default for WorkList<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_waits_at_most_once() {
        let mut wl = WorkList::with_item(1u32);
        assert!(!wl.schedule(1));
        assert!(wl.schedule(2));
        assert_eq!(wl.next(), Some(1));
        assert_eq!(wl.next(), Some(2));
        assert_eq!(wl.next(), None);
        assert!(wl.is_empty());
        // popped items can come back
        assert!(wl.schedule(2));
        assert!(wl.seen(&1));
        assert_eq!(wl.into_seen().len(), 2);
    }
}
