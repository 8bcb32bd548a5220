//! Sets of heaps attached to a program point

use crate::config::StateJoinPolicy;
use crate::features::program_model::TypeTable;
use crate::features::symbolic_heap::{are_isomorphic, HeapJoiner, JoinStatus, SymHeap};

/// Disjunction of heaps; each heap is marked until it was taken for processing
#[derive(Debug, Clone, Default)]
pub struct SymState {
    heaps: Vec<SymHeap>,
    marked: Vec<bool>,
}

impl SymState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heaps.is_empty()
    }

    pub fn heaps(&self) -> &[SymHeap] {
        &self.heaps
    }

    pub fn into_heaps(self) -> Vec<SymHeap> {
        self.heaps
    }

    /// Add a heap unless the state already covers it; true if the state grew
    pub fn insert(
        &mut self,
        heap: SymHeap,
        policy: StateJoinPolicy,
        joiner: &dyn HeapJoiner,
        types: &TypeTable,
    ) -> bool {
        if self.heaps.iter().any(|h| are_isomorphic(h, &heap)) {
            return false;
        }
        if policy == StateJoinPolicy::Join {
            for i in 0..self.heaps.len() {
                let Some(joined) = joiner.join(&self.heaps[i], &heap, types) else {
                    continue;
                };
                match joined.status {
                    JoinStatus::UseAny | JoinStatus::UseSh1 => return false,
                    JoinStatus::UseSh2 | JoinStatus::UseSh3 => {
                        tracing::trace!(status = joined.status.as_str(), "state entry widened");
                        self.heaps[i] = joined.heap;
                        self.marked[i] = true;
                        return true;
                    }
                }
            }
        }
        self.insert_unchecked(heap);
        true
    }

    pub(super) fn insert_unchecked(&mut self, heap: SymHeap) {
        self.heaps.push(heap);
        self.marked.push(true);
    }

    /// Clones of the marked heaps; the marks are cleared
    pub fn take_marked(&mut self) -> Vec<SymHeap> {
        let mut out = Vec::new();
        for (heap, marked) in self.heaps.iter().zip(self.marked.iter_mut()) {
            if *marked {
                *marked = false;
                out.push(heap.clone());
            }
        }
        out
    }
}
