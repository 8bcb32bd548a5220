use crate::features::symbolic_heap::{RootId, Storage, SymHeap, ValueId};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

/// True if no program variable (or whitelisted root) reaches `root`.
///
/// The search walks referencing objects backwards, so cycles of junk
/// referencing each other are still junk.
pub fn is_junk(heap: &SymHeap, root: RootId, whitelist: &[RootId]) -> bool {
    let mut seen = FxHashSet::default();
    let mut queue = VecDeque::from([root]);
    while let Some(cur) = queue.pop_front() {
        if !seen.insert(cur) || !heap.is_valid_root(cur) {
            continue;
        }
        if heap.is_program_var(cur) || (cur != root && whitelist.contains(&cur)) {
            return false;
        }
        for obj in heap.points_to(cur) {
            if let Some(o) = heap.object(obj) {
                queue.push_back(o.root);
            }
        }
        // a segment end is reachable through its peer
        if let Some(seg) = heap.segment(cur) {
            queue.push_back(seg.peer);
        }
    }
    true
}

fn collect(heap: &mut SymHeap, killed: Vec<ValueId>, whitelist: &[RootId]) -> Vec<RootId> {
    let mut leaked = Vec::new();
    let mut queue: VecDeque<ValueId> = killed.into();
    while let Some(v) = queue.pop_front() {
        let Some(root) = heap.value_root(v) else {
            continue;
        };
        if whitelist.contains(&root) || !heap.is_valid_root(root) {
            continue;
        }
        if !matches!(heap.root(root).map(|r| r.storage), Some(Storage::Heap)) {
            continue;
        }
        if !is_junk(heap, root, whitelist) {
            continue;
        }
        tracing::trace!(root = %root, "junk collected");
        queue.extend(heap.destroy_root(root));
        leaked.push(root);
    }
    leaked
}

/// Destroy every heap root that `killed` values leave unreachable.
///
/// Returns the destroyed roots in destruction order; each one is a leak.
pub fn collect_junk(heap: &mut SymHeap, killed: Vec<ValueId>) -> Vec<RootId> {
    collect(heap, killed, &[])
}

/// Like [`collect_junk`] but roots reachable from `whitelist` survive, and
/// the whitelisted roots themselves are never collected
pub fn collect_shared_junk(
    heap: &mut SymHeap,
    killed: Vec<ValueId>,
    whitelist: &[RootId],
) -> Vec<RootId> {
    collect(heap, killed, whitelist)
}

/// Sweep every live heap root
pub fn collect_all(heap: &mut SymHeap) -> Vec<RootId> {
    let candidates: Vec<ValueId> = heap
        .live_roots()
        .into_iter()
        .filter_map(|r| heap.existing_address(r, 0))
        .collect();
    collect_junk(heap, candidates)
}
