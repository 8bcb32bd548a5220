//! Materializing one concrete node out of a list segment
//!
//! A dereference through a segment end first splits the heap: one heap
//! where the segment is at least one node long and that node is concrete,
//! and one where the segment is empty (only when its minimal length is 0).

use super::links::{duplicate_unknowns, link_offsets, link_value, set_link};
use crate::features::garbage_collector::collect_junk;
use crate::features::program_model::TypeTable;
use crate::features::symbolic_heap::{DlsEnd, RootId, SegKind, SegmentInfo, SymHeap, ValueId};

/// Heaps covering `heap` in which the node at `root` is concrete.
///
/// The non-empty variant comes first. A non-segment root yields the heap
/// unchanged.
pub fn concretize(heap: SymHeap, root: RootId, types: &TypeTable) -> Vec<SymHeap> {
    let Some(seg) = heap.segment(root) else {
        return vec![heap];
    };
    let mut out = Vec::with_capacity(2);
    let empty = if seg.min_len == 0 {
        let mut spliced = heap.clone();
        splice_out(&mut spliced, root, seg, types).then_some(spliced)
    } else {
        None
    };

    let mut full = heap;
    match seg.kind {
        SegKind::Sls => materialize_sls(&mut full, root, seg, types),
        SegKind::Dls => materialize_dls(&mut full, root, seg, types),
    }
    out.push(full);
    out.extend(empty);
    tracing::trace!(root = %root, variants = out.len(), "segment concretized");
    out
}

/// Remove a possibly-empty segment, routing pointers to it to its successor.
///
/// Returns false if the empty variant contradicts the heap's disequalities.
pub fn splice_out(heap: &mut SymHeap, root: RootId, seg: SegmentInfo, types: &TypeTable) -> bool {
    let ends: Vec<(RootId, ValueId)> = match seg.kind {
        SegKind::Sls => {
            let succ = link_value(heap, root, seg.binding.next, types);
            vec![(root, succ)]
        }
        SegKind::Dls => {
            let (first, last) = match seg.end {
                DlsEnd::First => (root, seg.peer),
                DlsEnd::Last => (seg.peer, root),
            };
            let succ = link_value(heap, last, seg.binding.next, types);
            let pred = link_value(heap, first, seg.binding.prev, types);
            vec![(first, succ), (last, pred)]
        }
    };

    for (end, target) in &ends {
        let addrs: Vec<(i64, ValueId)> = match heap.root(*end) {
            Some(rec) => rec.addresses.iter().map(|(o, v)| (*o, *v)).collect(),
            None => continue,
        };
        for (offset, addr) in addrs {
            let by = if offset == seg.binding.head {
                *target
            } else {
                heap.by_offset(*target, offset - seg.binding.head)
            };
            if !heap.replace(addr, by) {
                tracing::trace!(root = %end, "empty segment contradicts a disequality");
                return false;
            }
        }
    }

    let mut killed = Vec::new();
    for (end, _) in ends {
        killed.extend(heap.destroy_root(end));
    }
    collect_junk(heap, killed);
    true
}

fn materialize_sls(heap: &mut SymHeap, seg_root: RootId, seg: SegmentInfo, types: &TypeTable) {
    let links = link_offsets(SegKind::Sls, seg.binding);
    let Some(node) = heap.clone_root(seg_root) else {
        return;
    };
    heap.redirect_refs(seg_root, node, &[node]);
    let base = heap.root_address(seg_root);
    let seg_head = heap.by_offset(base, seg.binding.head);
    set_link(heap, node, seg.binding.next, seg_head, types);
    duplicate_unknowns(heap, node, &links, types);
    heap.set_min_length(seg_root, seg.min_len.saturating_sub(1));
}

/// Peel the node off the end the dereference came through
fn materialize_dls(heap: &mut SymHeap, end: RootId, seg: SegmentInfo, types: &TypeTable) {
    let links = link_offsets(SegKind::Dls, seg.binding);
    let Some(node) = heap.clone_root(end) else {
        return;
    };
    heap.redirect_refs(end, node, &[node, seg.peer]);

    let (toward_seg, toward_node) = match seg.end {
        DlsEnd::First => (seg.binding.next, seg.binding.prev),
        DlsEnd::Last => (seg.binding.prev, seg.binding.next),
    };
    let end_base = heap.root_address(end);
    let end_head = heap.by_offset(end_base, seg.binding.head);
    let node_base = heap.root_address(node);
    let node_head = heap.by_offset(node_base, seg.binding.head);
    set_link(heap, node, toward_seg, end_head, types);
    set_link(heap, end, toward_node, node_head, types);
    duplicate_unknowns(heap, node, &links, types);
    heap.set_min_length(end, seg.min_len.saturating_sub(1));
}
