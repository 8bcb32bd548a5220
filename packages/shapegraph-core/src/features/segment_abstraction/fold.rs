//! Folding discovered chains into list segments

use super::discovery::{Chain, Unit};
use super::links::{link_offsets, set_link, sync_data};
use crate::features::garbage_collector::collect_shared_junk;
use crate::features::program_model::TypeTable;
use crate::features::symbolic_heap::{BindingOff, DlsEnd, RootId, SegKind, SegmentInfo, SymHeap, ValueId};

/// Highest minimal length a segment remembers
pub const SLS_MIN_LEN_CAP: u32 = 1;
pub const DLS_MIN_LEN_CAP: u32 = 2;

fn unit_len(heap: &SymHeap, unit: Unit) -> u32 {
    heap.segment(unit.first).map_or(1, |s| s.min_len)
}

fn head_of(heap: &mut SymHeap, root: RootId, binding: BindingOff) -> ValueId {
    let base = heap.root_address(root);
    heap.by_offset(base, binding.head)
}

/// Fold the whole chain; returns the root carrying the segment's entry end
pub fn fold_chain(heap: &mut SymHeap, chain: &Chain, types: &TypeTable) -> Option<RootId> {
    let (head, rest) = chain.units.split_first()?;
    let mut acc = *head;
    let mut len = unit_len(heap, acc);
    for unit in rest {
        len += unit_len(heap, *unit);
        acc = match chain.kind {
            SegKind::Sls => {
                let merged = sls_merge(heap, acc.first, unit.first, chain.binding, len.min(SLS_MIN_LEN_CAP), types);
                Unit {
                    first: merged,
                    last: merged,
                }
            }
            SegKind::Dls => dls_merge(heap, acc, *unit, chain.binding, len.min(DLS_MIN_LEN_CAP), types),
        };
    }
    tracing::debug!(kind = ?chain.kind, nodes = chain.len(), min_len = heap.min_length(acc.first), "chain folded");
    Some(acc.first)
}

/// Merge `a` into its successor `b`; `b` survives as the segment
fn sls_merge(
    heap: &mut SymHeap,
    a: RootId,
    b: RootId,
    binding: BindingOff,
    min_len: u32,
    types: &TypeTable,
) -> RootId {
    let links = link_offsets(SegKind::Sls, binding);
    let mut killed = sync_data(heap, a, b, &links, types);
    heap.redirect_refs(a, b, &[]);
    killed.extend(heap.destroy_root(a));
    heap.set_segment(
        b,
        Some(SegmentInfo {
            kind: SegKind::Sls,
            binding,
            min_len,
            peer: b,
            end: DlsEnd::First,
        }),
    );
    collect_shared_junk(heap, killed, &[b]);
    b
}

/// Join two adjacent DLS units into one segment spanning both
fn dls_merge(
    heap: &mut SymHeap,
    a: Unit,
    c: Unit,
    binding: BindingOff,
    min_len: u32,
    types: &TypeTable,
) -> Unit {
    let links = link_offsets(SegKind::Dls, binding);
    let (first, last) = (a.first, c.last);

    // the surviving ends must cover the data of every node they absorb
    let mut killed = Vec::new();
    for other in [a.last, c.first, last] {
        if other != first {
            killed.extend(sync_data(heap, first, other, &links, types));
        }
    }

    let last_head = head_of(heap, last, binding);
    let first_head = head_of(heap, first, binding);
    killed.extend(set_link(heap, first, binding.next, last_head, types));
    killed.extend(set_link(heap, last, binding.prev, first_head, types));

    for interior in [a.last, c.first] {
        if interior != first && interior != last {
            killed.extend(heap.destroy_root(interior));
        }
    }

    heap.set_segment(
        first,
        Some(SegmentInfo {
            kind: SegKind::Dls,
            binding,
            min_len,
            peer: last,
            end: DlsEnd::First,
        }),
    );
    heap.set_segment(
        last,
        Some(SegmentInfo {
            kind: SegKind::Dls,
            binding,
            min_len,
            peer: first,
            end: DlsEnd::Last,
        }),
    );
    collect_shared_junk(heap, killed, &[first, last]);
    Unit { first, last }
}
