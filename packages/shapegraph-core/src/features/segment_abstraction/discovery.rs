//! Chain discovery
//!
//! A candidate binding is read off the pointer fields of a heap root whose
//! target has the same type. For every binding the chain is walked from the
//! entry root while the link fields are consistent, node data can be joined
//! and no interior node is referenced from outside the chain.

use super::links::{link_offsets, nodes_cost};
use crate::config::AbstractionConfig;
use crate::features::program_model::{TypeId, TypeTable};
use crate::features::symbolic_heap::{
    BindingOff, DlsEnd, RootId, SegKind, Storage, SymHeap,
};
use rustc_hash::FxHashSet;

/// A concrete node, an SLS, or both ends of a DLS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit {
    pub first: RootId,
    pub last: RootId,
}

impl Unit {
    fn roots(&self) -> impl Iterator<Item = RootId> {
        let last = (self.last != self.first).then_some(self.last);
        std::iter::once(self.first).chain(last)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub kind: SegKind,
    pub binding: BindingOff,
    pub units: Vec<Unit>,
    /// 0 when all nodes carry equal data, 1 when folding generalizes
    pub cost: usize,
}

impl Chain {
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

fn same_node_kind(heap: &SymHeap, root: RootId, ty: Option<TypeId>, size: i64) -> bool {
    heap.root(root)
        .map(|r| r.valid && r.storage == Storage::Heap && r.ty == ty && r.size == size)
        .unwrap_or(false)
}

fn unit_at(heap: &SymHeap, root: RootId, kind: SegKind, binding: BindingOff) -> Option<Unit> {
    match heap.segment(root) {
        None => Some(Unit {
            first: root,
            last: root,
        }),
        Some(seg) if seg.kind != kind || seg.binding != binding => None,
        Some(seg) => match (seg.kind, seg.end) {
            (SegKind::Sls, _) => Some(Unit {
                first: root,
                last: root,
            }),
            (SegKind::Dls, DlsEnd::First) => Some(Unit {
                first: root,
                last: seg.peer,
            }),
            (SegKind::Dls, DlsEnd::Last) => None,
        },
    }
}

/// Bindings worth trying from `root`
pub fn binding_candidates(
    heap: &SymHeap,
    root: RootId,
    types: &TypeTable,
    enable_dls: bool,
) -> Vec<(SegKind, BindingOff)> {
    if let Some(seg) = heap.segment(root) {
        return match (seg.kind, seg.end) {
            (SegKind::Dls, DlsEnd::Last) => Vec::new(),
            _ => vec![(seg.kind, seg.binding)],
        };
    }
    let Some(rec) = heap.root(root) else {
        return Vec::new();
    };
    let (ty, size) = (rec.ty, rec.size);
    let mut out = Vec::new();
    for obj in heap.objects_of(root) {
        let Some(orec) = heap.object(obj) else {
            continue;
        };
        let (Some(v), true) = (orec.value, types.is_ptr(orec.ty)) else {
            continue;
        };
        let Some(target) = heap.value_root(v) else {
            continue;
        };
        if target == root || !same_node_kind(heap, target, ty, size) {
            continue;
        }
        let head = heap.value_offset(v);
        let next = orec.offset;
        out.push((SegKind::Sls, BindingOff::sls(head, next)));

        if !enable_dls {
            continue;
        }
        for back in heap.objects_of(target) {
            let Some(brec) = heap.object(back) else {
                continue;
            };
            let Some(bv) = brec.value else {
                continue;
            };
            let points_back = heap.value_root(bv) == Some(root) && heap.value_offset(bv) == head;
            // each list is found in one orientation only
            if points_back && types.is_ptr(brec.ty) && next < brec.offset {
                out.push((SegKind::Dls, BindingOff::dls(head, next, brec.offset)));
            }
        }
    }
    out.sort();
    out.dedup();
    out
}

/// Walk the chain starting at `entry`; `None` if it has fewer than two units
pub fn seg_discover(
    heap: &SymHeap,
    entry: RootId,
    kind: SegKind,
    binding: BindingOff,
) -> Option<Chain> {
    let first = unit_at(heap, entry, kind, binding)?;
    let (ty, size) = heap.root(entry).map(|r| (r.ty, r.size))?;
    let links = link_offsets(kind, binding);

    let mut units = vec![first];
    let mut step_costs = Vec::new();
    let mut seen: FxHashSet<RootId> = first.roots().collect();
    loop {
        let Some(cur) = units.last().copied() else {
            break;
        };
        let Some(v) = heap.peek_value_at(cur.last, binding.next) else {
            break;
        };
        let Some(target) = heap.value_root(v) else {
            break;
        };
        if heap.value_offset(v) != binding.head || !same_node_kind(heap, target, ty, size) {
            break;
        }
        let Some(unit) = unit_at(heap, target, kind, binding) else {
            break;
        };
        if unit.roots().any(|r| seen.contains(&r)) {
            break;
        }
        if kind == SegKind::Dls {
            let back = heap.peek_value_at(unit.first, binding.prev);
            if back.is_none() || back != heap.existing_address(cur.last, binding.head) {
                break;
            }
        }
        let Some(cost) = nodes_cost(heap, cur.last, unit.first, &links) else {
            break;
        };
        step_costs.push(cost);
        seen.extend(unit.roots());
        units.push(unit);
    }

    let keep = interior_limit(heap, kind, &units, &links, &seen);
    if keep < 2 {
        return None;
    }
    units.truncate(keep);
    let cost = step_costs.iter().take(keep - 1).copied().max().unwrap_or(0);
    Some(Chain {
        kind,
        binding,
        units,
        cost,
    })
}

/// Number of leading units that can be folded without hiding a node that
/// something outside the chain points to
fn interior_limit(
    heap: &SymHeap,
    kind: SegKind,
    units: &[Unit],
    links: &[i64],
    chain: &FxHashSet<RootId>,
) -> usize {
    let internal_only = |root: RootId| {
        heap.points_to(root).into_iter().all(|obj| {
            heap.object(obj)
                .map(|o| chain.contains(&o.root) && links.contains(&o.offset))
                .unwrap_or(true)
        })
    };

    let mut keep = units.len();
    for (i, unit) in units.iter().enumerate() {
        if i >= keep {
            break;
        }
        for root in unit.roots() {
            if internal_only(root) {
                continue;
            }
            if i == 0 && root == unit.first {
                // the chain entry is where outside pointers arrive
                continue;
            }
            if kind == SegKind::Dls && root == unit.last {
                keep = keep.min(i + 1);
            } else {
                keep = keep.min(i);
            }
        }
    }
    keep
}

/// The longest foldable chain in the heap
pub fn discover_best_abstraction(
    heap: &SymHeap,
    config: &AbstractionConfig,
    types: &TypeTable,
) -> Option<Chain> {
    let mut best: Option<Chain> = None;
    for root in heap.live_roots() {
        if !matches!(heap.root(root).map(|r| r.storage), Some(Storage::Heap)) {
            continue;
        }
        for (kind, binding) in binding_candidates(heap, root, types, config.enable_dls) {
            if kind == SegKind::Dls && !config.enable_dls {
                continue;
            }
            let Some(chain) = seg_discover(heap, root, kind, binding) else {
                continue;
            };
            if chain.len() < config.min_fold_length(chain.cost) {
                continue;
            }
            let better = match &best {
                None => true,
                Some(b) => chain.len() > b.len() || (chain.len() == b.len() && chain.cost < b.cost),
            };
            if better {
                best = Some(chain);
            }
        }
    }
    if let Some(chain) = &best {
        tracing::trace!(
            kind = ?chain.kind,
            len = chain.len(),
            cost = chain.cost,
            "abstraction candidate"
        );
    }
    best
}
