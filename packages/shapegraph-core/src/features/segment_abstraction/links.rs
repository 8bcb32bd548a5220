//! Field helpers shared by discovery, folding and concretization

use crate::features::program_model::{TypeId, TypeTable};
use crate::features::symbolic_heap::isomorphism::significant_objects;
use crate::features::symbolic_heap::{
    BindingOff, RootId, SegKind, SymHeap, ValueId, ValueOrigin,
};
use std::collections::BTreeMap;

/// Type of the scalar field of `root` at `offset`, from its declared type
fn field_type(heap: &SymHeap, root: RootId, offset: i64, types: &TypeTable) -> Option<TypeId> {
    if let Some(rec) = heap.root(root) {
        let existing = rec
            .objects
            .range((offset, TypeId(0))..(offset + 1, TypeId(0)))
            .map(|((_, ty), _)| *ty)
            .find(|ty| types.is_ptr(*ty));
        if existing.is_some() {
            return existing;
        }
    }
    let root_ty = heap.root_type(root)?;
    types
        .scalar_leaves(root_ty)
        .into_iter()
        .find(|(off, ty)| *off == offset && types.is_ptr(*ty))
        .map(|(_, ty)| ty)
}

/// Current value of the link field at `offset` (materialized if needed)
pub fn link_value(heap: &mut SymHeap, root: RootId, offset: i64, types: &TypeTable) -> ValueId {
    if let Some(v) = heap.peek_value_at(root, offset) {
        return v;
    }
    let Some(ty) = field_type(heap, root, offset, types) else {
        return ValueId::INVALID;
    };
    match heap.object_at(root, offset, ty, types) {
        Some(obj) => heap.value_of(obj, types),
        None => ValueId::INVALID,
    }
}

/// Overwrite the link field at `offset`; returns the dropped values
pub fn set_link(
    heap: &mut SymHeap,
    root: RootId,
    offset: i64,
    value: ValueId,
    types: &TypeTable,
) -> Vec<ValueId> {
    let Some(ty) = field_type(heap, root, offset, types) else {
        return Vec::new();
    };
    match heap.object_at(root, offset, ty, types) {
        Some(obj) => heap.set_value(obj, value, types),
        None => Vec::new(),
    }
}

/// Offsets of the fields that link nodes together
pub fn link_offsets(kind: SegKind, binding: BindingOff) -> Vec<i64> {
    match kind {
        SegKind::Sls => vec![binding.next],
        SegKind::Dls => vec![binding.next, binding.prev],
    }
}

/// A node field as seen by the data comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataVal {
    /// Never written: zero or uninitialized depending on the root
    Default { zeroed: bool },
    Value(ValueId),
}

/// Every non-link field that differs from its default
pub fn node_data(
    heap: &SymHeap,
    root: RootId,
    links: &[i64],
) -> BTreeMap<(i64, TypeId), ValueId> {
    significant_objects(heap, root)
        .into_iter()
        .filter(|((off, _), _)| !links.contains(off))
        .collect()
}

/// Compare two node fields: `Some(0)` equal, `Some(1)` needs generalization,
/// `None` cannot be folded together
pub fn data_cost(h: &SymHeap, a: DataVal, b: DataVal) -> Option<usize> {
    use DataVal::*;
    let is_zero = |v: ValueId| h.int_of(v) == Some(0);
    match (a, b) {
        (Default { zeroed: x }, Default { zeroed: y }) => Some(usize::from(x != y)),
        (Value(v), Value(w)) if v == w => Some(0),
        (Value(v), Value(w)) => {
            if h.is_address(v) || h.is_address(w) {
                None
            } else {
                Some(1)
            }
        }
        (Default { zeroed }, Value(v)) | (Value(v), Default { zeroed }) => {
            if h.is_address(v) {
                None
            } else if zeroed && is_zero(v) {
                Some(0)
            } else {
                Some(1)
            }
        }
    }
}

/// Field-by-field cost of folding two nodes together
pub fn nodes_cost(heap: &SymHeap, a: RootId, b: RootId, links: &[i64]) -> Option<usize> {
    let (ra, rb) = (heap.root(a)?, heap.root(b)?);
    if ra.size != rb.size || ra.ty != rb.ty {
        return None;
    }
    let da = node_data(heap, a, links);
    let db = node_data(heap, b, links);
    let mut cost = 0;
    let keys: std::collections::BTreeSet<&(i64, TypeId)> = da.keys().chain(db.keys()).collect();
    for key in keys {
        let va = da.get(key).map_or(DataVal::Default { zeroed: ra.zeroed }, |v| DataVal::Value(*v));
        let vb = db.get(key).map_or(DataVal::Default { zeroed: rb.zeroed }, |v| DataVal::Value(*v));
        cost = cost.max(data_cost(heap, va, vb)?);
    }
    Some(cost)
}

/// Origin of the unknown that replaces two disagreeing node fields
pub fn joined_origin(heap: &SymHeap, a: ValueId, b: ValueId) -> ValueOrigin {
    let (oa, ob) = (heap.origin(a), heap.origin(b));
    if oa == ob && oa.is_uninit() && heap.is_unknown(a) && heap.is_unknown(b) {
        oa
    } else {
        ValueOrigin::Unknown
    }
}

/// Make `a` and `b` agree on every non-link field.
///
/// Returns the values the rewrite dropped.
pub fn sync_data(
    heap: &mut SymHeap,
    a: RootId,
    b: RootId,
    links: &[i64],
    types: &TypeTable,
) -> Vec<ValueId> {
    let mut keys: Vec<(i64, TypeId)> = node_data(heap, a, links).into_keys().collect();
    keys.extend(node_data(heap, b, links).into_keys());
    keys.sort();
    keys.dedup();

    let mut killed = Vec::new();
    for (offset, ty) in keys {
        let (Some(oa), Some(ob)) = (
            heap.object_at(a, offset, ty, types),
            heap.object_at(b, offset, ty, types),
        ) else {
            continue;
        };
        let va = heap.value_of(oa, types);
        let vb = heap.value_of(ob, types);
        if va == vb {
            continue;
        }
        // two distinct nodes: each gets its own unknown
        let origin = joined_origin(heap, va, vb);
        let ja = heap.fresh_unknown(origin);
        let jb = heap.fresh_unknown(origin);
        killed.extend(heap.set_value(oa, ja, types));
        killed.extend(heap.set_value(ob, jb, types));
    }
    killed
}

/// Give a freshly materialized node its own unknowns instead of sharing
/// them with the segment it came from
pub fn duplicate_unknowns(heap: &mut SymHeap, root: RootId, links: &[i64], types: &TypeTable) {
    for obj in heap.objects_of(root) {
        let Some((offset, value)) = heap.object(obj).and_then(|o| o.value.map(|v| (o.offset, v))) else {
            continue;
        };
        if links.contains(&offset) || !heap.is_unknown(value) {
            continue;
        }
        let fresh = heap.fresh_unknown(heap.origin(value));
        heap.set_value(obj, fresh, types);
    }
}
