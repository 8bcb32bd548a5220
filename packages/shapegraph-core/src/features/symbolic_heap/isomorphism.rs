//! Heap isomorphism
//!
//! Two heaps are isomorphic when a bijection between their reachable roots
//! and values preserves program variables, object layout, custom values,
//! value origins, segment shapes and disequalities. The traversal starts
//! from the program variables (ordered by `CVar`) and the return slot.

use super::domain::*;
use super::heap::SymHeap;
use crate::features::program_model::TypeId;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, VecDeque};

/// Objects whose value differs from what a fresh read would produce.
///
/// Composite placeholders and untouched defaults are left out so that a
/// materialized-but-unused object does not make two heaps differ.
pub(crate) fn significant_objects(heap: &SymHeap, root: RootId) -> BTreeMap<(i64, TypeId), ValueId> {
    let mut out = BTreeMap::new();
    let Some(rec) = heap.root(root) else {
        return out;
    };
    for obj in rec.objects.values() {
        let Some(orec) = heap.object(*obj) else {
            continue;
        };
        let Some(v) = orec.value else {
            continue;
        };
        if matches!(heap.value_kind(v), ValueKind::Composite(_)) || is_default(heap, rec, *obj, v) {
            continue;
        }
        out.insert((orec.offset, orec.ty), v);
    }
    out
}

fn is_default(heap: &SymHeap, rec: &RootRecord, obj: ObjectId, v: ValueId) -> bool {
    if rec.zeroed || matches!(rec.storage, Storage::Static(_)) {
        return match heap.value_kind(v) {
            ValueKind::Special(SpecialValue::Null | SpecialValue::False) => true,
            ValueKind::Custom(CustomValue::Int(0)) => true,
            _ => false,
        };
    }
    let default_origin = match rec.storage {
        Storage::Heap => ValueOrigin::HeapUninit,
        Storage::Stack(_) => ValueOrigin::StackUninit,
        _ => return false,
    };
    heap.is_unknown(v)
        && heap.origin(v) == default_origin
        && heap.used_by(v) == [obj]
        && !heap.has_preds(v)
}

/// Root pairs the traversal starts from; `None` when the variable sets differ
pub(crate) fn anchor_pairs(h1: &SymHeap, h2: &SymHeap) -> Option<Vec<(RootId, RootId)>> {
    let vars1 = h1.cvars();
    let vars2 = h2.cvars();
    if vars1.len() != vars2.len() {
        return None;
    }
    let mut pairs = Vec::with_capacity(vars1.len() + 1);
    for ((cv1, r1), (cv2, r2)) in vars1.into_iter().zip(vars2) {
        if cv1 != cv2 {
            return None;
        }
        pairs.push((r1, r2));
    }
    match (h1.return_root(), h2.return_root()) {
        (Some(r1), Some(r2)) => pairs.push((r1, r2)),
        (None, None) => {}
        _ => return None,
    }
    Some(pairs)
}

/// Storage, extent and liveness agree (segments are checked by the caller)
pub(crate) fn roots_alike(h1: &SymHeap, r1: RootId, h2: &SymHeap, r2: RootId) -> bool {
    let (Some(a), Some(b)) = (h1.root(r1), h2.root(r2)) else {
        return false;
    };
    let storage_alike = match (a.storage, b.storage) {
        (Storage::Heap, Storage::Heap) | (Storage::Return, Storage::Return) => true,
        (Storage::Stack(x), Storage::Stack(y)) | (Storage::Static(x), Storage::Static(y)) => x == y,
        _ => false,
    };
    storage_alike && a.size == b.size && a.valid == b.valid && a.zeroed == b.zeroed
}

struct IsoChecker<'a> {
    h1: &'a SymHeap,
    h2: &'a SymHeap,
    roots: FxHashMap<RootId, RootId>,
    roots_back: FxHashMap<RootId, RootId>,
    values: FxHashMap<ValueId, ValueId>,
    values_back: FxHashMap<ValueId, ValueId>,
    queue: VecDeque<(RootId, RootId)>,
}

impl<'a> IsoChecker<'a> {
    fn bind_roots(&mut self, r1: RootId, r2: RootId) -> bool {
        match (self.roots.get(&r1), self.roots_back.get(&r2)) {
            (Some(x), Some(y)) => *x == r2 && *y == r1,
            (None, None) => {
                if !roots_alike(self.h1, r1, self.h2, r2) {
                    return false;
                }
                self.roots.insert(r1, r2);
                self.roots_back.insert(r2, r1);
                self.queue.push_back((r1, r2));
                true
            }
            _ => false,
        }
    }

    fn bind_values(&mut self, v1: ValueId, v2: ValueId) -> bool {
        match (self.values.get(&v1), self.values_back.get(&v2)) {
            (Some(x), Some(y)) => return *x == v2 && *y == v1,
            (None, None) => {}
            _ => return false,
        }
        let ok = match (self.h1.value_kind(v1), self.h2.value_kind(v2)) {
            (ValueKind::Special(a), ValueKind::Special(b)) => a == b,
            (ValueKind::Custom(a), ValueKind::Custom(b)) => a == b,
            (ValueKind::Unknown, ValueKind::Unknown) => self.h1.origin(v1) == self.h2.origin(v2),
            (
                ValueKind::Address {
                    root: r1,
                    offset: o1,
                },
                ValueKind::Address {
                    root: r2,
                    offset: o2,
                },
            ) => o1 == o2 && self.bind_roots(*r1, *r2),
            _ => false,
        };
        if ok {
            self.values.insert(v1, v2);
            self.values_back.insert(v2, v1);
        }
        ok
    }

    fn check_pair(&mut self, r1: RootId, r2: RootId) -> bool {
        match (self.h1.segment(r1), self.h2.segment(r2)) {
            (None, None) => {}
            (Some(s1), Some(s2)) => {
                if s1.kind != s2.kind
                    || s1.binding != s2.binding
                    || s1.min_len != s2.min_len
                    || s1.end != s2.end
                    || !self.bind_roots(s1.peer, s2.peer)
                {
                    return false;
                }
            }
            _ => return false,
        }

        let objs1 = significant_objects(self.h1, r1);
        let objs2 = significant_objects(self.h2, r2);
        if objs1.len() != objs2.len() {
            return false;
        }
        for ((k1, v1), (k2, v2)) in objs1.into_iter().zip(objs2) {
            if k1 != k2 || !self.bind_values(v1, v2) {
                return false;
            }
        }
        true
    }

    fn run(mut self, anchors: Vec<(RootId, RootId)>) -> bool {
        for (r1, r2) in anchors {
            if !self.bind_roots(r1, r2) {
                return false;
            }
        }
        while let Some((r1, r2)) = self.queue.pop_front() {
            if !self.check_pair(r1, r2) {
                return false;
            }
        }
        self.neqs_agree()
    }

    fn neqs_agree(&self) -> bool {
        let mapped = |heap: &SymHeap, map: &FxHashMap<ValueId, ValueId>| {
            let mut out: Vec<(ValueId, ValueId)> = heap
                .neq_pairs()
                .into_iter()
                .filter(|(a, b)| {
                    (a.is_special() || map.contains_key(a)) && (b.is_special() || map.contains_key(b))
                })
                .map(|(a, b)| {
                    let a = map.get(&a).copied().unwrap_or(a);
                    let b = map.get(&b).copied().unwrap_or(b);
                    if a < b {
                        (a, b)
                    } else {
                        (b, a)
                    }
                })
                .collect();
            out.sort();
            out
        };
        let from1 = mapped(self.h1, &self.values);
        let mut own2: Vec<(ValueId, ValueId)> = self
            .h2
            .neq_pairs()
            .into_iter()
            .filter(|(a, b)| {
                (a.is_special() || self.values_back.contains_key(a))
                    && (b.is_special() || self.values_back.contains_key(b))
            })
            .collect();
        own2.sort();
        from1 == own2
    }
}

/// True when both heaps describe the same set of concrete states up to renaming
pub fn are_isomorphic(h1: &SymHeap, h2: &SymHeap) -> bool {
    let Some(anchors) = anchor_pairs(h1, h2) else {
        return false;
    };
    IsoChecker {
        h1,
        h2,
        roots: FxHashMap::default(),
        roots_back: FxHashMap::default(),
        values: FxHashMap::default(),
        values_back: FxHashMap::default(),
        queue: VecDeque::new(),
    }
    .run(anchors)
}
