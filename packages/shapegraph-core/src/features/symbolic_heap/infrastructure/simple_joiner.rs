//! Pairwise heap join
//!
//! Walks both heaps in parallel from the program variables. The result is
//! built on a clone of the first heap; wherever the second heap disagrees on
//! a non-pointer value the result gets a fresh unknown. Pointer structure must
//! match exactly, except that a concrete node may be covered by a singly
//! linked segment and a segment's minimal length may drop.

use crate::features::program_model::{TypeId, TypeTable};
use crate::features::symbolic_heap::domain::*;
use crate::features::symbolic_heap::heap::SymHeap;
use crate::features::symbolic_heap::isomorphism::{anchor_pairs, roots_alike, significant_objects};
use crate::features::symbolic_heap::ports::{HeapJoiner, JoinResult, JoinStatus};
use rustc_hash::FxHashMap;
use std::collections::{BTreeSet, VecDeque};

#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleJoiner;

impl SimpleJoiner {
    pub fn new() -> Self {
        Self
    }
}

impl HeapJoiner for SimpleJoiner {
    fn join(&self, h1: &SymHeap, h2: &SymHeap, types: &TypeTable) -> Option<JoinResult> {
        let anchors = anchor_pairs(h1, h2)?;
        let mut ctx = JoinCtx {
            types,
            result: h1.clone(),
            rhs: h2.clone(),
            roots: FxHashMap::default(),
            roots_back: FxHashMap::default(),
            pairs: FxHashMap::default(),
            partner1: FxHashMap::default(),
            partner2: FxHashMap::default(),
            image2: FxHashMap::default(),
            queue: VecDeque::new(),
            lhs_generalized: false,
            rhs_generalized: false,
        };
        for (r1, r2) in anchors {
            ctx.bind_roots(r1, r2)?;
        }
        while let Some((r1, r2)) = ctx.queue.pop_front() {
            ctx.join_roots(r1, r2)?;
        }
        if !ctx.closed() {
            tracing::trace!("join left a pointer to an unpaired root");
            return None;
        }
        ctx.join_neqs();

        let status = JoinStatus::from_flags(ctx.lhs_generalized, ctx.rhs_generalized);
        tracing::trace!(status = status.as_str(), "heaps joined");
        Some(JoinResult {
            heap: ctx.result,
            status,
        })
    }

    fn name(&self) -> &'static str {
        "simple"
    }
}

struct JoinCtx<'a> {
    types: &'a TypeTable,
    /// Starts as a clone of the first heap, so its ids are the first heap's ids
    result: SymHeap,
    rhs: SymHeap,
    roots: FxHashMap<RootId, RootId>,
    roots_back: FxHashMap<RootId, RootId>,
    pairs: FxHashMap<(ValueId, ValueId), ValueId>,
    partner1: FxHashMap<ValueId, ValueId>,
    partner2: FxHashMap<ValueId, ValueId>,
    image2: FxHashMap<ValueId, ValueId>,
    queue: VecDeque<(RootId, RootId)>,
    lhs_generalized: bool,
    rhs_generalized: bool,
}

impl<'a> JoinCtx<'a> {
    fn bind_roots(&mut self, r1: RootId, r2: RootId) -> Option<()> {
        match (self.roots.get(&r1), self.roots_back.get(&r2)) {
            (Some(x), Some(y)) if *x == r2 && *y == r1 => Some(()),
            (None, None) if roots_alike(&self.result, r1, &self.rhs, r2) => {
                self.roots.insert(r1, r2);
                self.roots_back.insert(r2, r1);
                self.queue.push_back((r1, r2));
                Some(())
            }
            _ => None,
        }
    }

    fn join_segments(&mut self, r1: RootId, r2: RootId) -> Option<()> {
        match (self.result.segment(r1), self.rhs.segment(r2)) {
            (None, None) => Some(()),
            (Some(s1), Some(s2)) => {
                if s1.kind != s2.kind || s1.binding != s2.binding || s1.end != s2.end {
                    return None;
                }
                let min_len = s1.min_len.min(s2.min_len);
                self.lhs_generalized |= s1.min_len > min_len;
                self.rhs_generalized |= s2.min_len > min_len;
                self.result.set_min_length(r1, min_len);
                self.bind_roots(s1.peer, s2.peer)
            }
            (Some(s1), None) if s1.kind == SegKind::Sls => {
                // the concrete node is a segment of length one
                if s1.min_len > 1 {
                    self.result.set_min_length(r1, 1);
                    self.lhs_generalized = true;
                }
                self.rhs_generalized = true;
                Some(())
            }
            (None, Some(s2)) if s2.kind == SegKind::Sls => {
                self.result.set_segment(
                    r1,
                    Some(SegmentInfo {
                        min_len: s2.min_len.min(1),
                        peer: r1,
                        ..s2
                    }),
                );
                self.lhs_generalized = true;
                self.rhs_generalized |= s2.min_len > 1;
                Some(())
            }
            _ => None,
        }
    }

    fn join_roots(&mut self, r1: RootId, r2: RootId) -> Option<()> {
        self.join_segments(r1, r2)?;

        let objs1 = significant_objects(&self.result, r1);
        let objs2 = significant_objects(&self.rhs, r2);
        let keys: BTreeSet<(i64, TypeId)> = objs1.keys().chain(objs2.keys()).copied().collect();

        for (offset, ty) in keys {
            let obj1 = self.result.object_at(r1, offset, ty, self.types)?;
            let obj2 = self.rhs.object_at(r2, offset, ty, self.types)?;
            let v1 = self.result.value_of(obj1, self.types);
            let v2 = self.rhs.value_of(obj2, self.types);
            let joined = self.join_values(v1, v2)?;
            if joined != v1 {
                self.result.write_raw(obj1, joined);
            }
        }
        Some(())
    }

    fn join_values(&mut self, v1: ValueId, v2: ValueId) -> Option<ValueId> {
        if let Some(&joined) = self.pairs.get(&(v1, v2)) {
            return Some(joined);
        }
        let k1 = self.result.value_kind(v1).clone();
        let k2 = self.rhs.value_kind(v2).clone();
        let joined = match (&k1, &k2) {
            (
                ValueKind::Address {
                    root: r1,
                    offset: o1,
                },
                ValueKind::Address {
                    root: r2,
                    offset: o2,
                },
            ) => {
                if o1 != o2 {
                    return None;
                }
                self.bind_roots(*r1, *r2)?;
                v1
            }
            (ValueKind::Address { .. }, _) | (_, ValueKind::Address { .. }) => return None,
            (ValueKind::Special(a), ValueKind::Special(b)) if a == b => v1,
            (ValueKind::Custom(a), ValueKind::Custom(b)) if a == b => v1,
            (ValueKind::Unknown, ValueKind::Unknown)
                if self.result.origin(v1) == self.rhs.origin(v2)
                    && self.partner1.get(&v1).map_or(true, |p| *p == v2)
                    && self.partner2.get(&v2).map_or(true, |p| *p == v1) =>
            {
                v1
            }
            // an unknown already covers any defined value
            (ValueKind::Unknown, ValueKind::Special(_) | ValueKind::Custom(_))
                if !self.result.origin(v1).is_uninit()
                    && self.partner1.get(&v1).map_or(true, |p| *p == v2) =>
            {
                v1
            }
            _ => {
                let (o1, o2) = (self.result.origin(v1), self.rhs.origin(v2));
                let origin = if o1 == o2 && o1.is_uninit() {
                    o1
                } else {
                    ValueOrigin::Unknown
                };
                self.result.fresh_unknown(origin)
            }
        };

        self.partner1.entry(v1).or_insert(v2);
        self.partner2.entry(v2).or_insert(v1);
        self.pairs.insert((v1, v2), joined);

        // the first heap lost precision if its value was replaced
        if joined != v1 {
            self.lhs_generalized = true;
        }
        // the second heap lost precision if the result is vaguer than its value
        let rhs_was_unknown = matches!(k2, ValueKind::Unknown);
        let joined_is_unknown = self.result.is_unknown(joined);
        if joined_is_unknown && !rhs_was_unknown {
            self.rhs_generalized = true;
        }
        if joined_is_unknown && rhs_was_unknown && self.result.origin(joined) != self.rhs.origin(v2) {
            self.rhs_generalized = true;
        }
        match self.image2.get(&v2) {
            Some(prev) if *prev != joined => self.rhs_generalized = true,
            Some(_) => {}
            None => {
                self.image2.insert(v2, joined);
            }
        }
        Some(joined)
    }

    /// Every pointer and segment peer of a paired root leads to a paired root
    fn closed(&self) -> bool {
        let sides = [
            (&self.result, &self.roots),
            (&self.rhs, &self.roots_back),
        ];
        sides.into_iter().all(|(heap, bound)| {
            bound.keys().all(|root| {
                let targets_bound = significant_objects(heap, *root)
                    .values()
                    .filter_map(|v| heap.value_root(*v))
                    .all(|target| bound.contains_key(&target));
                let peer_bound = heap.segment(*root).map_or(true, |seg| {
                    bound.contains_key(&seg.peer)
                        && heap.segment(seg.peer).is_some_and(|far| far.peer == *root)
                });
                targets_bound && peer_bound
            })
        })
    }

    /// Keep only disequalities that hold in both heaps
    fn join_neqs(&mut self) {
        let to_rhs = |v: ValueId, map: &FxHashMap<ValueId, ValueId>| {
            if v.is_special() {
                Some(v)
            } else {
                map.get(&v).copied()
            }
        };
        for (a, b) in self.result.neq_pairs() {
            let (Some(a2), Some(b2)) = (to_rhs(a, &self.partner1), to_rhs(b, &self.partner1)) else {
                continue;
            };
            if !self.rhs.prove_distinct(a2, b2) {
                self.result.del_neq(a, b);
                self.lhs_generalized = true;
            }
        }
        for (a2, b2) in self.rhs.neq_pairs() {
            let (Some(a), Some(b)) = (to_rhs(a2, &self.image2), to_rhs(b2, &self.image2)) else {
                continue;
            };
            if !self.result.prove_distinct(a, b) {
                self.rhs_generalized = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::program_model::{VarDecl, VarScope, VarUid};
    use crate::features::symbolic_heap::isomorphism::are_isomorphic;
    use crate::shared::models::Location;

    fn heap_with_int(n: Option<i64>, types: &mut TypeTable) -> (SymHeap, ObjectId) {
        let int = types.int(4);
        let mut heap = SymHeap::new();
        let decl = VarDecl {
            uid: VarUid(0),
            name: "x".into(),
            ty: int,
            scope: VarScope::Local,
            loc: Location::unknown(),
        };
        let addr = heap.address_of(CVar::new(VarUid(0), 1), &decl, types);
        let root = heap.value_root(addr).unwrap();
        let obj = heap.object_at(root, 0, int, types).unwrap();
        let v = match n {
            Some(n) => heap.int_value(n),
            None => heap.fresh_unknown(ValueOrigin::Unknown),
        };
        heap.set_value(obj, v, types);
        (heap, obj)
    }

    #[test]
    fn test_equal_heaps_join_as_use_any() {
        let mut types = TypeTable::new();
        let (h1, _) = heap_with_int(Some(3), &mut types);
        let (h2, _) = heap_with_int(Some(3), &mut types);
        let joined = SimpleJoiner.join(&h1, &h2, &types).unwrap();
        assert_eq!(joined.status, JoinStatus::UseAny);
        assert!(are_isomorphic(&joined.heap, &h1));
    }

    #[test]
    fn test_unknown_covers_custom() {
        let mut types = TypeTable::new();
        let (general, _) = heap_with_int(None, &mut types);
        let (specific, _) = heap_with_int(Some(3), &mut types);
        assert_eq!(
            SimpleJoiner.join(&general, &specific, &types).unwrap().status,
            JoinStatus::UseSh1
        );
        assert_eq!(
            SimpleJoiner.join(&specific, &general, &types).unwrap().status,
            JoinStatus::UseSh2
        );
    }

    #[test]
    fn test_different_customs_generalize_both_sides() {
        let mut types = TypeTable::new();
        let (h1, obj) = heap_with_int(Some(1), &mut types);
        let (h2, _) = heap_with_int(Some(2), &mut types);
        let mut joined = SimpleJoiner.join(&h1, &h2, &types).unwrap();
        assert_eq!(joined.status, JoinStatus::UseSh3);
        let v = joined.heap.value_of(obj, &types);
        assert!(joined.heap.is_unknown(v));
    }

    #[test]
    fn test_pointer_versus_null_is_refused() {
        let mut types = TypeTable::new();
        let void = types.void();
        let ptr = types.ptr(void);
        let decl = VarDecl {
            uid: VarUid(0),
            name: "p".into(),
            ty: ptr,
            scope: VarScope::Local,
            loc: Location::unknown(),
        };
        let build = |target: bool| {
            let mut heap = SymHeap::new();
            let addr = heap.address_of(CVar::new(VarUid(0), 1), &decl, &types);
            let root = heap.value_root(addr).unwrap();
            let obj = heap.object_at(root, 0, ptr, &types).unwrap();
            let v = if target {
                heap.allocate(8, false, None)
            } else {
                ValueId::NULL
            };
            heap.set_value(obj, v, &types);
            heap
        };
        assert!(SimpleJoiner.join(&build(true), &build(false), &types).is_none());
        assert!(SimpleJoiner.join(&build(true), &build(true), &types).is_some());
    }

    #[test]
    fn test_disequality_only_on_one_side_is_dropped() {
        let mut types = TypeTable::new();
        let (mut h1, obj) = heap_with_int(None, &mut types);
        let u = h1.value_of(obj, &types);
        h1.add_neq(u, ValueId::NULL);
        let (h2, _) = heap_with_int(None, &mut types);
        let joined = SimpleJoiner.join(&h1, &h2, &types).unwrap();
        assert_eq!(joined.status, JoinStatus::UseSh2);
        assert!(joined.heap.neq_pairs().is_empty());
    }
}
