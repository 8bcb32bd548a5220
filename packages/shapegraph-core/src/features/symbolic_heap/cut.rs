//! Heap cut and merge around function calls
//!
//! `split_component` separates the part of a heap a callee can observe (the
//! weakly connected component of its arguments and globals) from the rest.
//! After the callee returns, the surround is imported into each result
//! heap with `import_heap`.

use super::domain::*;
use super::heap::SymHeap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

/// Ids of the imported heap as seen in the importing heap
#[derive(Debug, Default, Clone)]
pub struct ImportMap {
    pub roots: FxHashMap<RootId, RootId>,
    pub values: FxHashMap<ValueId, ValueId>,
}

impl SymHeap {
    /// Roots weakly connected to the given variables
    pub fn component_of(&self, cvars: &[CVar]) -> FxHashSet<RootId> {
        let mut seen = FxHashSet::default();
        let mut queue: VecDeque<RootId> = cvars.iter().filter_map(|cv| self.var_root(*cv)).collect();
        while let Some(root) = queue.pop_front() {
            if !self.is_valid_root(root) || !seen.insert(root) {
                continue;
            }
            // forward: everything our objects point to
            for obj in self.objects_of(root) {
                let Some(v) = self.object(obj).and_then(|o| o.value) else {
                    continue;
                };
                if let Some(target) = self.value_root(v) {
                    queue.push_back(target);
                }
            }
            // backward: everything pointing to us
            for obj in self.points_to(root) {
                if let Some(o) = self.object(obj) {
                    queue.push_back(o.root);
                }
            }
            if let Some(seg) = self.segment(root) {
                queue.push_back(seg.peer);
            }
        }
        seen
    }

    /// Split into `(cut, surround)`.
    ///
    /// Caller variables that alias the component travel with it, so the two
    /// parts never share a live root.
    pub fn split_component(&self, cvars: &[CVar]) -> (SymHeap, SymHeap) {
        let component = self.component_of(cvars);
        let mut cut = self.clone();
        let mut surround = self.clone();
        for root in self.live_roots() {
            if component.contains(&root) {
                surround.destroy_root(root);
            } else {
                cut.destroy_root(root);
            }
        }
        tracing::trace!(
            cut = component.len(),
            surround = surround.live_roots().len(),
            "heap split"
        );
        (cut, surround)
    }

    /// Deep-copy every live root of `src` into this heap under fresh ids.
    ///
    /// Unknown values stay unknown but lose any identity with values of this
    /// heap. When both heaps bind the same variable, the root imported from
    /// `src` wins and pointers to the one of this heap are redirected.
    pub fn import_heap(&mut self, src: &SymHeap) -> ImportMap {
        let mut map = ImportMap::default();
        let live = src.live_roots();
        for root in &live {
            self.import_root(src, *root, &mut map);
        }
        for root in &live {
            let Some(dst) = map.roots.get(root).copied() else {
                continue;
            };
            for obj in src.objects_of(*root) {
                let Some(orec) = src.object(obj) else {
                    continue;
                };
                let (offset, ty, size, value) = (orec.offset, orec.ty, orec.size, orec.value);
                let copy = self.create_object_raw(dst, offset, ty, size);
                if let Some(v) = value {
                    if !matches!(src.value_kind(v), ValueKind::Composite(_)) {
                        let nv = self.import_value(src, v, &mut map);
                        self.write_raw(copy, nv);
                    }
                }
            }
            if let Some(seg) = src.segment(*root) {
                let peer = self.import_root(src, seg.peer, &mut map);
                self.set_segment(dst, Some(SegmentInfo { peer, ..seg }));
            }
        }

        for (a, b) in src.neq_pairs() {
            let a = if a.is_special() { Some(a) } else { map.values.get(&a).copied() };
            let b = if b.is_special() { Some(b) } else { map.values.get(&b).copied() };
            if let (Some(a), Some(b)) = (a, b) {
                self.add_neq(a, b);
            }
        }
        if let Some(ret) = src.return_root() {
            let root = self.import_root(src, ret, &mut map);
            self.set_return_root(Some(root));
        }
        map
    }

    fn import_root(&mut self, src: &SymHeap, root: RootId, map: &mut ImportMap) -> RootId {
        if let Some(&dst) = map.roots.get(&root) {
            return dst;
        }
        let (storage, size, ty, zeroed, valid) = match src.root(root) {
            Some(rec) => (rec.storage, rec.size, rec.ty, rec.zeroed, rec.valid),
            None => (Storage::Heap, 0, None, false, false),
        };
        let dst = self.push_root(RootRecord::new(storage, size, ty, zeroed));
        map.roots.insert(root, dst);
        if !valid {
            self.mark_dead(dst);
            return dst;
        }
        if let Some(cvar) = storage.cvar() {
            if let Some(existing) = self.var_root(cvar) {
                self.redirect_refs(existing, dst, &[]);
                self.destroy_root(existing);
            }
            self.bind_cvar(cvar, dst);
        }
        dst
    }

    fn import_value(&mut self, src: &SymHeap, v: ValueId, map: &mut ImportMap) -> ValueId {
        if v.is_special() {
            return v;
        }
        if let Some(&nv) = map.values.get(&v) {
            return nv;
        }
        let nv = match src.value_kind(v).clone() {
            ValueKind::Special(_) | ValueKind::Composite(_) => ValueId::INVALID,
            ValueKind::Custom(custom) => self.custom_value(custom),
            ValueKind::Unknown => self.fresh_unknown(src.origin(v)),
            ValueKind::Address { root, offset } => {
                let dst = self.import_root(src, root, map);
                self.address(dst, offset)
            }
        };
        map.values.insert(v, nv);
        nv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::program_model::{TypeId, TypeTable, VarDecl, VarScope, VarUid};
    use crate::features::symbolic_heap::isomorphism::are_isomorphic;
    use crate::shared::models::Location;

    fn pointer_var(heap: &mut SymHeap, uid: u32, ty: TypeId, types: &TypeTable) -> ObjectId {
        let decl = VarDecl {
            uid: VarUid(uid),
            name: format!("p{}", uid),
            ty,
            scope: VarScope::Local,
            loc: Location::unknown(),
        };
        let addr = heap.address_of(CVar::new(VarUid(uid), 1), &decl, types);
        let root = heap.value_root(addr).unwrap();
        heap.object_at(root, 0, ty, types).unwrap()
    }

    #[test]
    fn test_split_then_import_restores_the_heap() {
        let mut types = TypeTable::new();
        let void = types.void();
        let ptr = types.ptr(void);
        let mut heap = SymHeap::new();
        let a = pointer_var(&mut heap, 0, ptr, &types);
        let b = pointer_var(&mut heap, 1, ptr, &types);
        let ta = heap.allocate(8, false, None);
        let tb = heap.allocate(8, false, None);
        heap.set_value(a, ta, &types);
        heap.set_value(b, tb, &types);

        let (cut, surround) = heap.split_component(&[CVar::new(VarUid(0), 1)]);
        assert_eq!(cut.live_roots().len(), 2);
        assert_eq!(surround.live_roots().len(), 2);
        assert!(cut.var_root(CVar::new(VarUid(1), 1)).is_none());

        let mut merged = surround;
        merged.import_heap(&cut);
        assert!(are_isomorphic(&merged, &heap));
    }

    #[test]
    fn test_aliasing_caller_variable_joins_the_cut() {
        let mut types = TypeTable::new();
        let void = types.void();
        let ptr = types.ptr(void);
        let mut heap = SymHeap::new();
        let a = pointer_var(&mut heap, 0, ptr, &types);
        let b = pointer_var(&mut heap, 1, ptr, &types);
        let shared = heap.allocate(8, false, None);
        heap.set_value(a, shared, &types);
        heap.set_value(b, shared, &types);

        let (cut, surround) = heap.split_component(&[CVar::new(VarUid(0), 1)]);
        assert!(cut.var_root(CVar::new(VarUid(1), 1)).is_some());
        assert!(surround.live_roots().is_empty());
    }

    #[test]
    fn test_import_keeps_unknown_sharing_and_disequalities() {
        let mut types = TypeTable::new();
        let int = types.int(8);
        let mut src = SymHeap::new();
        let x = pointer_var(&mut src, 0, int, &types);
        let y = pointer_var(&mut src, 1, int, &types);
        let u = src.fresh_unknown(ValueOrigin::Unknown);
        src.set_value(x, u, &types);
        src.set_value(y, u, &types);
        src.add_neq(u, ValueId::NULL);

        let mut dst = SymHeap::new();
        dst.fresh_unknown(ValueOrigin::Unknown);
        let map = dst.import_heap(&src);
        let nu = map.values[&u];
        assert_ne!(nu, u);
        assert_eq!(dst.used_by(nu).len(), 2);
        assert!(dst.has_neq(nu, ValueId::NULL));
        assert!(are_isomorphic(&dst, &src));
    }
}
