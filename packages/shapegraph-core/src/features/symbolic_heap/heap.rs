//! Symbolic heap
//!
//! One `SymHeap` is one disjunct of a program state: a graph of roots, typed
//! objects and interned values plus a set of disequalities. Heaps are
//! duplicated with `clone()` whenever execution forks; clones share no
//! mutable state.
//!
//! ```text
//!   CVar ──▶ Root ──owns──▶ Object(off, ty) ──holds──▶ Value
//!              ▲                                         │
//!              └──────────── Address{root, off} ◀────────┘
//! ```

use super::domain::*;
use crate::features::program_model::{TypeId, TypeTable, VarDecl, VarScope};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};

static INVALID_RECORD: ValueRecord = ValueRecord {
    kind: ValueKind::Special(SpecialValue::Invalid),
    origin: ValueOrigin::Assigned,
};

#[derive(Debug, Clone)]
pub struct SymHeap {
    values: Vec<ValueRecord>,
    /// Objects currently holding each value (live objects only)
    used_by: Vec<BTreeSet<ObjectId>>,
    roots: Vec<RootRecord>,
    objects: Vec<ObjectRecord>,
    customs: FxHashMap<CustomValue, ValueId>,
    cvars: BTreeMap<CVar, RootId>,
    neq: BTreeSet<(ValueId, ValueId)>,
    return_root: Option<RootId>,
}

impl Default for SymHeap {
    fn default() -> Self {
        Self::new()
    }
}

fn neq_key(v1: ValueId, v2: ValueId) -> (ValueId, ValueId) {
    if v1 < v2 {
        (v1, v2)
    } else {
        (v2, v1)
    }
}

impl SymHeap {
    pub fn new() -> Self {
        let mut heap = Self {
            values: Vec::new(),
            used_by: Vec::new(),
            roots: Vec::new(),
            objects: Vec::new(),
            customs: FxHashMap::default(),
            cvars: BTreeMap::new(),
            neq: BTreeSet::new(),
            return_root: None,
        };
        for special in [
            SpecialValue::Invalid,
            SpecialValue::Null,
            SpecialValue::True,
            SpecialValue::False,
        ] {
            heap.push_value(ValueKind::Special(special), ValueOrigin::Assigned);
        }
        heap
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Values
    // ═══════════════════════════════════════════════════════════════════════

    fn push_value(&mut self, kind: ValueKind, origin: ValueOrigin) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueRecord { kind, origin });
        self.used_by.push(BTreeSet::new());
        id
    }

    pub fn value_record(&self, v: ValueId) -> &ValueRecord {
        self.values.get(v.0 as usize).unwrap_or(&INVALID_RECORD)
    }

    pub fn value_kind(&self, v: ValueId) -> &ValueKind {
        &self.value_record(v).kind
    }

    pub fn origin(&self, v: ValueId) -> ValueOrigin {
        self.value_record(v).origin
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn fresh_unknown(&mut self, origin: ValueOrigin) -> ValueId {
        self.push_value(ValueKind::Unknown, origin)
    }

    pub fn custom_value(&mut self, custom: CustomValue) -> ValueId {
        if let Some(&v) = self.customs.get(&custom) {
            return v;
        }
        let v = self.push_value(ValueKind::Custom(custom.clone()), ValueOrigin::Assigned);
        self.customs.insert(custom, v);
        v
    }

    pub fn int_value(&mut self, n: i64) -> ValueId {
        self.custom_value(CustomValue::Int(n))
    }

    pub fn bool_value(&self, b: bool) -> ValueId {
        if b {
            ValueId::TRUE
        } else {
            ValueId::FALSE
        }
    }

    pub fn custom_of(&self, v: ValueId) -> Option<&CustomValue> {
        match self.value_kind(v) {
            ValueKind::Custom(c) => Some(c),
            _ => None,
        }
    }

    /// Integer reading of a value (null and booleans included)
    pub fn int_of(&self, v: ValueId) -> Option<i64> {
        match self.value_kind(v) {
            ValueKind::Custom(CustomValue::Int(n)) => Some(*n),
            ValueKind::Special(SpecialValue::Null) | ValueKind::Special(SpecialValue::False) => {
                Some(0)
            }
            ValueKind::Special(SpecialValue::True) => Some(1),
            _ => None,
        }
    }

    pub fn is_unknown(&self, v: ValueId) -> bool {
        matches!(self.value_kind(v), ValueKind::Unknown)
    }

    pub fn is_address(&self, v: ValueId) -> bool {
        matches!(self.value_kind(v), ValueKind::Address { .. })
    }

    pub fn value_root(&self, v: ValueId) -> Option<RootId> {
        match self.value_kind(v) {
            ValueKind::Address { root, .. } => Some(*root),
            _ => None,
        }
    }

    /// Offset of an address from its root (0 for other values)
    pub fn value_offset(&self, v: ValueId) -> i64 {
        match self.value_kind(v) {
            ValueKind::Address { offset, .. } => *offset,
            _ => 0,
        }
    }

    pub fn target_kind(&self, v: ValueId) -> TargetKind {
        match self.value_kind(v) {
            ValueKind::Special(SpecialValue::Invalid) => TargetKind::Invalid,
            ValueKind::Special(SpecialValue::Null) => TargetKind::Null,
            ValueKind::Special(_) | ValueKind::Custom(_) => TargetKind::Custom,
            ValueKind::Composite(_) => TargetKind::Composite,
            ValueKind::Unknown => TargetKind::Unknown,
            ValueKind::Address { root, .. } => match self.root(*root) {
                None => TargetKind::Invalid,
                Some(rec) if !rec.valid => match rec.storage {
                    Storage::Heap => TargetKind::Deleted,
                    _ => TargetKind::Lost,
                },
                Some(rec) if rec.is_abstract() => TargetKind::Abstract,
                Some(rec) => match rec.storage {
                    Storage::Heap => TargetKind::OnHeap,
                    Storage::Static(_) => TargetKind::Static,
                    Storage::Stack(_) | Storage::Return => TargetKind::OnStack,
                },
            },
        }
    }

    /// Live objects holding `v`
    pub fn used_by(&self, v: ValueId) -> Vec<ObjectId> {
        self.used_by
            .get(v.0 as usize)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Pointer arithmetic; off-root addresses are interned
    pub fn by_offset(&mut self, v: ValueId, delta: i64) -> ValueId {
        if delta == 0 {
            return v;
        }
        match *self.value_kind(v) {
            ValueKind::Address { root, offset } => self.address(root, offset + delta),
            _ => ValueId::INVALID,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Roots
    // ═══════════════════════════════════════════════════════════════════════

    pub(crate) fn push_root(&mut self, rec: RootRecord) -> RootId {
        let id = RootId(self.roots.len() as u32);
        self.roots.push(rec);
        self.address(id, 0);
        id
    }

    pub(crate) fn address(&mut self, root: RootId, offset: i64) -> ValueId {
        if let Some(&v) = self
            .roots
            .get(root.0 as usize)
            .and_then(|r| r.addresses.get(&offset))
        {
            return v;
        }
        let v = self.push_value(ValueKind::Address { root, offset }, ValueOrigin::Assigned);
        if let Some(rec) = self.roots.get_mut(root.0 as usize) {
            rec.addresses.insert(offset, v);
        }
        v
    }

    pub fn root_address(&mut self, root: RootId) -> ValueId {
        self.address(root, 0)
    }

    /// Address of a root at `offset` if it was ever interned
    pub fn existing_address(&self, root: RootId, offset: i64) -> Option<ValueId> {
        self.root(root).and_then(|r| r.addresses.get(&offset).copied())
    }

    pub fn root(&self, root: RootId) -> Option<&RootRecord> {
        self.roots.get(root.0 as usize)
    }

    pub fn root_total(&self) -> usize {
        self.roots.len()
    }

    pub fn live_roots(&self) -> Vec<RootId> {
        self.roots
            .iter()
            .enumerate()
            .filter(|(_, r)| r.valid)
            .map(|(i, _)| RootId(i as u32))
            .collect()
    }

    pub fn is_valid_root(&self, root: RootId) -> bool {
        self.root(root).map(|r| r.valid).unwrap_or(false)
    }

    pub fn is_program_var(&self, root: RootId) -> bool {
        self.root(root)
            .map(|r| r.storage.is_program_var())
            .unwrap_or(false)
    }

    pub fn root_size(&self, root: RootId) -> i64 {
        self.root(root).map(|r| r.size).unwrap_or(0)
    }

    pub fn root_type(&self, root: RootId) -> Option<TypeId> {
        self.root(root).and_then(|r| r.ty)
    }

    pub fn segment(&self, root: RootId) -> Option<SegmentInfo> {
        self.root(root).filter(|r| r.valid).and_then(|r| r.segment)
    }

    pub fn is_abstract(&self, root: RootId) -> bool {
        self.segment(root).is_some()
    }

    pub fn set_segment(&mut self, root: RootId, segment: Option<SegmentInfo>) {
        if let Some(rec) = self.roots.get_mut(root.0 as usize) {
            rec.segment = segment;
        }
    }

    /// Minimal length of the segment (1 for concrete roots)
    pub fn min_length(&self, root: RootId) -> u32 {
        self.segment(root).map(|s| s.min_len).unwrap_or(1)
    }

    /// Update the minimal length on both ends of a segment
    pub fn set_min_length(&mut self, root: RootId, min_len: u32) {
        let Some(seg) = self.segment(root) else {
            return;
        };
        for end in [root, seg.peer] {
            if let Some(rec) = self.roots.get_mut(end.0 as usize) {
                if let Some(s) = rec.segment.as_mut() {
                    s.min_len = min_len;
                }
            }
        }
    }

    /// Address of a program variable, creating its root on first use
    pub fn address_of(&mut self, cvar: CVar, decl: &VarDecl, types: &TypeTable) -> ValueId {
        if let Some(&root) = self.cvars.get(&cvar) {
            return self.root_address(root);
        }
        let (storage, zeroed) = match decl.scope {
            VarScope::Global => (Storage::Static(cvar), true),
            VarScope::Local | VarScope::Arg(_) => (Storage::Stack(cvar), false),
        };
        let root = self.push_root(RootRecord::new(
            storage,
            types.size_of(decl.ty),
            Some(decl.ty),
            zeroed,
        ));
        self.cvars.insert(cvar, root);
        self.root_address(root)
    }

    pub fn var_root(&self, cvar: CVar) -> Option<RootId> {
        self.cvars.get(&cvar).copied()
    }

    pub fn cvars(&self) -> Vec<(CVar, RootId)> {
        self.cvars.iter().map(|(cv, r)| (*cv, *r)).collect()
    }

    /// Register an imported variable root (used by heap import)
    pub(crate) fn bind_cvar(&mut self, cvar: CVar, root: RootId) {
        self.cvars.insert(cvar, root);
    }

    /// Fresh heap root; returns its address
    pub fn allocate(&mut self, size: i64, zeroed: bool, ty: Option<TypeId>) -> ValueId {
        let root = self.push_root(RootRecord::new(Storage::Heap, size, ty, zeroed));
        self.root_address(root)
    }

    pub fn return_root(&self) -> Option<RootId> {
        self.return_root
    }

    /// Object of the return slot, created with type `ty` when missing
    pub fn return_object(&mut self, ty: TypeId, types: &TypeTable) -> Option<ObjectId> {
        let root = match self.return_root {
            Some(root) => root,
            None => {
                let root = self.push_root(RootRecord::new(
                    Storage::Return,
                    types.size_of(ty),
                    Some(ty),
                    false,
                ));
                self.return_root = Some(root);
                root
            }
        };
        self.object_at(root, 0, ty, types)
    }

    /// Imported dead roots keep their storage but own nothing
    pub(crate) fn mark_dead(&mut self, root: RootId) {
        if let Some(rec) = self.roots.get_mut(root.0 as usize) {
            rec.valid = false;
        }
    }

    pub(crate) fn set_return_root(&mut self, root: Option<RootId>) {
        self.return_root = root;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Objects
    // ═══════════════════════════════════════════════════════════════════════

    pub fn object(&self, obj: ObjectId) -> Option<&ObjectRecord> {
        self.objects.get(obj.0 as usize).filter(|o| o.live)
    }

    pub(crate) fn create_object_raw(
        &mut self,
        root: RootId,
        offset: i64,
        ty: TypeId,
        size: i64,
    ) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(ObjectRecord {
            root,
            offset,
            ty,
            size,
            value: None,
            live: true,
        });
        if let Some(rec) = self.roots.get_mut(root.0 as usize) {
            rec.objects.insert((offset, ty), id);
            rec.arena.insert(id, offset, offset + size);
        }
        id
    }

    /// Typed object at `offset` inside `root`, created lazily.
    ///
    /// Returns `None` for destroyed roots and accesses beyond the root size.
    pub fn object_at(
        &mut self,
        root: RootId,
        offset: i64,
        ty: TypeId,
        types: &TypeTable,
    ) -> Option<ObjectId> {
        let rec = self.roots.get(root.0 as usize)?;
        if !rec.valid {
            return None;
        }
        let size = types.size_of(ty);
        if offset < 0 || offset + size > rec.size {
            return None;
        }
        if let Some(&obj) = rec.objects.get(&(offset, ty)) {
            return Some(obj);
        }

        // a new scalar over already written bytes inherits or loses their value
        let mut inherited = None;
        let mut punned = false;
        if !types.is_composite(ty) {
            for other in rec.arena.overlapping(offset, offset + size) {
                let o = &self.objects[other.0 as usize];
                if types.is_composite(o.ty) {
                    continue;
                }
                let Some(v) = o.value else {
                    continue;
                };
                if o.offset == offset && o.size == size && same_class(o.ty, ty, types) {
                    inherited = Some(v);
                } else {
                    punned = true;
                }
            }
        }

        let obj = self.create_object_raw(root, offset, ty, size);
        if punned {
            let v = self.fresh_unknown(ValueOrigin::Reinterpret);
            self.write_raw(obj, v);
        } else if let Some(v) = inherited {
            self.write_raw(obj, v);
        }
        Some(obj)
    }

    /// Sub-object of `obj` at a relative offset
    pub fn sub_object(
        &mut self,
        obj: ObjectId,
        delta: i64,
        ty: TypeId,
        types: &TypeTable,
    ) -> Option<ObjectId> {
        let (root, offset) = {
            let rec = self.object(obj)?;
            (rec.root, rec.offset)
        };
        self.object_at(root, offset + delta, ty, types)
    }

    /// Live objects of a root ordered by (offset, type)
    pub fn objects_of(&self, root: RootId) -> Vec<ObjectId> {
        self.root(root)
            .map(|r| r.objects.values().copied().collect())
            .unwrap_or_default()
    }

    /// Current value of an already materialized object at `offset`, any type
    pub fn peek_value_at(&self, root: RootId, offset: i64) -> Option<ValueId> {
        let rec = self.root(root)?;
        rec.objects
            .range((offset, TypeId(0))..(offset + 1, TypeId(0)))
            .filter_map(|(_, obj)| self.objects[obj.0 as usize].value)
            .find(|v| !matches!(self.value_kind(*v), ValueKind::Composite(_)))
    }

    /// Object at `offset` holding exactly `value`, if any
    pub fn object_holding(&self, root: RootId, offset: i64, value: ValueId) -> Option<ObjectId> {
        let rec = self.root(root)?;
        rec.objects
            .range((offset, TypeId(0))..(offset + 1, TypeId(0)))
            .map(|(_, obj)| *obj)
            .find(|obj| self.objects[obj.0 as usize].value == Some(value))
    }

    pub fn value_of(&mut self, obj: ObjectId, types: &TypeTable) -> ValueId {
        let Some(rec) = self.object(obj) else {
            return ValueId::INVALID;
        };
        if let Some(v) = rec.value {
            return v;
        }
        let (root, ty) = (rec.root, rec.ty);
        let v = if types.is_composite(ty) {
            self.push_value(ValueKind::Composite(obj), ValueOrigin::Assigned)
        } else {
            let (zeroed, storage) = match self.root(root) {
                Some(r) => (r.zeroed, r.storage),
                None => return ValueId::INVALID,
            };
            if zeroed || matches!(storage, Storage::Static(_)) {
                self.zero_value(ty, types)
            } else {
                let origin = match storage {
                    Storage::Heap => ValueOrigin::HeapUninit,
                    Storage::Stack(_) => ValueOrigin::StackUninit,
                    _ => ValueOrigin::Unknown,
                };
                self.fresh_unknown(origin)
            }
        };
        self.write_raw(obj, v);
        v
    }

    pub fn zero_value(&mut self, ty: TypeId, types: &TypeTable) -> ValueId {
        if types.is_bool(ty) {
            ValueId::FALSE
        } else if types.is_ptr(ty) || types.size_of(ty) == 0 {
            ValueId::NULL
        } else {
            self.int_value(0)
        }
    }

    /// Store without touching overlapping objects; returns the previous value
    pub(crate) fn write_raw(&mut self, obj: ObjectId, v: ValueId) -> Option<ValueId> {
        let old = self.objects.get_mut(obj.0 as usize)?.value.replace(v);
        if let Some(old) = old {
            if let Some(set) = self.used_by.get_mut(old.0 as usize) {
                set.remove(&obj);
            }
        }
        if let Some(set) = self.used_by.get_mut(v.0 as usize) {
            set.insert(obj);
        }
        old
    }

    /// Write a scalar value.
    ///
    /// Overlapping scalar objects of a different extent or class are
    /// reinterpreted (their value becomes unknown). Returns every value that
    /// lost a holder, to be inspected by the garbage collector.
    pub fn set_value(&mut self, obj: ObjectId, v: ValueId, types: &TypeTable) -> Vec<ValueId> {
        let Some(rec) = self.object(obj) else {
            return Vec::new();
        };
        let (root, offset, size, ty) = (rec.root, rec.offset, rec.size, rec.ty);
        let mut killed = Vec::new();

        if !types.is_composite(ty) {
            let overlapping = self
                .root(root)
                .map(|r| r.arena.overlapping(offset, offset + size))
                .unwrap_or_default();
            for other in overlapping {
                if other == obj {
                    continue;
                }
                let o = &self.objects[other.0 as usize];
                if types.is_composite(o.ty) || o.value.is_none() {
                    continue;
                }
                let aliased = o.offset == offset && o.size == size && same_class(o.ty, ty, types);
                let replacement = if aliased {
                    v
                } else {
                    self.fresh_unknown(ValueOrigin::Reinterpret)
                };
                if let Some(old) = self.write_raw(other, replacement) {
                    if old != replacement {
                        killed.push(old);
                    }
                }
            }
        }

        if let Some(old) = self.write_raw(obj, v) {
            if old != v {
                killed.push(old);
            }
        }
        killed
    }

    /// Objects (in any root) holding an address of `root`
    pub fn points_to(&self, root: RootId) -> Vec<ObjectId> {
        let Some(rec) = self.root(root) else {
            return Vec::new();
        };
        let mut out = BTreeSet::new();
        for v in rec.addresses.values() {
            if let Some(set) = self.used_by.get(v.0 as usize) {
                out.extend(set.iter().copied());
            }
        }
        out.into_iter().collect()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Destruction
    // ═══════════════════════════════════════════════════════════════════════

    /// Destroy a root; its addresses stay valid handles (deleted/lost).
    ///
    /// Returns the values its objects were holding.
    pub fn destroy_root(&mut self, root: RootId) -> Vec<ValueId> {
        let Some(rec) = self.roots.get_mut(root.0 as usize) else {
            return Vec::new();
        };
        if !rec.valid {
            return Vec::new();
        }
        let objs: Vec<ObjectId> = rec.objects.values().copied().collect();
        rec.objects.clear();
        rec.arena.clear();
        rec.valid = false;
        rec.segment = None;
        let storage = rec.storage;

        let mut killed = Vec::new();
        for obj in objs {
            let orec = &mut self.objects[obj.0 as usize];
            orec.live = false;
            if let Some(v) = orec.value.take() {
                if let Some(set) = self.used_by.get_mut(v.0 as usize) {
                    set.remove(&obj);
                }
                killed.push(v);
            }
        }

        if let Some(cvar) = storage.cvar() {
            if self.cvars.get(&cvar) == Some(&root) {
                self.cvars.remove(&cvar);
            }
        }
        if storage == Storage::Return && self.return_root == Some(root) {
            self.return_root = None;
        }
        killed
    }

    /// Destroy the root addressed by `v` and return the values it held.
    ///
    /// `None` unless `v` addresses a live root at offset 0.
    pub fn destroy_target(&mut self, v: ValueId) -> Option<Vec<ValueId>> {
        let root = self.value_root(v)?;
        if self.value_offset(v) != 0 || !self.is_valid_root(root) {
            return None;
        }
        Some(self.destroy_root(root))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Disequalities
    // ═══════════════════════════════════════════════════════════════════════

    pub fn add_neq(&mut self, v1: ValueId, v2: ValueId) {
        if v1 != v2 {
            self.neq.insert(neq_key(v1, v2));
        }
    }

    pub fn del_neq(&mut self, v1: ValueId, v2: ValueId) {
        self.neq.remove(&neq_key(v1, v2));
    }

    pub fn has_neq(&self, v1: ValueId, v2: ValueId) -> bool {
        self.neq.contains(&neq_key(v1, v2))
    }

    /// True if `v` takes part in any disequality
    pub fn has_preds(&self, v: ValueId) -> bool {
        self.neq.iter().any(|(a, b)| *a == v || *b == v)
    }

    pub fn neq_pairs(&self) -> Vec<(ValueId, ValueId)> {
        self.neq.iter().copied().collect()
    }

    fn move_neqs(&mut self, from: ValueId, to: ValueId) -> bool {
        let pairs: Vec<(ValueId, ValueId)> = self
            .neq
            .iter()
            .filter(|(a, b)| *a == from || *b == from)
            .copied()
            .collect();
        let mut consistent = true;
        for (a, b) in pairs {
            self.neq.remove(&(a, b));
            let other = if a == from { b } else { a };
            if other == to {
                consistent = false;
            } else {
                self.add_neq(to, other);
            }
        }
        consistent
    }

    /// Substitute `by` for `v` in every object and predicate.
    ///
    /// Returns false when the substitution contradicts a disequality, i.e.
    /// the heap describes no concrete state anymore.
    pub fn replace(&mut self, v: ValueId, by: ValueId) -> bool {
        if v == by {
            return true;
        }
        if self.has_neq(v, by) {
            return false;
        }
        for obj in self.used_by(v) {
            self.write_raw(obj, by);
        }
        self.move_neqs(v, by)
    }

    /// Redirect pointers to `from` so that they point into `to` at the same offsets.
    ///
    /// Objects inside `keep_roots` keep their old pointers.
    pub fn redirect_refs(&mut self, from: RootId, to: RootId, keep_roots: &[RootId]) {
        let addrs: Vec<(i64, ValueId)> = match self.root(from) {
            Some(rec) => rec.addresses.iter().map(|(o, v)| (*o, *v)).collect(),
            None => return,
        };
        for (offset, v) in addrs {
            let holders: Vec<ObjectId> = self
                .used_by(v)
                .into_iter()
                .filter(|obj| !keep_roots.contains(&self.objects[obj.0 as usize].root))
                .collect();
            if holders.is_empty() && !self.has_preds(v) {
                continue;
            }
            let nv = self.address(to, offset);
            for obj in holders {
                self.write_raw(obj, nv);
            }
            self.move_neqs(v, nv);
        }
    }

    /// Duplicate a root with all its objects; values are shared, not copied
    pub fn clone_root(&mut self, root: RootId) -> Option<RootId> {
        let rec = self.root(root)?;
        if !rec.valid {
            return None;
        }
        let copy = RootRecord::new(rec.storage, rec.size, rec.ty, rec.zeroed);
        let objs: Vec<(i64, TypeId, Option<ValueId>, i64)> = rec
            .objects
            .values()
            .map(|obj| {
                let o = &self.objects[obj.0 as usize];
                (o.offset, o.ty, o.value, o.size)
            })
            .collect();

        let dup = self.push_root(copy);
        for (offset, ty, value, size) in objs {
            let obj = self.create_object_raw(dup, offset, ty, size);
            if let Some(v) = value {
                if !matches!(self.value_kind(v), ValueKind::Composite(_)) {
                    self.write_raw(obj, v);
                }
            }
        }
        Some(dup)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Proofs
    // ═══════════════════════════════════════════════════════════════════════

    /// True if `v1` and `v2` can never denote the same value.
    ///
    /// Addresses of possibly-empty segments may stand for whatever leaves
    /// the segment; those aliases are followed before deciding.
    pub fn prove_distinct(&self, v1: ValueId, v2: ValueId) -> bool {
        if v1 == v2 {
            return false;
        }
        if self.has_neq(v1, v2) {
            return true;
        }
        let aliases1 = self.may_equal(v1);
        let aliases2 = self.may_equal(v2);
        for &a in &aliases1 {
            for &b in &aliases2 {
                if a == b {
                    return false;
                }
                if !self.has_neq(a, b) && !self.base_distinct(a, b) {
                    return false;
                }
            }
        }
        true
    }

    /// `v` plus every value it equals when segments in front of it are short
    fn may_equal(&self, v: ValueId) -> Vec<ValueId> {
        let mut out = vec![v];
        let mut seen = BTreeSet::from([v]);
        let mut cur = v;
        loop {
            let Some(root) = self.value_root(cur) else {
                break;
            };
            let Some(seg) = self.segment(root) else {
                break;
            };
            if self.value_offset(cur) != seg.binding.head {
                break;
            }
            if seg.kind == SegKind::Dls && seg.min_len <= 1 {
                // a single node is both ends at once
                if let Some(peer_head) = self.existing_address(seg.peer, seg.binding.head) {
                    if seen.insert(peer_head) {
                        out.push(peer_head);
                    }
                }
            }
            if seg.min_len > 0 {
                break;
            }
            let far = self.segment(seg.peer).unwrap_or(seg);
            let next = self
                .peek_value_at(seg.peer, far.outward())
                .unwrap_or(ValueId::INVALID);
            if !seen.insert(next) {
                break;
            }
            out.push(next);
            cur = next;
        }
        out
    }

    fn base_distinct(&self, a: ValueId, b: ValueId) -> bool {
        use SpecialValue::*;
        use ValueKind::*;
        match (self.value_kind(a), self.value_kind(b)) {
            (Unknown, _) | (_, Unknown) => false,
            (Composite(_), _) | (_, Composite(_)) => false,
            (Special(Invalid), _) | (_, Special(Invalid)) => false,
            (Special(x), Special(y)) => x != y,
            (Special(s), Custom(CustomValue::Int(n))) | (Custom(CustomValue::Int(n)), Special(s)) => {
                match s {
                    True => *n != 1,
                    _ => *n != 0,
                }
            }
            (Special(_), Custom(_)) | (Custom(_), Special(_)) => true,
            (Custom(x), Custom(y)) => x != y,
            (Address { .. }, Special(Null | False)) | (Special(Null | False), Address { .. }) => {
                true
            }
            (Address { .. }, Special(True)) | (Special(True), Address { .. }) => false,
            (Address { .. }, Custom(CustomValue::Int(_)))
            | (Custom(CustomValue::Int(_)), Address { .. }) => false,
            (Address { .. }, Custom(_)) | (Custom(_), Address { .. }) => true,
            (
                Address {
                    root: r1,
                    offset: o1,
                },
                Address {
                    root: r2,
                    offset: o2,
                },
            ) => r1 != r2 || o1 != o2,
        }
    }
}

/// Objects of the same class alias instead of reinterpreting each other
fn same_class(a: TypeId, b: TypeId, types: &TypeTable) -> bool {
    a == b
        || (types.is_ptr(a) && types.is_ptr(b))
        || (types.size_of(a) == types.size_of(b) && !types.is_ptr(a) && !types.is_ptr(b)
            && !types.is_bool(a) && !types.is_bool(b))
}
