//! Operand resolution against one heap
//!
//! A variable operand is its root object followed by an accessor chain.
//! Every `Deref` on the way runs the dereference check; a failed check is
//! reported once and the operand degrades to a deref-failed unknown.

use super::builtins::Builtin;
use super::interpreter::Interpreter;
use crate::features::diagnostics::FindingKind;
use crate::features::program_model::{
    Accessor, Constant, FuncId, Insn, InsnKind, Operand, TypeId, VarDecl, VarRef, VarScope,
};
use crate::features::segment_abstraction::concretize;
use crate::features::symbolic_heap::{
    CVar, CustomValue, ObjectId, RootId, SymHeap, TargetKind, ValueId, ValueOrigin,
};

/// Typed position inside a root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Place {
    pub root: RootId,
    pub offset: i64,
    pub ty: TypeId,
}

impl<'a> Interpreter<'a> {
    /// Variables of this activation are keyed by its nesting level
    pub(super) fn cvar_of(&self, decl: &VarDecl) -> CVar {
        match decl.scope {
            VarScope::Global => CVar::global(decl.uid),
            VarScope::Local | VarScope::Arg(_) => CVar::new(decl.uid, self.path.nest_level()),
        }
    }

    /// Static type of an operand, `None` for constants and address-of
    pub(super) fn type_of(&self, op: &Operand) -> Option<TypeId> {
        let var = op.var_ref()?;
        let types = self.types();
        let mut ty = self.program.var(var.uid)?.ty;
        for acc in &var.accessors {
            ty = match acc {
                Accessor::Deref => types.pointee(ty)?,
                Accessor::Field(i) => types.field(ty, *i)?.ty,
                Accessor::Item(_) => types.array_elem(ty).or_else(|| types.pointee(ty))?,
                Accessor::Ref => return None,
            };
        }
        Some(ty)
    }

    /// Operand that is (or yields) a pointer
    pub(super) fn is_pointer_operand(&self, op: &Operand) -> bool {
        match op {
            Operand::Const(Constant::Null) => true,
            Operand::Var(var) if var.accessors.last() == Some(&Accessor::Ref) => true,
            _ => self.type_of(op).is_some_and(|ty| self.types().is_ptr(ty)),
        }
    }

    pub(super) fn place_of(&mut self, heap: &mut SymHeap, var: &VarRef) -> Option<Place> {
        let types = self.types();
        let decl = self.program.var(var.uid)?;
        let addr = heap.address_of(self.cvar_of(decl), decl, types);
        let mut place = Place {
            root: heap.value_root(addr)?,
            offset: 0,
            ty: decl.ty,
        };
        for acc in &var.accessors {
            match acc {
                Accessor::Ref => break,
                Accessor::Field(i) => {
                    let field = types.field(place.ty, *i)?;
                    place.offset += field.offset;
                    place.ty = field.ty;
                }
                Accessor::Item(i) => match types.array_elem(place.ty) {
                    Some(elem) => {
                        place.offset += i * types.size_of(elem);
                        place.ty = elem;
                    }
                    None => place = self.deref_place(heap, place, *i)?,
                },
                Accessor::Deref => place = self.deref_place(heap, place, 0)?,
            }
        }
        Some(place)
    }

    fn deref_place(&mut self, heap: &mut SymHeap, place: Place, index: i64) -> Option<Place> {
        let types = self.types();
        let pointee = types.pointee(place.ty)?;
        let obj = self.object(heap, place)?;
        let v = heap.value_of(obj, types);
        if !self.check_deref(heap, v) {
            return None;
        }
        Some(Place {
            root: heap.value_root(v)?,
            offset: heap.value_offset(v) + index * types.size_of(pointee),
            ty: pointee,
        })
    }

    /// Report why `v` cannot be dereferenced; true if it can
    pub(super) fn check_deref(&mut self, heap: &SymHeap, v: ValueId) -> bool {
        let msg = match heap.target_kind(v) {
            TargetKind::OnStack | TargetKind::OnHeap | TargetKind::Static | TargetKind::Abstract => {
                return true;
            }
            TargetKind::Null => "dereference of NULL value",
            TargetKind::Unknown => match heap.origin(v) {
                ValueOrigin::DerefFailed => return false,
                origin if origin.is_uninit() => "dereference of uninitialized value",
                _ => "dereference of unknown value",
            },
            TargetKind::Deleted => "dereference of already deleted heap object",
            TargetKind::Lost => "dereference of non-existing non-heap object",
            TargetKind::Invalid | TargetKind::Custom | TargetKind::Composite => "invalid dereference",
        };
        self.report(FindingKind::InvalidDereference, msg);
        false
    }

    /// Object at `place`; accesses beyond the root are reported
    pub(super) fn object(&mut self, heap: &mut SymHeap, place: Place) -> Option<ObjectId> {
        let obj = heap.object_at(place.root, place.offset, place.ty, self.types());
        if obj.is_none() && heap.is_valid_root(place.root) {
            self.report(FindingKind::InvalidDereference, "dereference out of bounds");
        }
        obj
    }

    pub(super) fn constant(&self, heap: &mut SymHeap, cst: &Constant) -> ValueId {
        match cst {
            Constant::Int(n) => heap.int_value(*n),
            Constant::Bool(b) => heap.bool_value(*b),
            Constant::Null => ValueId::NULL,
            Constant::Str(s) => heap.custom_value(CustomValue::Str(s.clone())),
            Constant::Fnc(id) => heap.custom_value(CustomValue::Fnc(*id)),
        }
    }

    /// Value of an operand
    pub(super) fn read(&mut self, heap: &mut SymHeap, op: &Operand) -> ValueId {
        let var = match op {
            Operand::Void => return ValueId::INVALID,
            Operand::Const(cst) => return self.constant(heap, cst),
            Operand::Var(var) => var,
        };
        let Some(place) = self.place_of(heap, var) else {
            return heap.fresh_unknown(ValueOrigin::DerefFailed);
        };
        if var.accessors.last() == Some(&Accessor::Ref) {
            let base = heap.root_address(place.root);
            return heap.by_offset(base, place.offset);
        }
        match self.object(heap, place) {
            Some(obj) => heap.value_of(obj, self.types()),
            None => heap.fresh_unknown(ValueOrigin::DerefFailed),
        }
    }

    /// Store a scalar; a void destination drops the value
    pub(super) fn write(&mut self, heap: &mut SymHeap, dst: &Operand, v: ValueId) {
        let Operand::Var(var) = dst else {
            self.collect(heap, vec![v]);
            return;
        };
        let Some(place) = self.place_of(heap, var) else {
            return;
        };
        let Some(obj) = self.object(heap, place) else {
            return;
        };
        let killed = heap.set_value(obj, v, self.types());
        self.collect(heap, killed);
    }

    /// Copy every scalar leaf of a composite from `src` to `dst`
    pub(super) fn copy_composite(&mut self, heap: &mut SymHeap, src: Place, dst: Place) {
        let types = self.types();
        let mut killed = Vec::new();
        for (off, ty) in types.scalar_leaves(src.ty) {
            let from = Place {
                offset: src.offset + off,
                ty,
                ..src
            };
            let to = Place {
                offset: dst.offset + off,
                ty,
                ..dst
            };
            let v = match self.object(heap, from) {
                Some(obj) => heap.value_of(obj, types),
                None => heap.fresh_unknown(ValueOrigin::DerefFailed),
            };
            if let Some(obj) = self.object(heap, to) {
                killed.extend(heap.set_value(obj, v, types));
            }
        }
        self.collect(heap, killed);
    }

    pub(super) fn assign_composite(&mut self, heap: &mut SymHeap, dst: &Operand, src: &Operand, ty: TypeId) {
        let (Some(src_var), Some(dst_var)) = (src.var_ref(), dst.var_ref()) else {
            return;
        };
        let Some(from) = self.place_of(heap, src_var) else {
            return;
        };
        let Some(to) = self.place_of(heap, dst_var) else {
            return;
        };
        self.copy_composite(heap, Place { ty, ..from }, Place { ty, ..to });
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Concretization before execution
    // ═══════════════════════════════════════════════════════════════════════

    /// Split `heap` until no dereference of `insn` goes through a segment
    pub fn prepare(&self, heap: SymHeap, insn: &Insn) -> Vec<SymHeap> {
        let mut ready = Vec::new();
        let mut todo = vec![heap];
        while let Some(h) = todo.pop() {
            match self.abstract_target(&h, insn) {
                Some(root) => todo.extend(concretize(h, root, self.types())),
                None => ready.push(h),
            }
        }
        ready
    }

    /// First abstract root an access path of `insn` would enter
    fn abstract_target(&self, heap: &SymHeap, insn: &Insn) -> Option<RootId> {
        for op in insn.operands() {
            if let Some(Walk::Abstract(root)) = op.var_ref().map(|var| self.walk(heap, var)) {
                return Some(root);
            }
        }
        // free() reaches into its argument's target
        if let InsnKind::Call { callee, args, .. } = &insn.kind {
            let frees = self
                .peek_callee(heap, callee)
                .and_then(|id| self.program.function(id))
                .is_some_and(|f| !f.is_defined() && Builtin::from_name(&f.name) == Some(Builtin::Free));
            if frees {
                let var = args.first().and_then(|a| a.var_ref())?;
                let Walk::Reached(place) = self.walk(heap, var) else {
                    return None;
                };
                let v = heap.peek_value_at(place.root, place.offset)?;
                if heap.target_kind(v) == TargetKind::Abstract {
                    return heap.value_root(v);
                }
            }
        }
        None
    }

    /// Function a callee operand denotes, direct or read from a pointer
    fn peek_callee(&self, heap: &SymHeap, callee: &Operand) -> Option<FuncId> {
        let var = match callee {
            Operand::Const(Constant::Fnc(id)) => return Some(*id),
            Operand::Var(var) => var,
            _ => return None,
        };
        let Walk::Reached(place) = self.walk(heap, var) else {
            return None;
        };
        let v = heap.peek_value_at(place.root, place.offset)?;
        match heap.custom_of(v) {
            Some(CustomValue::Fnc(id)) => Some(*id),
            _ => None,
        }
    }

    /// Value of an operand without dereference checks or lazy reads.
    ///
    /// `None` when the operand would need either.
    pub(super) fn peek(&self, heap: &mut SymHeap, op: &Operand) -> Option<ValueId> {
        let var = match op {
            Operand::Void => return None,
            Operand::Const(cst) => return Some(self.constant(heap, cst)),
            Operand::Var(var) => var,
        };
        let Walk::Reached(place) = self.walk(heap, var) else {
            return None;
        };
        if var.accessors.last() == Some(&Accessor::Ref) {
            let base = heap.root_address(place.root);
            return Some(heap.by_offset(base, place.offset));
        }
        heap.peek_value_at(place.root, place.offset)
    }

    /// Follow an accessor chain without side effects
    fn walk(&self, heap: &SymHeap, var: &VarRef) -> Walk {
        let types = self.types();
        let Some(decl) = self.program.var(var.uid) else {
            return Walk::Stuck;
        };
        let Some(root) = heap.var_root(self.cvar_of(decl)) else {
            return Walk::Stuck;
        };
        let mut place = Place {
            root,
            offset: 0,
            ty: decl.ty,
        };
        for acc in &var.accessors {
            let index = match acc {
                Accessor::Ref => break,
                Accessor::Field(i) => {
                    let Some(field) = types.field(place.ty, *i) else {
                        return Walk::Stuck;
                    };
                    place.offset += field.offset;
                    place.ty = field.ty;
                    continue;
                }
                Accessor::Item(i) => match types.array_elem(place.ty) {
                    Some(elem) => {
                        place.offset += i * types.size_of(elem);
                        place.ty = elem;
                        continue;
                    }
                    None => *i,
                },
                Accessor::Deref => 0,
            };
            let (Some(pointee), Some(v)) = (
                types.pointee(place.ty),
                heap.peek_value_at(place.root, place.offset),
            ) else {
                return Walk::Stuck;
            };
            match heap.target_kind(v) {
                TargetKind::Abstract => {
                    return heap.value_root(v).map_or(Walk::Stuck, Walk::Abstract);
                }
                kind if kind.is_valid_target() => {}
                _ => return Walk::Stuck,
            }
            let Some(target) = heap.value_root(v) else {
                return Walk::Stuck;
            };
            place = Place {
                root: target,
                offset: heap.value_offset(v) + index * types.size_of(pointee),
                ty: pointee,
            };
        }
        Walk::Reached(place)
    }
}

/// Outcome of a side-effect free accessor walk
enum Walk {
    Reached(Place),
    Abstract(RootId),
    Stuck,
}
