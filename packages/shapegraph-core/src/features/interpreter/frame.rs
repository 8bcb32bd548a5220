//! Stack frames: argument binding, return values and scope exit

use super::interpreter::{Interpreter, PendingCall};
use super::operands::Place;
use crate::features::call_cache::CallPath;
use crate::features::program_model::{Function, Operand};
use crate::features::symbolic_heap::{CVar, SymHeap, ValueId, ValueOrigin};

/// An argument evaluated in the caller
enum ArgValue {
    Scalar(ValueId),
    Composite(Place),
    Missing,
}

impl<'a> Interpreter<'a> {
    /// Bind the arguments of a call to `fnc` in a new frame of the callee
    pub(super) fn enter_call(
        &mut self,
        mut heap: SymHeap,
        fnc: &Function,
        dst: &Operand,
        args: &[Operand],
    ) -> PendingCall {
        let types = self.types();
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let composite = self.type_of(arg).filter(|ty| types.is_composite(*ty));
            let value = match (composite, arg.var_ref()) {
                (Some(ty), Some(var)) => match self.place_of(&mut heap, var) {
                    Some(place) => ArgValue::Composite(Place { ty, ..place }),
                    None => ArgValue::Missing,
                },
                _ => ArgValue::Scalar(self.read(&mut heap, arg)),
            };
            values.push(value);
        }

        let path = self.path.push(fnc.id, self.loc.clone());
        let level = path.nest_level();
        let mut values = values.into_iter();
        for uid in &fnc.args {
            let value = values.next().unwrap_or(ArgValue::Missing);
            let Some(decl) = self.program.var(*uid) else {
                continue;
            };
            let addr = heap.address_of(CVar::new(*uid, level), decl, types);
            let Some(root) = heap.value_root(addr) else {
                continue;
            };
            let param = Place {
                root,
                offset: 0,
                ty: decl.ty,
            };
            match value {
                ArgValue::Composite(src) => self.copy_composite(&mut heap, src, param),
                ArgValue::Scalar(v) => {
                    if let Some(obj) = heap.object_at(root, 0, decl.ty, types) {
                        heap.set_value(obj, v, types);
                    }
                }
                // too few arguments: the parameter stays uninitialized
                ArgValue::Missing => {}
            }
        }
        tracing::trace!(callee = %fnc.name, depth = path.depth(), "call entered");

        PendingCall {
            heap,
            callee: fnc.id,
            dst: dst.clone(),
            path,
            loc: self.loc.clone(),
        }
    }

    /// Move the callee's return value into `dst` and drop the return slot
    pub fn finish_call(&mut self, heap: &mut SymHeap, dst: &Operand, callee: &Function) {
        let types = self.types();
        let Some(ret) = heap.return_root() else {
            self.write_unknown(heap, dst);
            return;
        };
        if !dst.is_void() {
            if types.is_composite(callee.ret_ty) {
                let target = dst.var_ref().and_then(|var| self.place_of(heap, var));
                if let Some(to) = target {
                    let from = Place {
                        root: ret,
                        offset: 0,
                        ty: callee.ret_ty,
                    };
                    self.copy_composite(heap, from, Place { ty: callee.ret_ty, ..to });
                }
            } else {
                let v = match heap.object_at(ret, 0, callee.ret_ty, types) {
                    Some(obj) => heap.value_of(obj, types),
                    None => heap.fresh_unknown(ValueOrigin::Unknown),
                };
                self.write(heap, dst, v);
            }
        }
        let killed = heap.destroy_root(ret);
        self.collect(heap, killed);
    }

    /// Return from a call that was not analyzed: its frame goes away and
    /// the result is unknown
    pub fn skip_call(
        &mut self,
        heap: &mut SymHeap,
        callee: &Function,
        callee_path: &CallPath,
        dst: &Operand,
    ) {
        let killed = destroy_frame(heap, callee, callee_path.nest_level());
        self.collect(heap, killed);
        if let Some(ret) = heap.return_root() {
            let killed = heap.destroy_root(ret);
            self.collect(heap, killed);
        }
        self.write_unknown(heap, dst);
    }

    pub(super) fn exec_ret(&mut self, heap: &mut SymHeap, value: &Operand) {
        let types = self.types();
        let ret_ty = self.fnc.ret_ty;
        if !value.is_void() && types.size_of(ret_ty) > 0 {
            if types.is_composite(ret_ty) {
                let src = value.var_ref().and_then(|var| self.place_of(heap, var));
                let slot = heap.return_object(ret_ty, types);
                if let (Some(src), Some(_), Some(root)) = (src, slot, heap.return_root()) {
                    let to = Place {
                        root,
                        offset: 0,
                        ty: ret_ty,
                    };
                    self.copy_composite(heap, Place { ty: ret_ty, ..src }, to);
                }
            } else {
                let v = self.read(heap, value);
                if let Some(obj) = heap.return_object(ret_ty, types) {
                    heap.set_value(obj, v, types);
                }
            }
        }
        self.leave_scope(heap);
    }

    /// Destroy the current frame and collect what it kept alive
    pub fn leave_scope(&mut self, heap: &mut SymHeap) {
        let killed = destroy_frame(heap, self.fnc, self.path.nest_level());
        self.collect(heap, killed);
    }

    /// Frame of an analysis root: arguments hold unknown values
    pub fn bind_unknown_args(&mut self, heap: &mut SymHeap) {
        let types = self.types();
        let level = self.path.nest_level();
        for uid in &self.fnc.args {
            let Some(decl) = self.program.var(*uid) else {
                continue;
            };
            let addr = heap.address_of(CVar::new(*uid, level), decl, types);
            let Some(root) = heap.value_root(addr) else {
                continue;
            };
            for (off, ty) in types.scalar_leaves(decl.ty) {
                let Some(obj) = heap.object_at(root, off, ty, types) else {
                    continue;
                };
                let v = heap.fresh_unknown(ValueOrigin::Unknown);
                heap.set_value(obj, v, types);
            }
        }
    }

    /// Drop the return slot left by an analysis root
    pub fn discard_return(&mut self, heap: &mut SymHeap) {
        if let Some(ret) = heap.return_root() {
            let killed = heap.destroy_root(ret);
            self.collect(heap, killed);
        }
    }
}

fn destroy_frame(heap: &mut SymHeap, fnc: &Function, level: u32) -> Vec<ValueId> {
    let mut killed = Vec::new();
    for uid in fnc.frame_vars() {
        if let Some(root) = heap.var_root(CVar::new(uid, level)) {
            killed.extend(heap.destroy_root(root));
        }
    }
    killed
}
