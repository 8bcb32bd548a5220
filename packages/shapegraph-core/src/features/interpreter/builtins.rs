//! Allocator and verifier built-ins
//!
//! External functions the engine models itself. A function with one of
//! these names and no body in the program is dispatched here.

use super::interpreter::{Interpreter, StepResult};
use crate::features::diagnostics::FindingKind;
use crate::features::program_model::Operand;
use crate::features::symbolic_heap::{SymHeap, TargetKind, ValueId, ValueOrigin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Malloc,
    Calloc,
    Free,
    Abort,
    /// Any value the caller's type allows
    Nondet,
    /// Debugger hook without effect on the heap
    Break,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "malloc" => Some(Builtin::Malloc),
            "calloc" => Some(Builtin::Calloc),
            "free" => Some(Builtin::Free),
            "abort" => Some(Builtin::Abort),
            "___sl_get_nondet_int" => Some(Builtin::Nondet),
            "___sl_break" => Some(Builtin::Break),
            _ if name.starts_with("__VERIFIER_nondet_") => Some(Builtin::Nondet),
            _ => None,
        }
    }
}

impl<'a> Interpreter<'a> {
    pub(super) fn exec_builtin(
        &mut self,
        heap: SymHeap,
        builtin: Builtin,
        dst: &Operand,
        args: &[Operand],
    ) -> StepResult {
        let mut heap = heap;
        match builtin {
            Builtin::Malloc | Builtin::Calloc => {
                return StepResult::Next(self.exec_alloc(heap, builtin == Builtin::Calloc, dst, args));
            }
            Builtin::Free => {
                if let Some(arg) = args.first() {
                    let v = self.read(&mut heap, arg);
                    self.exec_free(&mut heap, v);
                }
                self.write_unknown(&mut heap, dst);
            }
            Builtin::Abort => return StepResult::Stop,
            Builtin::Nondet => {
                self.discard_args(&mut heap, args);
                self.write_unknown(&mut heap, dst);
            }
            Builtin::Break => {
                tracing::debug!(loc = %self.loc, "breakpoint reached");
                self.discard_args(&mut heap, args);
            }
        }
        StepResult::Next(vec![heap])
    }

    /// Byte count requested by the arguments, if constant
    fn alloc_size(&mut self, heap: &mut SymHeap, zeroed: bool, args: &[Operand]) -> Option<i64> {
        let mut size = 1i64;
        let wanted = if zeroed { 2 } else { 1 };
        if args.len() < wanted {
            return None;
        }
        for arg in &args[..wanted] {
            let v = self.read(heap, arg);
            size = size.checked_mul(heap.int_of(v)?)?;
        }
        (size >= 0).then_some(size)
    }

    fn exec_alloc(
        &mut self,
        mut heap: SymHeap,
        zeroed: bool,
        dst: &Operand,
        args: &[Operand],
    ) -> Vec<SymHeap> {
        let types = self.types();
        let pointee = self
            .type_of(dst)
            .and_then(|ty| types.pointee(ty))
            .filter(|ty| types.size_of(*ty) > 0);

        let size = match self.alloc_size(&mut heap, zeroed, args) {
            Some(size) => size,
            None => {
                self.report(
                    FindingKind::AnalysisLimit,
                    "size of allocation is not a known constant",
                );
                pointee.map(|ty| types.size_of(ty)).unwrap_or(1)
            }
        };
        // the root only takes the pointee's shape when it fits
        let ty = pointee.filter(|ty| types.size_of(*ty) <= size);

        let mut out = Vec::with_capacity(2);
        if self.config.execution.oom_simulation {
            let mut failed = heap.clone();
            self.write(&mut failed, dst, ValueId::NULL);
            out.push(failed);
        }
        let addr = heap.allocate(size, zeroed, ty);
        tracing::trace!(size, zeroed, loc = %self.loc, "allocation");
        self.write(&mut heap, dst, addr);
        out.insert(0, heap);
        out
    }

    fn exec_free(&mut self, heap: &mut SymHeap, v: ValueId) {
        let (kind, msg) = match heap.target_kind(v) {
            TargetKind::Null => return,
            TargetKind::Unknown => match heap.origin(v) {
                ValueOrigin::DerefFailed => return,
                origin if origin.is_uninit() => (
                    FindingKind::InvalidDereference,
                    "free() called on uninitialized value",
                ),
                _ => {
                    tracing::debug!(loc = %self.loc, "ignoring free() called on unknown value");
                    return;
                }
            },
            TargetKind::Deleted => (FindingKind::DoubleFree, "double free() detected"),
            TargetKind::Lost => (
                FindingKind::FreeNonHeap,
                "attempt to free a non-heap object, which does not exist anyhow",
            ),
            TargetKind::OnHeap | TargetKind::Abstract => match heap.destroy_target(v) {
                Some(killed) => {
                    self.collect(heap, killed);
                    return;
                }
                None => (FindingKind::FreeWithOffset, "free() called with offset"),
            },
            TargetKind::OnStack
            | TargetKind::Static
            | TargetKind::Custom
            | TargetKind::Composite
            | TargetKind::Invalid => (FindingKind::FreeNonHeap, "attempt to free a non-heap object"),
        };
        self.report(kind, msg);
    }
}
