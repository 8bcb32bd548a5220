//! One-instruction execution step

use super::builtins::Builtin;
use super::compare;
use crate::config::AnalysisConfig;
use crate::features::call_cache::CallPath;
use crate::features::diagnostics::{Finding, FindingKind, Reporter};
use crate::features::garbage_collector::collect_junk;
use crate::features::program_model::{
    Block, BlockId, Constant, FuncId, Function, InsnKind, Operand, Program, TypeTable, UnOp,
};
use crate::features::symbolic_heap::{CustomValue, SymHeap, ValueId, ValueOrigin};
use crate::shared::models::Location;

/// What happened to one input heap
#[derive(Debug)]
pub enum StepResult {
    /// Heaps to continue with at the next instruction of the block
    Next(Vec<SymHeap>),
    /// Terminal instruction: heaps per successor block
    Jump(Vec<(BlockId, SymHeap)>),
    /// The function returned; its frame is already destroyed
    Return(SymHeap),
    /// The path ends here
    Stop,
    /// Call of a defined function, to be summarized by the caller
    Call(PendingCall),
}

/// A call whose arguments are bound in the callee's frame
#[derive(Debug)]
pub struct PendingCall {
    pub heap: SymHeap,
    pub callee: FuncId,
    pub dst: Operand,
    /// Path of the callee frame
    pub path: CallPath,
    pub loc: Location,
}

/// Executes instructions of one function activation.
///
/// Created per step by the scheduler; all findings go to the borrowed
/// reporter with the activation's backtrace attached.
pub struct Interpreter<'a> {
    pub(super) program: &'a Program,
    pub(super) config: &'a AnalysisConfig,
    pub(super) fnc: &'a Function,
    pub(super) path: &'a CallPath,
    reporter: &'a mut Reporter,
    pub(super) loc: Location,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        program: &'a Program,
        config: &'a AnalysisConfig,
        fnc: &'a Function,
        path: &'a CallPath,
        reporter: &'a mut Reporter,
    ) -> Self {
        Self {
            program,
            config,
            fnc,
            path,
            reporter,
            loc: fnc.loc.clone(),
        }
    }

    pub(super) fn types(&self) -> &'a TypeTable {
        &self.program.types
    }

    pub fn set_location(&mut self, loc: &Location) {
        self.loc = loc.clone();
    }

    pub fn report(&mut self, kind: FindingKind, message: impl Into<String>) {
        let finding = Finding::new(kind, self.loc.clone(), message)
            .with_backtrace(self.path.backtrace(self.program));
        self.reporter.report(finding);
    }

    /// Garbage-collect after a destructive step; any collected root is a leak
    pub(super) fn collect(&mut self, heap: &mut SymHeap, killed: Vec<ValueId>) {
        if killed.is_empty() {
            return;
        }
        let leaked = collect_junk(heap, killed);
        if !leaked.is_empty() {
            tracing::trace!(roots = leaked.len(), loc = %self.loc, "leaked roots destroyed");
            self.report(FindingKind::MemoryLeak, "memory leak detected");
        }
    }

    /// Execute instruction `idx` of `block` against a prepared heap
    pub fn exec(&mut self, heap: SymHeap, block: &Block, idx: usize) -> StepResult {
        let Some(insn) = block.insns.get(idx) else {
            return StepResult::Stop;
        };
        self.loc = insn.loc.clone();
        tracing::trace!(loc = %self.loc, insn = ?insn.kind, "exec");

        let mut heap = heap;
        match &insn.kind {
            InsnKind::Unop { op, dst, src } => {
                self.exec_unop(&mut heap, *op, dst, src);
                StepResult::Next(vec![heap])
            }
            InsnKind::Binop { op, dst, lhs, rhs } => {
                let a = self.read(&mut heap, lhs);
                let b = self.read(&mut heap, rhs);
                let v = compare::binop(&mut heap, *op, a, b);
                self.write(&mut heap, dst, v);
                StepResult::Next(vec![heap])
            }
            InsnKind::Call { dst, callee, args } => self.exec_call(heap, dst, callee, args),
            InsnKind::Jmp { target } => StepResult::Jump(vec![(*target, heap)]),
            InsnKind::Cond {
                cond,
                then_target,
                else_target,
            } => {
                let producer = idx.checked_sub(1).and_then(|i| block.insns.get(i));
                let out = self.exec_cond(heap, cond, *then_target, *else_target, producer);
                StepResult::Jump(out)
            }
            InsnKind::Switch {
                value,
                cases,
                default,
            } => StepResult::Jump(self.exec_switch(heap, value, cases, *default)),
            InsnKind::Ret { value } => {
                self.exec_ret(&mut heap, value);
                StepResult::Return(heap)
            }
            InsnKind::Abort => StepResult::Stop,
        }
    }

    fn exec_unop(&mut self, heap: &mut SymHeap, op: UnOp, dst: &Operand, src: &Operand) {
        if op == UnOp::Assign {
            if let Some(ty) = self.type_of(src).filter(|ty| self.types().is_composite(*ty)) {
                self.assign_composite(heap, dst, src, ty);
                return;
            }
        }
        let v = self.read(heap, src);
        let v = compare::unop(heap, op, v);
        self.write(heap, dst, v);
    }

    fn exec_call(
        &mut self,
        mut heap: SymHeap,
        dst: &Operand,
        callee: &Operand,
        args: &[Operand],
    ) -> StepResult {
        let Some(target) = self.resolve_callee(&mut heap, callee) else {
            self.report(FindingKind::UndefinedFunction, "ignoring call of undefined function");
            self.discard_args(&mut heap, args);
            self.write_unknown(&mut heap, dst);
            return StepResult::Next(vec![heap]);
        };
        let Some(fnc) = self.program.function(target) else {
            return StepResult::Stop;
        };

        if let Some(builtin) = Builtin::from_name(&fnc.name).filter(|_| !fnc.is_defined()) {
            return self.exec_builtin(heap, builtin, dst, args);
        }
        if !fnc.is_defined() {
            self.report(FindingKind::UndefinedFunction, "ignoring call of undefined function");
            self.discard_args(&mut heap, args);
            self.write_unknown(&mut heap, dst);
            return StepResult::Next(vec![heap]);
        }
        StepResult::Call(self.enter_call(heap, fnc, dst, args))
    }

    /// Function a callee operand denotes, if known
    fn resolve_callee(&mut self, heap: &mut SymHeap, callee: &Operand) -> Option<FuncId> {
        if let Operand::Const(Constant::Fnc(id)) = callee {
            return Some(*id);
        }
        let v = self.read(heap, callee);
        match heap.custom_of(v) {
            Some(CustomValue::Fnc(id)) => Some(*id),
            _ => None,
        }
    }

    /// Evaluate arguments for their dereference checks only
    pub(super) fn discard_args(&mut self, heap: &mut SymHeap, args: &[Operand]) {
        for arg in args {
            self.read(heap, arg);
        }
    }

    pub(super) fn write_unknown(&mut self, heap: &mut SymHeap, dst: &Operand) {
        if dst.is_void() {
            return;
        }
        let v = heap.fresh_unknown(ValueOrigin::Unknown);
        self.write(heap, dst, v);
    }
}
