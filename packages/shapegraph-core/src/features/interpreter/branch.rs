//! Conditional jumps
//!
//! A branch the heap cannot decide forks. Each successor is refined by the
//! assumption its edge implies; refinements that leave no concrete state
//! drop the successor.

use super::compare::{self, assume_eq, assume_neq};
use super::interpreter::Interpreter;
use crate::features::diagnostics::FindingKind;
use crate::features::program_model::{BinOp, BlockId, Insn, InsnKind, Operand};
use crate::features::symbolic_heap::{SymHeap, ValueId, ValueOrigin};

/// How a condition value is tested against zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CondShape {
    Pointer,
    Bool,
    Int,
}

/// Equality the branch condition was computed from
struct Comparison<'i> {
    eq: bool,
    lhs: &'i Operand,
    rhs: &'i Operand,
}

impl<'a> Interpreter<'a> {
    fn warn_uninit_branch(&mut self, heap: &SymHeap, v: ValueId) {
        match heap.origin(v) {
            ValueOrigin::DerefFailed => {}
            origin if origin.is_uninit() => self.report(
                FindingKind::UninitializedCondition,
                "conditional jump depends on uninitialized value",
            ),
            _ => {}
        }
    }

    pub(super) fn exec_cond(
        &mut self,
        heap: SymHeap,
        cond: &Operand,
        then_target: BlockId,
        else_target: BlockId,
        producer: Option<&Insn>,
    ) -> Vec<(BlockId, SymHeap)> {
        let mut heap = heap;
        let v = self.read(&mut heap, cond);
        if let Some(taken) = compare::truth(&heap, v) {
            let target = if taken { then_target } else { else_target };
            return vec![(target, heap)];
        }
        self.warn_uninit_branch(&heap, v);

        let comparison = producer.and_then(|insn| match &insn.kind {
            InsnKind::Binop {
                op: op @ (BinOp::Eq | BinOp::Ne),
                dst,
                lhs,
                rhs,
            } if dst == cond => Some(Comparison {
                eq: *op == BinOp::Eq,
                lhs,
                rhs,
            }),
            _ => None,
        });
        let shape = if self.is_pointer_operand(cond) {
            CondShape::Pointer
        } else if self.type_of(cond).is_some_and(|t| self.types().is_bool(t)) {
            CondShape::Bool
        } else {
            CondShape::Int
        };

        let mut out = Vec::with_capacity(2);
        for (taken, target) in [(true, then_target), (false, else_target)] {
            let mut branch = heap.clone();
            if self.refine(&mut branch, v, taken, comparison.as_ref(), shape) {
                out.push((target, branch));
            } else {
                tracing::trace!(loc = %self.loc, taken, "infeasible branch dropped");
            }
        }
        out
    }

    /// Apply what taking one edge implies; false if the edge is infeasible
    fn refine(
        &self,
        heap: &mut SymHeap,
        v: ValueId,
        taken: bool,
        comparison: Option<&Comparison<'_>>,
        shape: CondShape,
    ) -> bool {
        let types = self.types();
        let ok = match shape {
            CondShape::Pointer if taken => assume_neq(heap, v, ValueId::NULL),
            CondShape::Pointer => assume_eq(heap, v, ValueId::NULL, types),
            CondShape::Bool if heap.is_unknown(v) => {
                let known = heap.bool_value(taken);
                heap.replace(v, known)
            }
            CondShape::Bool => true,
            // a nonzero integer is any value but 0
            CondShape::Int if taken => {
                let zero = heap.int_value(0);
                assume_neq(heap, v, zero)
            }
            CondShape::Int => {
                let zero = heap.int_value(0);
                assume_eq(heap, v, zero, types)
            }
        };
        if !ok {
            return false;
        }

        let Some(cmp) = comparison else {
            return true;
        };
        let (Some(a), Some(b)) = (self.peek(heap, cmp.lhs), self.peek(heap, cmp.rhs)) else {
            return true;
        };
        let interesting = self.is_pointer_operand(cmp.lhs)
            || self.is_pointer_operand(cmp.rhs)
            || [a, b]
                .iter()
                .any(|x| heap.is_address(*x) || *x == ValueId::NULL || heap.has_preds(*x));
        if !interesting {
            return true;
        }
        if taken == cmp.eq {
            assume_eq(heap, a, b, types)
        } else {
            assume_neq(heap, a, b)
        }
    }

    pub(super) fn exec_switch(
        &mut self,
        heap: SymHeap,
        value: &Operand,
        cases: &[(i64, BlockId)],
        default: BlockId,
    ) -> Vec<(BlockId, SymHeap)> {
        let mut heap = heap;
        let v = self.read(&mut heap, value);
        if let Some(n) = heap.int_of(v) {
            let target = cases
                .iter()
                .find(|(c, _)| *c == n)
                .map(|(_, b)| *b)
                .unwrap_or(default);
            return vec![(target, heap)];
        }
        self.warn_uninit_branch(&heap, v);

        let types = self.types();
        let mut out = Vec::with_capacity(cases.len() + 1);
        for (case, target) in cases {
            let mut branch = heap.clone();
            let c = branch.int_value(*case);
            if assume_eq(&mut branch, v, c, types) {
                out.push((*target, branch));
            }
        }
        let mut rest = heap;
        let mut feasible = true;
        for (case, _) in cases {
            let c = rest.int_value(*case);
            feasible &= assume_neq(&mut rest, v, c);
        }
        if feasible {
            out.push((default, rest));
        }
        out
    }
}
