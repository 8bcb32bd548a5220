//! Control-flow IR consumed by the engine
//!
//! A [`Program`] is a set of functions, each an ordered list of basic blocks.
//! Every block is a run of non-terminal instructions closed by exactly one
//! terminal (`Jmp`, `Cond`, `Switch`, `Ret`, `Abort`). Operands are constants
//! or variables followed by an accessor chain.

use super::types::{TypeId, TypeTable};
use crate::shared::models::Location;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarUid(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FuncId(pub u32);

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

/// Index of a block inside its function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarScope {
    Global,
    Local,
    Arg(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub uid: VarUid,
    pub name: String,
    pub ty: TypeId,
    pub scope: VarScope,
    pub loc: Location,
}

impl VarDecl {
    pub fn is_global(&self) -> bool {
        self.scope == VarScope::Global
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Operands
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constant {
    Int(i64),
    Bool(bool),
    Null,
    Str(String),
    Fnc(FuncId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Accessor {
    /// `*x`
    Deref,
    /// `x.field` (index into the struct's field list)
    Field(usize),
    /// `x[i]` with a constant index
    Item(i64),
    /// `&x`, only valid as the last accessor
    Ref,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarRef {
    pub uid: VarUid,
    pub accessors: Vec<Accessor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    Void,
    Const(Constant),
    Var(VarRef),
}

impl Operand {
    pub fn var(uid: VarUid) -> Self {
        Operand::Var(VarRef {
            uid,
            accessors: Vec::new(),
        })
    }

    pub fn int(value: i64) -> Self {
        Operand::Const(Constant::Int(value))
    }

    pub fn bool(value: bool) -> Self {
        Operand::Const(Constant::Bool(value))
    }

    pub fn null() -> Self {
        Operand::Const(Constant::Null)
    }

    pub fn fnc(id: FuncId) -> Self {
        Operand::Const(Constant::Fnc(id))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Operand::Const(Constant::Str(s.into()))
    }

    fn with(mut self, acc: Accessor) -> Self {
        if let Operand::Var(ref mut var) = self {
            var.accessors.push(acc);
        }
        self
    }

    pub fn deref(self) -> Self {
        self.with(Accessor::Deref)
    }

    pub fn field(self, idx: usize) -> Self {
        self.with(Accessor::Field(idx))
    }

    pub fn item(self, idx: i64) -> Self {
        self.with(Accessor::Item(idx))
    }

    pub fn addr(self) -> Self {
        self.with(Accessor::Ref)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Operand::Void)
    }

    pub fn var_ref(&self) -> Option<&VarRef> {
        match self {
            Operand::Var(var) => Some(var),
            _ => None,
        }
    }

    /// Number of dereferences along the accessor chain
    pub fn deref_count(&self) -> usize {
        self.var_ref()
            .map(|v| v.accessors.iter().filter(|a| **a == Accessor::Deref).count())
            .unwrap_or(0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Instructions
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    Assign,
    TruthNot,
    BitNot,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Mult,
    /// pointer + byte offset
    PointerPlus,
    TruthAnd,
    TruthOr,
    BitAnd,
    BitOr,
}

impl BinOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InsnKind {
    Unop {
        op: UnOp,
        dst: Operand,
        src: Operand,
    },
    Binop {
        op: BinOp,
        dst: Operand,
        lhs: Operand,
        rhs: Operand,
    },
    Call {
        dst: Operand,
        callee: Operand,
        args: Vec<Operand>,
    },
    Jmp {
        target: BlockId,
    },
    Cond {
        cond: Operand,
        then_target: BlockId,
        else_target: BlockId,
    },
    Switch {
        value: Operand,
        cases: Vec<(i64, BlockId)>,
        default: BlockId,
    },
    Ret {
        value: Operand,
    },
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insn {
    pub kind: InsnKind,
    pub loc: Location,
}

impl Insn {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            InsnKind::Jmp { .. }
                | InsnKind::Cond { .. }
                | InsnKind::Switch { .. }
                | InsnKind::Ret { .. }
                | InsnKind::Abort
        )
    }

    /// Successor blocks of a terminal instruction (empty otherwise)
    pub fn successors(&self) -> Vec<BlockId> {
        match &self.kind {
            InsnKind::Jmp { target } => vec![*target],
            InsnKind::Cond {
                then_target,
                else_target,
                ..
            } => vec![*then_target, *else_target],
            InsnKind::Switch { cases, default, .. } => {
                let mut out: Vec<BlockId> = cases.iter().map(|(_, b)| *b).collect();
                out.push(*default);
                out
            }
            _ => Vec::new(),
        }
    }

    /// Every operand the instruction reads or writes
    pub fn operands(&self) -> Vec<&Operand> {
        match &self.kind {
            InsnKind::Unop { dst, src, .. } => vec![dst, src],
            InsnKind::Binop { dst, lhs, rhs, .. } => vec![dst, lhs, rhs],
            InsnKind::Call { dst, callee, args } => {
                let mut out = vec![dst, callee];
                out.extend(args.iter());
                out
            }
            InsnKind::Cond { cond, .. } => vec![cond],
            InsnKind::Switch { value, .. } => vec![value],
            InsnKind::Ret { value } => vec![value],
            InsnKind::Jmp { .. } | InsnKind::Abort => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub name: String,
    pub insns: Vec<Insn>,
}

impl Block {
    pub fn terminal(&self) -> Option<&Insn> {
        self.insns.last().filter(|i| i.is_terminal())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub id: FuncId,
    pub name: String,
    pub ret_ty: TypeId,
    pub args: Vec<VarUid>,
    pub locals: Vec<VarUid>,
    pub blocks: Vec<Block>,
    pub loc: Location,
}

impl Function {
    /// External functions have no body
    pub fn is_defined(&self) -> bool {
        !self.blocks.is_empty()
    }

    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.0 as usize)
    }

    /// Arguments first, then locals
    pub fn frame_vars(&self) -> impl Iterator<Item = VarUid> + '_ {
        self.args.iter().chain(self.locals.iter()).copied()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Program
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Program {
    pub types: TypeTable,
    pub(super) vars: Vec<VarDecl>,
    pub(super) functions: Vec<Function>,
    pub(super) by_name: FxHashMap<String, FuncId>,
}

impl Program {
    #[cfg(test)]
    pub(crate) fn function_mut(&mut self, id: FuncId) -> Option<&mut Function> {
        self.functions.get_mut(id.0 as usize)
    }

    pub fn var(&self, uid: VarUid) -> Option<&VarDecl> {
        self.vars.get(uid.0 as usize)
    }

    pub fn vars(&self) -> &[VarDecl] {
        &self.vars
    }

    pub fn globals(&self) -> impl Iterator<Item = &VarDecl> + '_ {
        self.vars.iter().filter(|v| v.is_global())
    }

    pub fn function(&self, id: FuncId) -> Option<&Function> {
        self.functions.get(id.0 as usize)
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.by_name.get(name).and_then(|id| self.function(*id))
    }

    pub fn function_name(&self, id: FuncId) -> &str {
        self.function(id).map(|f| f.name.as_str()).unwrap_or("<unknown>")
    }
}
