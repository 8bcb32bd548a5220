//! Program model consumed by the engine
//!
//! Front-ends translate source code into this IR; the engine itself never
//! parses anything. Tests and embedders build programs with
//! [`ProgramBuilder`].

pub mod analysis;
pub mod builder;
pub mod program;
pub mod types;

pub use analysis::ProgramAnalysis;
pub use builder::{FunctionBuilder, ProgramBuilder};
pub use program::{
    Accessor, BinOp, Block, BlockId, Constant, FuncId, Function, Insn, InsnKind, Operand, Program,
    UnOp, VarDecl, VarRef, VarScope, VarUid,
};
pub use types::{StructField, TypeId, TypeInfo, TypeKind, TypeTable, PTR_SIZE};
