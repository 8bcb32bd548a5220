//! Program builders
//!
//! ```rust,ignore
//! let mut pb = ProgramBuilder::new("list.c");
//! let int = pb.types().int(4);
//! let main = pb.declare_function("main", int);
//! let mut fb = pb.define(main);
//! let entry = fb.block("entry");
//! fb.ret(entry, Operand::int(0));
//! fb.finish();
//! let program = pb.build()?;
//! ```
//!
//! Instructions get consecutive line numbers unless `at(line)` pins one.

use super::program::*;
use super::types::{TypeId, TypeTable};
use crate::shared::models::{EngineError, EngineResult, Location};
use rustc_hash::FxHashMap;

pub struct ProgramBuilder {
    file: String,
    types: TypeTable,
    vars: Vec<VarDecl>,
    functions: Vec<Function>,
    by_name: FxHashMap<String, FuncId>,
    next_line: u32,
}

impl ProgramBuilder {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            types: TypeTable::new(),
            vars: Vec::new(),
            functions: Vec::new(),
            by_name: FxHashMap::default(),
            next_line: 1,
        }
    }

    /// The interning context shared by everything this builder creates
    pub fn types(&mut self) -> &mut TypeTable {
        &mut self.types
    }

    fn location(&mut self) -> Location {
        let loc = Location::new(self.file.clone(), self.next_line);
        self.next_line += 1;
        loc
    }

    fn add_var(&mut self, name: &str, ty: TypeId, scope: VarScope) -> VarUid {
        let uid = VarUid(self.vars.len() as u32);
        let loc = self.location();
        self.vars.push(VarDecl {
            uid,
            name: name.to_string(),
            ty,
            scope,
            loc,
        });
        uid
    }

    pub fn global(&mut self, name: &str, ty: TypeId) -> VarUid {
        self.add_var(name, ty, VarScope::Global)
    }

    /// Declare a function; a function never given a body stays external
    pub fn declare_function(&mut self, name: &str, ret_ty: TypeId) -> FuncId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let id = FuncId(self.functions.len() as u32);
        let loc = self.location();
        self.functions.push(Function {
            id,
            name: name.to_string(),
            ret_ty,
            args: Vec::new(),
            locals: Vec::new(),
            blocks: Vec::new(),
            loc,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn define(&mut self, id: FuncId) -> FunctionBuilder<'_> {
        FunctionBuilder {
            pb: self,
            id,
            args: Vec::new(),
            locals: Vec::new(),
            blocks: Vec::new(),
            pinned_line: None,
        }
    }

    pub fn build(self) -> EngineResult<Program> {
        let program = Program {
            types: self.types,
            vars: self.vars,
            functions: self.functions,
            by_name: self.by_name,
        };
        for fnc in program.functions() {
            validate_function(&program, fnc)?;
        }
        Ok(program)
    }
}

pub struct FunctionBuilder<'a> {
    pb: &'a mut ProgramBuilder,
    id: FuncId,
    args: Vec<VarUid>,
    locals: Vec<VarUid>,
    blocks: Vec<Block>,
    pinned_line: Option<u32>,
}

impl<'a> FunctionBuilder<'a> {
    pub fn types(&mut self) -> &mut TypeTable {
        &mut self.pb.types
    }

    pub fn arg(&mut self, name: &str, ty: TypeId) -> VarUid {
        let uid = self.pb.add_var(name, ty, VarScope::Arg(self.args.len()));
        self.args.push(uid);
        uid
    }

    pub fn local(&mut self, name: &str, ty: TypeId) -> VarUid {
        let uid = self.pb.add_var(name, ty, VarScope::Local);
        self.locals.push(uid);
        uid
    }

    /// Append an empty block; the first block is the entry
    pub fn block(&mut self, name: &str) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            id,
            name: name.to_string(),
            insns: Vec::new(),
        });
        id
    }

    /// Pin the line of the next instruction
    pub fn at(&mut self, line: u32) -> &mut Self {
        self.pinned_line = Some(line);
        self
    }

    pub fn push(&mut self, block: BlockId, kind: InsnKind) -> &mut Self {
        let loc = match self.pinned_line.take() {
            Some(line) => Location::new(self.pb.file.clone(), line),
            None => self.pb.location(),
        };
        if let Some(bb) = self.blocks.get_mut(block.0 as usize) {
            bb.insns.push(Insn { kind, loc });
        }
        self
    }

    pub fn assign(&mut self, block: BlockId, dst: Operand, src: Operand) -> &mut Self {
        self.push(
            block,
            InsnKind::Unop {
                op: UnOp::Assign,
                dst,
                src,
            },
        )
    }

    pub fn unop(&mut self, block: BlockId, op: UnOp, dst: Operand, src: Operand) -> &mut Self {
        self.push(block, InsnKind::Unop { op, dst, src })
    }

    pub fn binop(
        &mut self,
        block: BlockId,
        op: BinOp,
        dst: Operand,
        lhs: Operand,
        rhs: Operand,
    ) -> &mut Self {
        self.push(block, InsnKind::Binop { op, dst, lhs, rhs })
    }

    pub fn call(
        &mut self,
        block: BlockId,
        dst: Operand,
        callee: FuncId,
        args: Vec<Operand>,
    ) -> &mut Self {
        self.push(
            block,
            InsnKind::Call {
                dst,
                callee: Operand::fnc(callee),
                args,
            },
        )
    }

    pub fn jmp(&mut self, block: BlockId, target: BlockId) -> &mut Self {
        self.push(block, InsnKind::Jmp { target })
    }

    pub fn cond(
        &mut self,
        block: BlockId,
        cond: Operand,
        then_target: BlockId,
        else_target: BlockId,
    ) -> &mut Self {
        self.push(
            block,
            InsnKind::Cond {
                cond,
                then_target,
                else_target,
            },
        )
    }

    pub fn switch(
        &mut self,
        block: BlockId,
        value: Operand,
        cases: Vec<(i64, BlockId)>,
        default: BlockId,
    ) -> &mut Self {
        self.push(
            block,
            InsnKind::Switch {
                value,
                cases,
                default,
            },
        )
    }

    pub fn ret(&mut self, block: BlockId, value: Operand) -> &mut Self {
        self.push(block, InsnKind::Ret { value })
    }

    pub fn abort(&mut self, block: BlockId) -> &mut Self {
        self.push(block, InsnKind::Abort)
    }

    /// Store the body into the program builder
    pub fn finish(self) {
        if let Some(fnc) = self.pb.functions.get_mut(self.id.0 as usize) {
            fnc.args = self.args;
            fnc.locals = self.locals;
            fnc.blocks = self.blocks;
        }
    }
}

fn validate_function(program: &Program, fnc: &Function) -> EngineResult<()> {
    let fail = |msg: String, loc: &Location| {
        Err(EngineError::malformed(format!("{}: {}", fnc.name, msg)).at(loc))
    };

    for block in &fnc.blocks {
        let Some(last) = block.insns.last() else {
            return fail(format!("block {} is empty", block.id), &fnc.loc);
        };
        if !last.is_terminal() {
            return fail(format!("block {} lacks a terminal", block.id), &last.loc);
        }
        for insn in &block.insns[..block.insns.len() - 1] {
            if insn.is_terminal() {
                return fail(format!("terminal in the middle of {}", block.id), &insn.loc);
            }
        }
        for insn in &block.insns {
            for target in insn.successors() {
                if fnc.block(target).is_none() {
                    return fail(format!("jump to missing block {}", target), &insn.loc);
                }
            }
            for op in insn.operands() {
                validate_operand(program, op).or_else(|msg| fail(msg, &insn.loc))?;
            }
        }
    }
    Ok(())
}

fn validate_operand(program: &Program, op: &Operand) -> Result<(), String> {
    match op {
        Operand::Void => Ok(()),
        Operand::Const(Constant::Fnc(id)) => match program.function(*id) {
            Some(_) => Ok(()),
            None => Err(format!("reference to missing function {:?}", id)),
        },
        Operand::Const(_) => Ok(()),
        Operand::Var(var) => {
            if program.var(var.uid).is_none() {
                return Err(format!("reference to missing variable {:?}", var.uid));
            }
            let refs = var.accessors.iter().filter(|a| **a == Accessor::Ref).count();
            let ref_is_last = var.accessors.last() == Some(&Accessor::Ref);
            if refs > 1 || (refs == 1 && !ref_is_last) {
                return Err("address-of must be the last accessor".to_string());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_minimal_program() {
        let mut pb = ProgramBuilder::new("t.c");
        let int = pb.types().int(4);
        let main = pb.declare_function("main", int);
        let mut fb = pb.define(main);
        let x = fb.local("x", int);
        let bb = fb.block("entry");
        fb.assign(bb, Operand::var(x), Operand::int(1));
        fb.ret(bb, Operand::var(x));
        fb.finish();

        let program = pb.build().unwrap();
        let fnc = program.function_by_name("main").unwrap();
        assert!(fnc.is_defined());
        assert_eq!(fnc.locals, vec![x]);
        assert_eq!(fnc.blocks[0].insns.len(), 2);
        // consecutive lines, distinct locations
        assert_ne!(fnc.blocks[0].insns[0].loc, fnc.blocks[0].insns[1].loc);
    }

    #[test]
    fn test_missing_terminal_is_malformed() {
        let mut pb = ProgramBuilder::new("t.c");
        let int = pb.types().int(4);
        let f = pb.declare_function("f", int);
        let mut fb = pb.define(f);
        let x = fb.local("x", int);
        let bb = fb.block("entry");
        fb.assign(bb, Operand::var(x), Operand::int(1));
        fb.finish();

        let err = pb.build().unwrap_err();
        assert_eq!(err.kind, crate::shared::models::ErrorKind::MalformedProgram);
    }

    #[test]
    fn test_dangling_jump_is_malformed() {
        let mut pb = ProgramBuilder::new("t.c");
        let int = pb.types().int(4);
        let f = pb.declare_function("f", int);
        let mut fb = pb.define(f);
        let bb = fb.block("entry");
        fb.jmp(bb, BlockId(5));
        fb.finish();

        assert!(pb.build().is_err());
    }

    #[test]
    fn test_ref_must_be_last() {
        let mut pb = ProgramBuilder::new("t.c");
        let int = pb.types().int(4);
        let f = pb.declare_function("f", int);
        let mut fb = pb.define(f);
        let x = fb.local("x", int);
        let bb = fb.block("entry");
        fb.assign(bb, Operand::var(x), Operand::var(x).addr().deref());
        fb.ret(bb, Operand::Void);
        fb.finish();

        assert!(pb.build().is_err());
    }

    #[test]
    fn test_declare_function_is_idempotent() {
        let mut pb = ProgramBuilder::new("t.c");
        let void = pb.types().void();
        let a = pb.declare_function("free", void);
        let b = pb.declare_function("free", void);
        assert_eq!(a, b);
        let program = pb.build().unwrap();
        assert!(!program.function(a).unwrap().is_defined());
    }
}
