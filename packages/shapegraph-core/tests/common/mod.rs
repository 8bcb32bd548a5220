//! Common test utilities for shapegraph-core
//!
//! Program skeletons with the C allocator declared, plus a tracing
//! subscriber honoring `RUST_LOG`.

#![allow(dead_code)]

use shapegraph_core::features::program_model::{FuncId, ProgramBuilder, TypeId};
use shapegraph_core::{AnalysisConfig, AnalysisReport, AnalysisSession, Program};

/// Install a subscriber once; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builder with `int`, `struct node { node *next; int data; }` and the allocator
pub struct CProgram {
    pub pb: ProgramBuilder,
    pub int: TypeId,
    pub int_ptr: TypeId,
    pub node: TypeId,
    pub node_ptr: TypeId,
    pub node_size: i64,
    pub malloc: FuncId,
    pub free: FuncId,
}

pub fn c_program(file: &str) -> CProgram {
    let mut pb = ProgramBuilder::new(file);
    let types = pb.types();
    let int = types.int(4);
    let void = types.void();
    let int_ptr = types.ptr(int);
    let void_ptr = types.ptr(void);
    let node = types.declare_struct("node");
    let node_ptr = types.ptr(node);
    types
        .define_struct(node, &[("next", node_ptr), ("data", int)])
        .expect("node type");
    let node_size = types.size_of(node);
    let malloc = pb.declare_function("malloc", void_ptr);
    let free = pb.declare_function("free", void);
    CProgram {
        pb,
        int,
        int_ptr,
        node,
        node_ptr,
        node_size,
        malloc,
        free,
    }
}

pub fn analyze(program: Program, config: AnalysisConfig) -> AnalysisReport {
    init_tracing();
    AnalysisSession::new(program, config)
        .expect("valid config")
        .run()
}
