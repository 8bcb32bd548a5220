//! Static facts about a program computed once per session
//!
//! - loop-closing (back) edges of every CFG, where segment abstraction runs
//! - the direct call graph, used for virtual roots
//! - globals used by a function and everything it may call

use super::program::{BlockId, Constant, FuncId, Function, InsnKind, Operand, Program, VarUid};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{depth_first_search, Dfs, DfsEvent};
use petgraph::Direction;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct ProgramAnalysis {
    back_edges: FxHashMap<FuncId, FxHashSet<(BlockId, BlockId)>>,
    /// `None` means the function may reach an indirect call, so every global is in use
    globals_in_use: FxHashMap<FuncId, Option<BTreeSet<VarUid>>>,
    virtual_roots: Vec<FuncId>,
}

impl ProgramAnalysis {
    pub fn new(program: &Program) -> Self {
        let back_edges = program
            .functions()
            .iter()
            .filter(|f| f.is_defined())
            .map(|f| (f.id, loop_closing_edges(f)))
            .collect();

        let call_graph = CallGraph::build(program);
        let virtual_roots = call_graph.virtual_roots(program);
        let globals_in_use = program
            .functions()
            .iter()
            .map(|f| (f.id, call_graph.globals_in_use(program, f.id)))
            .collect();

        Self {
            back_edges,
            globals_in_use,
            virtual_roots,
        }
    }

    pub fn is_loop_edge(&self, fnc: FuncId, from: BlockId, to: BlockId) -> bool {
        self.back_edges
            .get(&fnc)
            .map(|edges| edges.contains(&(from, to)))
            .unwrap_or(false)
    }

    pub fn loop_edge_count(&self, fnc: FuncId) -> usize {
        self.back_edges.get(&fnc).map(|e| e.len()).unwrap_or(0)
    }

    /// Globals the function (transitively) touches
    pub fn globals_in_use(&self, program: &Program, fnc: FuncId) -> Vec<VarUid> {
        match self.globals_in_use.get(&fnc) {
            Some(Some(set)) => set.iter().copied().collect(),
            _ => program.globals().map(|v| v.uid).collect(),
        }
    }

    /// Defined functions that no other function calls directly
    pub fn virtual_roots(&self) -> &[FuncId] {
        &self.virtual_roots
    }
}

/// Back edges found by a DFS from the entry block
pub fn loop_closing_edges(fnc: &Function) -> FxHashSet<(BlockId, BlockId)> {
    let mut graph: DiGraph<BlockId, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = fnc.blocks.iter().map(|b| graph.add_node(b.id)).collect();
    for block in &fnc.blocks {
        if let Some(term) = block.terminal() {
            for succ in term.successors() {
                if let Some(&to) = nodes.get(succ.0 as usize) {
                    graph.add_edge(nodes[block.id.0 as usize], to, ());
                }
            }
        }
    }

    let mut edges = FxHashSet::default();
    let Some(&entry) = nodes.first() else {
        return edges;
    };
    depth_first_search(&graph, Some(entry), |event| {
        if let DfsEvent::BackEdge(from, to) = event {
            edges.insert((graph[from], graph[to]));
        }
    });
    edges
}

struct CallGraph {
    graph: DiGraph<FuncId, ()>,
    nodes: Vec<NodeIndex>,
    indirect: FxHashSet<FuncId>,
}

impl CallGraph {
    fn build(program: &Program) -> Self {
        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = program
            .functions()
            .iter()
            .map(|f| graph.add_node(f.id))
            .collect();
        let mut indirect = FxHashSet::default();

        for fnc in program.functions() {
            for insn in fnc.blocks.iter().flat_map(|b| b.insns.iter()) {
                let InsnKind::Call { callee, .. } = &insn.kind else {
                    continue;
                };
                match callee {
                    Operand::Const(Constant::Fnc(target)) => {
                        if let Some(&to) = nodes.get(target.0 as usize) {
                            graph.update_edge(nodes[fnc.id.0 as usize], to, ());
                        }
                    }
                    _ => {
                        indirect.insert(fnc.id);
                    }
                }
            }
        }

        Self {
            graph,
            nodes,
            indirect,
        }
    }

    fn virtual_roots(&self, program: &Program) -> Vec<FuncId> {
        program
            .functions()
            .iter()
            .filter(|f| f.is_defined())
            .filter(|f| {
                let node = self.nodes[f.id.0 as usize];
                self.graph
                    .neighbors_directed(node, Direction::Incoming)
                    .all(|caller| caller == node)
            })
            .map(|f| f.id)
            .collect()
    }

    fn globals_in_use(&self, program: &Program, fnc: FuncId) -> Option<BTreeSet<VarUid>> {
        let start = *self.nodes.get(fnc.0 as usize)?;
        let mut used = BTreeSet::new();
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(node) = dfs.next(&self.graph) {
            let id = self.graph[node];
            if self.indirect.contains(&id) {
                return None;
            }
            if let Some(f) = program.function(id) {
                collect_globals(program, f, &mut used);
            }
        }
        Some(used)
    }
}

fn collect_globals(program: &Program, fnc: &Function, out: &mut BTreeSet<VarUid>) {
    for insn in fnc.blocks.iter().flat_map(|b| b.insns.iter()) {
        for op in insn.operands() {
            if let Some(var) = op.var_ref() {
                if program.var(var.uid).map(|v| v.is_global()).unwrap_or(false) {
                    out.insert(var.uid);
                }
            }
        }
    }
}
