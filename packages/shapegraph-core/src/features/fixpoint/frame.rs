//! Execution frames of the explicit call stack

use super::sym_state::SymState;
use crate::features::call_cache::{CallPath, SlotRef};
use crate::features::program_model::{BlockId, FuncId, Function, Operand};
use crate::features::symbolic_heap::SymHeap;
use crate::shared::models::Location;
use crate::shared::WorkList;
use rustc_hash::FxHashMap;

/// Position inside the block being executed
#[derive(Debug)]
pub(super) struct Cursor {
    pub block: BlockId,
    pub idx: usize,
    /// Heaps still to run through instruction `idx`
    pub todo: Vec<SymHeap>,
    /// Heaps ready for instruction `idx + 1`
    pub done: Vec<SymHeap>,
}

impl Cursor {
    pub fn new(block: BlockId, heaps: Vec<SymHeap>) -> Self {
        Self {
            block,
            idx: 0,
            todo: heaps,
            done: Vec::new(),
        }
    }
}

/// A call the frame waits on
#[derive(Debug)]
pub(super) struct PendingReturn {
    /// Part of the caller's heap the callee cannot see
    pub surround: SymHeap,
    /// The callee's entry heap
    pub entry: SymHeap,
    pub dst: Operand,
    pub callee: FuncId,
    pub loc: Location,
}

/// One function activation
#[derive(Debug)]
pub(super) struct ExecFrame<'a> {
    pub fnc: &'a Function,
    pub path: CallPath,
    pub states: FxHashMap<BlockId, SymState>,
    pub worklist: WorkList<BlockId>,
    pub cursor: Option<Cursor>,
    pub pending: Option<PendingReturn>,
    pub results: SymState,
    /// Heaps taken from block states so far
    pub visits: usize,
    /// Cache slot the results go to; `None` for an analysis root
    pub slot: Option<SlotRef>,
    pub exhausted: bool,
}

impl<'a> ExecFrame<'a> {
    pub fn new(fnc: &'a Function, path: CallPath, entry: SymHeap, slot: Option<SlotRef>) -> Self {
        let block = fnc.entry();
        let mut state = SymState::new();
        // an empty state accepts any heap under either policy
        state.insert_unchecked(entry);
        let mut states = FxHashMap::default();
        states.insert(block, state);
        Self {
            fnc,
            path,
            states,
            worklist: WorkList::with_item(block),
            cursor: None,
            pending: None,
            results: SymState::new(),
            visits: 0,
            slot,
            exhausted: false,
        }
    }

    /// Marked heaps of the next scheduled block
    pub fn next_block(&mut self) -> Option<(BlockId, Vec<SymHeap>)> {
        let block = self.worklist.next()?;
        let heaps = self
            .states
            .get_mut(&block)
            .map(SymState::take_marked)
            .unwrap_or_default();
        Some((block, heaps))
    }
}
