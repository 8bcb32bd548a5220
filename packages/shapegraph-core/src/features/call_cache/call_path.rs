//! Interprocedural call path
//!
//! Every execution frame owns its own `CallPath`; pushing a callee copies the
//! path instead of mutating a shared stack.

use crate::features::diagnostics::CallSite;
use crate::features::program_model::{FuncId, Program};
use crate::shared::models::Location;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathFrame {
    pub fnc: FuncId,
    /// Location of the call instruction in the caller (unknown for the root)
    pub call_loc: Location,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CallPath {
    frames: Vec<PathFrame>,
}

impl CallPath {
    /// Path of an analysis root
    pub fn root(fnc: FuncId) -> Self {
        Self {
            frames: vec![PathFrame {
                fnc,
                call_loc: Location::unknown(),
            }],
        }
    }

    pub fn push(&self, fnc: FuncId, call_loc: Location) -> Self {
        let mut frames = self.frames.clone();
        frames.push(PathFrame { fnc, call_loc });
        Self { frames }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn current(&self) -> Option<FuncId> {
        self.frames.last().map(|f| f.fnc)
    }

    /// How many times the innermost function is active, itself included.
    ///
    /// Local variables of a frame are keyed by this level, so recursive
    /// activations never share stack storage.
    pub fn nest_level(&self) -> u32 {
        match self.current() {
            Some(fnc) => self.frames.iter().filter(|f| f.fnc == fnc).count() as u32,
            None => 0,
        }
    }

    pub fn contains(&self, fnc: FuncId) -> bool {
        self.frames.iter().any(|f| f.fnc == fnc)
    }

    /// Any function appears more than once
    pub fn is_recursive(&self) -> bool {
        self.frames
            .iter()
            .enumerate()
            .any(|(i, f)| self.frames[..i].iter().any(|g| g.fnc == f.fnc))
    }

    pub fn functions(&self) -> Vec<FuncId> {
        self.frames.iter().map(|f| f.fnc).collect()
    }

    /// Call sites, innermost first; the root frame has none
    pub fn backtrace(&self, program: &Program) -> Vec<CallSite> {
        self.frames
            .iter()
            .skip(1)
            .rev()
            .map(|f| CallSite {
                function: program.function_name(f.fnc).to_string(),
                loc: f.call_loc.clone(),
            })
            .collect()
    }
}
