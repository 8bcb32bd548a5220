//! Symbolic Heap Ports
//!
//! The fixpoint scheduler and the call cache merge heaps through
//! [`HeapJoiner`]; [`crate::features::symbolic_heap::infrastructure::SimpleJoiner`]
//! is the shipped adapter.

use super::heap::SymHeap;
use crate::features::program_model::TypeTable;
use serde::{Deserialize, Serialize};

/// How the joined heap relates to its two inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinStatus {
    /// Both inputs are equivalent; either may be kept
    UseAny,
    /// The first input already covers the second
    UseSh1,
    /// The second input covers the first
    UseSh2,
    /// Neither covers the other; the joined heap is strictly more general
    UseSh3,
}

impl JoinStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinStatus::UseAny => "use_any",
            JoinStatus::UseSh1 => "use_sh1",
            JoinStatus::UseSh2 => "use_sh2",
            JoinStatus::UseSh3 => "use_sh3",
        }
    }

    pub(crate) fn from_flags(lhs_generalized: bool, rhs_generalized: bool) -> Self {
        match (lhs_generalized, rhs_generalized) {
            (false, false) => JoinStatus::UseAny,
            (false, true) => JoinStatus::UseSh1,
            (true, false) => JoinStatus::UseSh2,
            (true, true) => JoinStatus::UseSh3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JoinResult {
    pub heap: SymHeap,
    pub status: JoinStatus,
}

/// Heap join port
///
/// `join` returns `None` when the two shapes cannot be described by one heap
/// without losing soundness.
pub trait HeapJoiner: Send + Sync {
    fn join(&self, h1: &SymHeap, h2: &SymHeap, types: &TypeTable) -> Option<JoinResult>;

    /// Joiner name for trace output
    fn name(&self) -> &'static str;
}
