//! Value kinds, origins and target kinds

use super::ids::{ObjectId, RootId};
use crate::features::program_model::FuncId;
use serde::{Deserialize, Serialize};

/// Scalar payload interned by content
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CustomValue {
    Int(i64),
    Str(String),
    Fnc(FuncId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialValue {
    Invalid,
    Null,
    True,
    False,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Special(SpecialValue),
    Custom(CustomValue),
    /// Placeholder standing for the value of a struct/array object
    Composite(ObjectId),
    /// Root address plus byte offset
    Address { root: RootId, offset: i64 },
    Unknown,
}

/// How a value came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueOrigin {
    Assigned,
    /// Read of a never written stack object
    StackUninit,
    /// Read of a never written heap object
    HeapUninit,
    /// Object was overwritten through an overlapping object
    Reinterpret,
    /// Produced by a failed dereference, already reported
    DerefFailed,
    Unknown,
}

impl ValueOrigin {
    pub fn is_uninit(&self) -> bool {
        matches!(self, ValueOrigin::StackUninit | ValueOrigin::HeapUninit)
    }
}

/// What an address points to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    Invalid,
    Null,
    Custom,
    Composite,
    OnStack,
    OnHeap,
    Static,
    Abstract,
    /// Heap root already destroyed
    Deleted,
    /// Stack or static root no longer live
    Lost,
    Unknown,
}

impl TargetKind {
    /// A live root the program may access
    pub fn is_valid_target(&self) -> bool {
        matches!(
            self,
            TargetKind::OnStack | TargetKind::OnHeap | TargetKind::Static | TargetKind::Abstract
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRecord {
    pub kind: ValueKind,
    pub origin: ValueOrigin,
}
