//! Dense handles into the heap tables

use crate::features::program_model::VarUid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle of an interned value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl ValueId {
    pub const INVALID: ValueId = ValueId(0);
    pub const NULL: ValueId = ValueId(1);
    pub const TRUE: ValueId = ValueId(2);
    pub const FALSE: ValueId = ValueId(3);

    /// Number of values every heap starts with
    pub const SPECIALS: u32 = 4;

    pub fn is_special(&self) -> bool {
        self.0 < Self::SPECIALS
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ValueId::INVALID => write!(f, "VAL_INVALID"),
            ValueId::NULL => write!(f, "NULL"),
            ValueId::TRUE => write!(f, "TRUE"),
            ValueId::FALSE => write!(f, "FALSE"),
            ValueId(n) => write!(f, "#{}", n),
        }
    }
}

/// Handle of a root (stack/static variable, heap block, return slot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RootId(pub u32);

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Handle of a typed field inside a root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O{}", self.0)
    }
}

/// Program variable instance: uid + call-nesting instance (0 for globals)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CVar {
    pub uid: VarUid,
    pub inst: u32,
}

impl CVar {
    pub fn new(uid: VarUid, inst: u32) -> Self {
        Self { uid, inst }
    }

    pub fn global(uid: VarUid) -> Self {
        Self { uid, inst: 0 }
    }
}
