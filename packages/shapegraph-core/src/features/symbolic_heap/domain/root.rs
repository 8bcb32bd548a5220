//! Roots, their sub-objects and list-segment metadata

use super::arena::ByteArena;
use super::ids::{CVar, ObjectId, RootId, ValueId};
use crate::features::program_model::TypeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Storage {
    Stack(CVar),
    Static(CVar),
    Heap,
    /// Return value of the function being left
    Return,
}

impl Storage {
    /// Anchors for reachability: anything but heap storage
    pub fn is_program_var(&self) -> bool {
        !matches!(self, Storage::Heap)
    }

    pub fn cvar(&self) -> Option<CVar> {
        match self {
            Storage::Stack(cv) | Storage::Static(cv) => Some(*cv),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SegKind {
    Sls,
    Dls,
}

/// Offsets of the link fields in chain orientation (SLS uses `prev == next`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BindingOff {
    /// Offset the links point to inside a node
    pub head: i64,
    pub next: i64,
    pub prev: i64,
}

impl BindingOff {
    pub fn sls(head: i64, next: i64) -> Self {
        Self {
            head,
            next,
            prev: next,
        }
    }

    pub fn dls(head: i64, next: i64, prev: i64) -> Self {
        Self { head, next, prev }
    }

    pub fn is_link(&self, offset: i64) -> bool {
        offset == self.next || offset == self.prev
    }
}

/// Which end of a doubly-linked segment a root represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DlsEnd {
    /// Entered by the predecessor's `next`
    First,
    /// Entered by the successor's `prev`
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub kind: SegKind,
    pub binding: BindingOff,
    pub min_len: u32,
    /// The other end of a DLS, the root itself for SLS
    pub peer: RootId,
    pub end: DlsEnd,
}

impl SegmentInfo {
    /// Field pointing out of the segment from this end
    pub fn outward(&self) -> i64 {
        match (self.kind, self.end) {
            (SegKind::Sls, _) | (SegKind::Dls, DlsEnd::Last) => self.binding.next,
            (SegKind::Dls, DlsEnd::First) => self.binding.prev,
        }
    }

    /// Field linking this end to its peer (DLS only)
    pub fn inward(&self) -> Option<i64> {
        match (self.kind, self.end) {
            (SegKind::Sls, _) => None,
            (SegKind::Dls, DlsEnd::First) => Some(self.binding.next),
            (SegKind::Dls, DlsEnd::Last) => Some(self.binding.prev),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RootRecord {
    pub storage: Storage,
    pub size: i64,
    pub ty: Option<TypeId>,
    pub zeroed: bool,
    pub valid: bool,
    /// Live sub-objects by (offset, type)
    pub objects: BTreeMap<(i64, TypeId), ObjectId>,
    pub arena: ByteArena,
    pub segment: Option<SegmentInfo>,
    /// Interned addresses by offset
    pub addresses: BTreeMap<i64, ValueId>,
}

impl RootRecord {
    pub fn new(storage: Storage, size: i64, ty: Option<TypeId>, zeroed: bool) -> Self {
        Self {
            storage,
            size,
            ty,
            zeroed,
            valid: true,
            objects: BTreeMap::new(),
            arena: ByteArena::default(),
            segment: None,
            addresses: BTreeMap::new(),
        }
    }

    pub fn is_abstract(&self) -> bool {
        self.segment.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ObjectRecord {
    pub root: RootId,
    pub offset: i64,
    pub ty: TypeId,
    pub size: i64,
    /// None until first read or write
    pub value: Option<ValueId>,
    pub live: bool,
}
