//! Symbolic heap domain: handles, values, roots and objects
//!
//! Everything is index based. A handle stays valid for the lifetime of its
//! heap; liveness is an explicit flag, so a dangling *modeled* pointer never
//! turns into a dangling *Rust* reference.

pub mod arena;
pub mod ids;
pub mod root;
pub mod value;

pub use arena::ByteArena;
pub use ids::{CVar, ObjectId, RootId, ValueId};
pub use root::{BindingOff, DlsEnd, ObjectRecord, RootRecord, SegKind, SegmentInfo, Storage};
pub use value::{CustomValue, SpecialValue, TargetKind, ValueKind, ValueOrigin, ValueRecord};
