//! Garbage collector
//!
//! Heap roots no longer reachable from a program variable are junk. The
//! collector is driven by the values a mutation just dropped: only their
//! roots can have become unreachable.

pub mod collector;

pub use collector::{collect_all, collect_junk, collect_shared_junk, is_junk};
