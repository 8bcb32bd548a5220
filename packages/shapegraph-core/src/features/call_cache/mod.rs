//! Call summary cache
//!
//! ```text
//! PendingCall ─split─▶ (cut, surround)
//!                        │
//!              slot lookup: isomorphism, then joins
//!                        │
//!        Hit(results) ◀──┴──▶ Compute(entry) ─▶ callee frame ─▶ finish
//!             │
//!   merge(result, surround) per result
//! ```

pub mod cache;
pub mod call_path;

pub use cache::{
    merge, CacheEntry, CacheKey, CacheLookup, CacheSlot, CacheStats, CallCache, SlotRef,
};
pub use call_path::{CallPath, PathFrame};
