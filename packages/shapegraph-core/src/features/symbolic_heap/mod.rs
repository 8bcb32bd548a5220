//! Symbolic Heap
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ domain/          ids, values, roots, objects, byte arena   │
//! │ heap.rs          SymHeap: allocation, load/store, proofs   │
//! │ cut.rs           call-site split and import                │
//! │ isomorphism.rs   renaming-insensitive heap equality        │
//! │ ports/           HeapJoiner                                │
//! │ infrastructure/  SimpleJoiner                              │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod cut;
pub mod domain;
mod dump;
pub mod heap;
pub mod infrastructure;
pub mod isomorphism;
pub mod ports;

pub use cut::ImportMap;
pub use domain::*;
pub use heap::SymHeap;
pub use infrastructure::SimpleJoiner;
pub use isomorphism::are_isomorphic;
pub use ports::{HeapJoiner, JoinResult, JoinStatus};
