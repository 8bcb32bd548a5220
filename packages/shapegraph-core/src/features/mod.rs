//! Feature modules - one vertical slice per analysis concern
//!
//! Each slice owns its types and tests. Ports (traits) sit where a slice
//! is meant to be swappable, as with the heap joiner.

// Input: the program model and static facts about it
pub mod program_model;

// Heap domain and the operations on it
pub mod symbolic_heap;
pub mod garbage_collector;
pub mod segment_abstraction;

// Execution
pub mod interpreter;
pub mod call_cache;
pub mod fixpoint;

// Output
pub mod diagnostics;
