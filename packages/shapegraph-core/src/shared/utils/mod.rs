//! Small generic helpers shared by the heap algorithms

pub mod worklist;
