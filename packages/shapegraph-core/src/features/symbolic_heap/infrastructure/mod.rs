//! Symbolic Heap Infrastructure - port adapters

pub mod simple_joiner;

pub use simple_joiner::SimpleJoiner;
