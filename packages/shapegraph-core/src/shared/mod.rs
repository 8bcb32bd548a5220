//! Shared module - common types and utilities
//!
//! Types used across every feature slice. No feature module is imported here.

pub mod models;
pub mod utils;

pub use models::*;
pub use utils::worklist::WorkList;
