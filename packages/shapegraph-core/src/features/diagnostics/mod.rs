//! Diagnostics: findings and the deduplicating reporter

pub mod finding;
pub mod reporter;

pub use finding::{CallSite, Finding, FindingKind, Severity};
pub use reporter::Reporter;
