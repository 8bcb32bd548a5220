//! Finding types
//!
//! Findings are the output of the analysis. They are plain data: building
//! one never fails and never interrupts execution.

use crate::shared::models::Location;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    InvalidDereference,
    DoubleFree,
    FreeNonHeap,
    FreeWithOffset,
    MemoryLeak,
    UninitializedCondition,
    UndefinedFunction,
    EndNotReached,
    AnalysisLimit,
}

impl FindingKind {
    /// Severity a finding of this kind is reported with
    pub fn severity(&self) -> Severity {
        match self {
            FindingKind::InvalidDereference
            | FindingKind::DoubleFree
            | FindingKind::FreeNonHeap
            | FindingKind::FreeWithOffset => Severity::Error,
            FindingKind::MemoryLeak
            | FindingKind::UninitializedCondition
            | FindingKind::UndefinedFunction
            | FindingKind::AnalysisLimit => Severity::Warning,
            FindingKind::EndNotReached => Severity::Note,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::InvalidDereference => "invalid_dereference",
            FindingKind::DoubleFree => "double_free",
            FindingKind::FreeNonHeap => "free_non_heap",
            FindingKind::FreeWithOffset => "free_with_offset",
            FindingKind::MemoryLeak => "memory_leak",
            FindingKind::UninitializedCondition => "uninitialized_condition",
            FindingKind::UndefinedFunction => "undefined_function",
            FindingKind::EndNotReached => "end_not_reached",
            FindingKind::AnalysisLimit => "analysis_limit",
        }
    }
}

/// One frame of the call path a finding was produced under
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallSite {
    pub function: String,
    pub loc: Location,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub loc: Location,
    pub message: String,
    /// Innermost call first
    pub backtrace: Vec<CallSite>,
}

impl Finding {
    pub fn new(kind: FindingKind, loc: Location, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            loc,
            message: message.into(),
            backtrace: Vec::new(),
        }
    }

    pub fn with_backtrace(mut self, backtrace: Vec<CallSite>) -> Self {
        self.backtrace = backtrace;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.loc, self.severity.as_str(), self.message)?;
        for site in &self.backtrace {
            write!(f, "\n{}: note: from call of {}()", site.loc, site.function)?;
        }
        Ok(())
    }
}
