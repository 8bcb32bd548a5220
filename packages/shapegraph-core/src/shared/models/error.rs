//! Error types for the shapegraph engine
//!
//! Unsafety findings (invalid dereference, leaks, ...) are *data* and never
//! travel through this type. `EngineError` is reserved for conditions the
//! engine cannot give a meaning to:
//! - malformed program model (dangling block/variable/function references)
//! - inconsistent heap state reached by an internal operation
//! - cooperative cancellation of the whole run
//!
//! The session isolates an `EngineError` to the analysis root that raised it.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error kind categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Program model references something that does not exist
    MalformedProgram,
    /// Internal heap invariant does not hold
    InconsistentHeap,
    /// Call of a function id the program does not define
    UnknownFunction,
    /// Operand names a variable uid that is not declared
    UnknownVariable,
    /// Run aborted through the cancellation flag
    Cancelled,
    /// Invalid configuration
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedProgram => "malformed_program",
            ErrorKind::InconsistentHeap => "inconsistent_heap",
            ErrorKind::UnknownFunction => "unknown_function",
            ErrorKind::UnknownVariable => "unknown_variable",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Config => "config",
        }
    }
}

/// Engine error type
#[derive(Debug)]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file: None,
            line: None,
            source: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Attach a source location in one step
    pub fn at(self, loc: &crate::shared::models::Location) -> Self {
        self.with_file(loc.file.clone()).with_line(loc.line)
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    // Convenience constructors
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedProgram, message)
    }

    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InconsistentHeap, message)
    }

    pub fn unknown_function(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownFunction, message)
    }

    pub fn unknown_variable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownVariable, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "analysis cancelled")
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)?;
        if let Some(ref file) = self.file {
            write!(f, " in {}", file)?;
            if let Some(line) = self.line {
                write!(f, ":{}", line)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        EngineError::new(ErrorKind::Config, err.to_string()).with_source(err)
    }
}

/// Result type alias
pub type EngineResult<T> = std::result::Result<T, EngineError>;
