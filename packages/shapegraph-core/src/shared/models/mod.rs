//! Shared models

mod error;
mod location;

pub use error::{EngineError, EngineResult, ErrorKind};
pub use location::Location;
