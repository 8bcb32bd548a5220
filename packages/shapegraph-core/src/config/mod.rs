//! Engine configuration
//!
//! ```text
//! Preset (fast | balanced | thorough | custom)
//!   └─ AnalysisConfig
//!        ├─ AbstractionConfig   segment folding policy + thresholds
//!        ├─ CallCacheConfig     isomorphism/join precision knob
//!        └─ ExecutionConfig     state joins, depth and work limits, OOM paths
//! ```
//!
//! Every level is `#[serde(default)]`, has builder setters and implements
//! [`Validatable`]. YAML files use schema `version: 1`, see [`io`].

pub mod analysis_config;
pub mod error;
pub mod io;
pub mod preset;
pub mod validation;

pub use analysis_config::{
    AbstractionConfig, AbstractionPolicy, AnalysisConfig, CallCacheConfig, ExecutionConfig,
    StateJoinPolicy,
};
pub use error::{ConfigError, ConfigResult};
pub use preset::Preset;
pub use validation::Validatable;
