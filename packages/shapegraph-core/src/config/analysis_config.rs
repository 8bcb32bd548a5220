//! Analysis configuration (per concern)

use super::error::{ConfigError, ConfigResult};
use super::preset::Preset;
use super::validation::{validate_section, Validatable};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════
// Abstraction
// ═══════════════════════════════════════════════════════════════════════════

/// When list-segment abstraction runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbstractionPolicy {
    /// Never fold (analysis may not terminate on list-building loops)
    Never,
    /// Fold on loop-closing CFG edges only
    LoopEdges,
    /// Fold on every CFG edge
    AllEdges,
}

/// Segment abstraction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbstractionConfig {
    /// When to run discovery + folding
    pub policy: AbstractionPolicy,

    /// Minimum chain length (in nodes) to fold when node data match exactly (2..=16)
    pub min_fold_length_exact: usize,

    /// Minimum chain length (in nodes) to fold when node data must be generalized (2..=16)
    pub min_fold_length_generalizing: usize,

    /// Discover doubly-linked segments
    pub enable_dls: bool,
}

impl AbstractionConfig {
    pub fn from_preset(preset: Preset) -> Self {
        match preset {
            Preset::Fast => Self {
                policy: AbstractionPolicy::LoopEdges,
                min_fold_length_exact: 2,
                min_fold_length_generalizing: 2,
                enable_dls: true,
            },
            Preset::Balanced | Preset::Custom => Self {
                policy: AbstractionPolicy::LoopEdges,
                min_fold_length_exact: 2,
                min_fold_length_generalizing: 3,
                enable_dls: true,
            },
            Preset::Thorough => Self {
                policy: AbstractionPolicy::LoopEdges,
                min_fold_length_exact: 2,
                min_fold_length_generalizing: 4,
                enable_dls: true,
            },
        }
    }

    /// Threshold for a chain whose folding costs `cost` generalizations
    pub fn min_fold_length(&self, cost: usize) -> usize {
        if cost == 0 {
            self.min_fold_length_exact
        } else {
            self.min_fold_length_generalizing
        }
    }

    /// Builder: Set policy
    pub fn policy(mut self, v: AbstractionPolicy) -> Self {
        self.policy = v;
        self
    }

    /// Builder: Set min_fold_length_exact
    pub fn min_fold_length_exact(mut self, v: usize) -> Self {
        self.min_fold_length_exact = v;
        self
    }

    /// Builder: Set min_fold_length_generalizing
    pub fn min_fold_length_generalizing(mut self, v: usize) -> Self {
        self.min_fold_length_generalizing = v;
        self
    }

    /// Builder: Set enable_dls
    pub fn enable_dls(mut self, v: bool) -> Self {
        self.enable_dls = v;
        self
    }
}

impl Default for AbstractionConfig {
    fn default() -> Self {
        Self::from_preset(Preset::Balanced)
    }
}

impl Validatable for AbstractionConfig {
    fn validate(&self) -> ConfigResult<()> {
        for (field, value) in [
            ("min_fold_length_exact", self.min_fold_length_exact),
            ("min_fold_length_generalizing", self.min_fold_length_generalizing),
        ] {
            if !(2..=16).contains(&value) {
                return Err(ConfigError::range_with_hint(
                    field,
                    value,
                    2,
                    16,
                    "A segment needs at least two nodes to fold",
                ));
            }
        }

        if self.min_fold_length_generalizing < self.min_fold_length_exact {
            return Err(ConfigError::Validation(format!(
                "min_fold_length_generalizing ({}) must not be below min_fold_length_exact ({})",
                self.min_fold_length_generalizing, self.min_fold_length_exact
            )));
        }

        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "AbstractionConfig"
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Call cache
// ═══════════════════════════════════════════════════════════════════════════

/// Call summary cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallCacheConfig {
    /// How many cached entries of a function to try joining with (0 = isomorphism only)
    pub join_attempts: usize,

    /// Slots per function before new entries are forced into the latest slot (1..=10000)
    pub max_slots_per_function: usize,
}

impl CallCacheConfig {
    pub fn from_preset(preset: Preset) -> Self {
        match preset {
            Preset::Fast => Self {
                join_attempts: 8,
                max_slots_per_function: 16,
            },
            Preset::Balanced | Preset::Custom => Self {
                join_attempts: 2,
                max_slots_per_function: 64,
            },
            Preset::Thorough => Self {
                join_attempts: 0,
                max_slots_per_function: 1024,
            },
        }
    }

    /// Builder: Set join_attempts
    pub fn join_attempts(mut self, v: usize) -> Self {
        self.join_attempts = v;
        self
    }

    /// Builder: Set max_slots_per_function
    pub fn max_slots_per_function(mut self, v: usize) -> Self {
        self.max_slots_per_function = v;
        self
    }
}

impl Default for CallCacheConfig {
    fn default() -> Self {
        Self::from_preset(Preset::Balanced)
    }
}

impl Validatable for CallCacheConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.join_attempts > 64 {
            return Err(ConfigError::range_with_hint(
                "join_attempts",
                self.join_attempts,
                0,
                64,
                "Each attempt runs a full heap join",
            ));
        }

        if self.max_slots_per_function == 0 || self.max_slots_per_function > 10_000 {
            return Err(ConfigError::range_with_hint(
                "max_slots_per_function",
                self.max_slots_per_function,
                1,
                10_000,
                "Slot limit must be reasonable",
            ));
        }

        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "CallCacheConfig"
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Execution
// ═══════════════════════════════════════════════════════════════════════════

/// How a block state decides that a heap is already covered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateJoinPolicy {
    /// Only isomorphic heaps are merged
    Isomorphism,
    /// Heaps are joined when the join primitive succeeds
    Join,
}

/// Execution limits and state handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Block state deduplication policy
    pub state_join: StateJoinPolicy,

    /// Maximal call nesting, recursion included (1..=256)
    pub max_call_depth: usize,

    /// Maximal heap visits per function before giving up (1..=10000000)
    pub max_block_visits: usize,

    /// Explore a sibling path where every allocation fails
    pub oom_simulation: bool,
}

impl ExecutionConfig {
    pub fn from_preset(preset: Preset) -> Self {
        match preset {
            Preset::Fast => Self {
                state_join: StateJoinPolicy::Join,
                max_call_depth: 4,
                max_block_visits: 20_000,
                oom_simulation: false,
            },
            Preset::Balanced | Preset::Custom => Self {
                state_join: StateJoinPolicy::Join,
                max_call_depth: 8,
                max_block_visits: 200_000,
                oom_simulation: false,
            },
            Preset::Thorough => Self {
                state_join: StateJoinPolicy::Isomorphism,
                max_call_depth: 32,
                max_block_visits: 2_000_000,
                oom_simulation: true,
            },
        }
    }

    /// Builder: Set state_join
    pub fn state_join(mut self, v: StateJoinPolicy) -> Self {
        self.state_join = v;
        self
    }

    /// Builder: Set max_call_depth
    pub fn max_call_depth(mut self, v: usize) -> Self {
        self.max_call_depth = v;
        self
    }

    /// Builder: Set max_block_visits
    pub fn max_block_visits(mut self, v: usize) -> Self {
        self.max_block_visits = v;
        self
    }

    /// Builder: Set oom_simulation
    pub fn oom_simulation(mut self, v: bool) -> Self {
        self.oom_simulation = v;
        self
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self::from_preset(Preset::Balanced)
    }
}

impl Validatable for ExecutionConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_call_depth == 0 || self.max_call_depth > 256 {
            return Err(ConfigError::range_with_hint(
                "max_call_depth",
                self.max_call_depth,
                1,
                256,
                "Call depth must be 1-256",
            ));
        }

        if self.max_block_visits == 0 || self.max_block_visits > 10_000_000 {
            return Err(ConfigError::range_with_hint(
                "max_block_visits",
                self.max_block_visits,
                1,
                10_000_000,
                "Work limit must be reasonable",
            ));
        }

        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "ExecutionConfig"
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Top level
// ═══════════════════════════════════════════════════════════════════════════

/// Complete analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub abstraction: AbstractionConfig,
    pub call_cache: CallCacheConfig,
    pub execution: ExecutionConfig,

    /// Functions to analyze; empty means `main`, or every virtual root without `main`
    pub entry_points: Vec<String>,
}

impl AnalysisConfig {
    pub fn from_preset(preset: Preset) -> Self {
        Self {
            abstraction: AbstractionConfig::from_preset(preset),
            call_cache: CallCacheConfig::from_preset(preset),
            execution: ExecutionConfig::from_preset(preset),
            entry_points: Vec::new(),
        }
    }

    /// Builder: modify the abstraction config
    pub fn abstraction(mut self, f: impl FnOnce(AbstractionConfig) -> AbstractionConfig) -> Self {
        self.abstraction = f(self.abstraction);
        self
    }

    /// Builder: modify the call cache config
    pub fn call_cache(mut self, f: impl FnOnce(CallCacheConfig) -> CallCacheConfig) -> Self {
        self.call_cache = f(self.call_cache);
        self
    }

    /// Builder: modify the execution config
    pub fn execution(mut self, f: impl FnOnce(ExecutionConfig) -> ExecutionConfig) -> Self {
        self.execution = f(self.execution);
        self
    }

    /// Builder: add an entry point
    pub fn entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_points.push(name.into());
        self
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::from_preset(Preset::Balanced)
    }
}

impl Validatable for AnalysisConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_section(&self.abstraction)?;
        validate_section(&self.call_cache)?;
        validate_section(&self.execution)?;

        if self.entry_points.iter().any(|name| name.is_empty()) {
            return Err(ConfigError::Validation(
                "entry_points must not contain empty names".to_string(),
            ));
        }

        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "AnalysisConfig"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        for preset in [Preset::Fast, Preset::Balanced, Preset::Thorough, Preset::Custom] {
            let config = AnalysisConfig::from_preset(preset);
            assert!(config.validate().is_ok(), "preset {} invalid", preset);
        }
    }

    #[test]
    fn test_abstraction_config_rejects_single_node_fold() {
        let config = AbstractionConfig::default().min_fold_length_exact(1);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_fold_length_exact"));
    }

    #[test]
    fn test_abstraction_config_threshold_order() {
        let config = AbstractionConfig::default()
            .min_fold_length_exact(5)
            .min_fold_length_generalizing(3);
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_min_fold_length_by_cost() {
        let config = AbstractionConfig::default();
        assert_eq!(config.min_fold_length(0), 2);
        assert_eq!(config.min_fold_length(1), 3);
        assert_eq!(config.min_fold_length(7), 3);
    }

    #[test]
    fn test_call_cache_config_range() {
        assert!(CallCacheConfig::default().join_attempts(65).validate().is_err());
        assert!(CallCacheConfig::default()
            .max_slots_per_function(0)
            .validate()
            .is_err());
        assert!(CallCacheConfig::default().join_attempts(0).validate().is_ok());
    }

    #[test]
    fn test_execution_config_range() {
        assert!(ExecutionConfig::default().max_call_depth(0).validate().is_err());
        assert!(ExecutionConfig::default().max_call_depth(257).validate().is_err());
        assert!(ExecutionConfig::default().max_block_visits(0).validate().is_err());
    }

    #[test]
    fn test_builder_chain() {
        let config = AnalysisConfig::from_preset(Preset::Fast)
            .abstraction(|a| a.policy(AbstractionPolicy::AllEdges))
            .execution(|e| e.oom_simulation(true))
            .entry_point("main");
        assert_eq!(config.abstraction.policy, AbstractionPolicy::AllEdges);
        assert!(config.execution.oom_simulation);
        assert_eq!(config.entry_points, vec!["main".to_string()]);
    }

    #[test]
    fn test_empty_entry_point_rejected() {
        let config = AnalysisConfig::default().entry_point("");
        assert!(config.validate().is_err());
    }
}
