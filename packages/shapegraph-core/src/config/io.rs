//! Configuration I/O (YAML loading and export)

use super::analysis_config::{AbstractionConfig, AnalysisConfig, CallCacheConfig, ExecutionConfig};
use super::error::{ConfigError, ConfigResult};
use super::preset::Preset;
use super::validation::Validatable;
use serde::{Deserialize, Serialize};
use std::path::Path;

const SUPPORTED_VERSIONS: [u32; 1] = [1];

/// YAML Schema v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileV1 {
    /// Schema version (always 1 for v1)
    #[serde(default)]
    pub version: Option<u32>,

    /// Base preset
    #[serde(default)]
    pub preset: Option<String>,

    /// Per-concern overrides on top of the preset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<ConfigOverrides>,
}

/// Configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstraction: Option<AbstractionConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_cache: Option<CallCacheConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_points: Option<Vec<String>>,
}

impl AnalysisConfig {
    /// Load and validate a YAML configuration file
    pub fn from_yaml(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate YAML configuration text
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let file: ConfigFileV1 = serde_yaml::from_str(content)?;

        let version = file.version.ok_or(ConfigError::MissingVersion)?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(ConfigError::UnsupportedVersion {
                found: version,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }

        let preset = match file.preset {
            Some(name) => Preset::from_str(&name).map_err(|_| ConfigError::UnknownPreset(name))?,
            None => Preset::default(),
        };

        let mut config = Self::from_preset(preset);
        if let Some(overrides) = file.overrides {
            if let Some(abstraction) = overrides.abstraction {
                config.abstraction = abstraction;
            }
            if let Some(call_cache) = overrides.call_cache {
                config.call_cache = call_cache;
            }
            if let Some(execution) = overrides.execution {
                config.execution = execution;
            }
            if let Some(entry_points) = overrides.entry_points {
                config.entry_points = entry_points;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Export as YAML (schema v1, preset `custom`, every section overridden)
    pub fn to_yaml(&self) -> ConfigResult<String> {
        let file = ConfigFileV1 {
            version: Some(1),
            preset: Some(Preset::Custom.as_str().to_string()),
            overrides: Some(ConfigOverrides {
                abstraction: Some(self.abstraction.clone()),
                call_cache: Some(self.call_cache.clone()),
                execution: Some(self.execution.clone()),
                entry_points: if self.entry_points.is_empty() {
                    None
                } else {
                    Some(self.entry_points.clone())
                },
            }),
        };
        Ok(serde_yaml::to_string(&file)?)
    }
}
