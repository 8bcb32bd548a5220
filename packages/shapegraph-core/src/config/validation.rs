//! Configuration validation

use super::error::{ConfigError, ConfigResult};

/// A configuration section that can check its own invariants
pub trait Validatable {
    fn validate(&self) -> ConfigResult<()>;

    /// Section name used to prefix cross-field errors
    fn config_name(&self) -> &'static str {
        "Config"
    }
}

/// Validate one section of a larger configuration.
///
/// Range errors already name their field; cross-field errors get the
/// section name in front so the YAML key can be located.
pub(super) fn validate_section(section: &dyn Validatable) -> ConfigResult<()> {
    section.validate().map_err(|e| match e {
        ConfigError::Validation(msg) => {
            ConfigError::Validation(format!("{}: {}", section.config_name(), msg))
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl Validatable for Broken {
        fn validate(&self) -> ConfigResult<()> {
            Err(ConfigError::Validation("thresholds out of order".into()))
        }

        fn config_name(&self) -> &'static str {
            "BrokenConfig"
        }
    }

    #[test]
    fn test_section_name_prefixes_cross_field_errors() {
        let err = validate_section(&Broken).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: BrokenConfig: thresholds out of order"
        );
    }
}
