use crate::error::ConfigError;
use crate::model::{Config, MAX_STDERR_CAPTURE_BYTES};

impl Config {
    /// Reject values that cannot produce a working runner.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if let Some(bytes) = self.runner.stderr_capture_bytes {
            if bytes == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "stderr_capture_bytes".to_string(),
                    value: "must be greater than 0".to_string(),
                });
            }
            if bytes > MAX_STDERR_CAPTURE_BYTES {
                return Err(ConfigError::InvalidValue {
                    key: "stderr_capture_bytes".to_string(),
                    value: "exceeds maximum limit of 64MiB".to_string(),
                });
            }
        }

        if self.runner.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "timeout_secs".to_string(),
                value: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunnerConfig;
    use std::collections::HashMap;

    fn validate(runner: RunnerConfig) -> Result<(), ConfigError> {
        Config {
            runner,
            source_attribution: HashMap::new(),
            config_path: None,
        }
        .validate()
    }

    #[test]
    fn test_zero_capture_rejected() {
        let err = validate(RunnerConfig {
            stderr_capture_bytes: Some(0),
            ..RunnerConfig::default()
        })
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration value for stderr_capture_bytes: must be greater than 0"
        );
    }

    #[test]
    fn test_oversized_capture_rejected() {
        assert!(
            validate(RunnerConfig {
                stderr_capture_bytes: Some(MAX_STDERR_CAPTURE_BYTES + 1),
                ..RunnerConfig::default()
            })
            .is_err()
        );
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(
            validate(RunnerConfig {
                timeout_secs: Some(0),
                ..RunnerConfig::default()
            })
            .is_err()
        );
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(RunnerConfig::default()).is_ok());
        assert!(
            validate(RunnerConfig {
                wait_delay_ms: Some(0),
                ..RunnerConfig::default()
            })
            .is_ok()
        );
    }
}
