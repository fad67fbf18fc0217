use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default capacity of each half of the stderr excerpt (32 KiB)
pub const DEFAULT_STDERR_CAPTURE_BYTES: usize = 32 << 10;

/// Upper bound accepted for `stderr_capture_bytes` (64 MiB)
pub const MAX_STDERR_CAPTURE_BYTES: usize = 64 << 20;

/// `[runner]` section of the config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    pub stderr_capture_bytes: Option<usize>,
    pub wait_delay_ms: Option<u64>,
    pub allow_implicit_relative: Option<bool>,
    pub timeout_secs: Option<u64>,
    pub env_case_insensitive: Option<bool>,
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// Explicit config file; disables discovery.
    pub config_path: Option<PathBuf>,
    pub stderr_capture_bytes: Option<usize>,
    pub wait_delay_ms: Option<u64>,
    pub allow_implicit_relative: Option<bool>,
    pub timeout_secs: Option<u64>,
    pub env_case_insensitive: Option<bool>,
}

/// Source of a configuration value for attribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Cli,
    ConfigFile(PathBuf),
    Defaults,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::ConfigFile(path) => write!(f, "config file ({})", path.display()),
            Self::Defaults => write!(f, "defaults"),
        }
    }
}

/// Effective configuration with per-key source attribution.
#[derive(Debug, Clone)]
pub struct Config {
    pub runner: RunnerConfig,
    pub source_attribution: HashMap<String, ConfigSource>,
    /// Config file that was loaded, if any.
    pub config_path: Option<PathBuf>,
}

impl Config {
    /// Keys known to the `[runner]` section, in display order.
    pub const KEYS: [&'static str; 5] = [
        "stderr_capture_bytes",
        "wait_delay_ms",
        "allow_implicit_relative",
        "timeout_secs",
        "env_case_insensitive",
    ];

    #[must_use]
    pub fn stderr_capture_bytes(&self) -> usize {
        self.runner
            .stderr_capture_bytes
            .unwrap_or(DEFAULT_STDERR_CAPTURE_BYTES)
    }

    #[must_use]
    pub fn wait_delay(&self) -> Option<Duration> {
        self.runner.wait_delay_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub fn allow_implicit_relative(&self) -> bool {
        self.runner.allow_implicit_relative.unwrap_or(false)
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.runner.timeout_secs.map(Duration::from_secs)
    }

    /// Defaults to the platform's own rule (case-insensitive on Windows).
    #[must_use]
    pub fn env_case_insensitive(&self) -> bool {
        self.runner.env_case_insensitive.unwrap_or(cfg!(windows))
    }

    /// Where the value of `key` came from.
    #[must_use]
    pub fn get_source(&self, key: &str) -> Option<&ConfigSource> {
        self.source_attribution.get(key)
    }

    /// Effective value and source of every key, for display.
    #[must_use]
    pub fn effective_values(&self) -> Vec<(&'static str, String, ConfigSource)> {
        let unset = || "unset".to_string();
        Self::KEYS
            .iter()
            .map(|&key| {
                let value = match key {
                    "stderr_capture_bytes" => self.stderr_capture_bytes().to_string(),
                    "wait_delay_ms" => self.runner.wait_delay_ms.map_or_else(unset, |v| v.to_string()),
                    "allow_implicit_relative" => self.allow_implicit_relative().to_string(),
                    "timeout_secs" => self.runner.timeout_secs.map_or_else(unset, |v| v.to_string()),
                    _ => self.env_case_insensitive().to_string(),
                };
                let source = self
                    .get_source(key)
                    .cloned()
                    .unwrap_or(ConfigSource::Defaults);
                (key, value, source)
            })
            .collect()
    }
}
