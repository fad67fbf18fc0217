use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::model::{CliArgs, Config, ConfigSource, RunnerConfig};

/// Directory holding the config file, relative to a search directory.
const CONFIG_DIR: &str = ".procrun";
const CONFIG_FILE: &str = "config.toml";

/// Markers that end the upward search.
const REPO_MARKERS: [&str; 3] = [".git", ".hg", ".svn"];

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    runner: Option<RunnerConfig>,
}

/// Copy `value` into `slot` when present, recording where it came from.
fn layer<T>(
    slot: &mut Option<T>,
    value: Option<T>,
    key: &str,
    source: &ConfigSource,
    attribution: &mut HashMap<String, ConfigSource>,
) {
    if value.is_some() {
        *slot = value;
        attribution.insert(key.to_string(), source.clone());
    }
}

fn layer_runner(
    runner: &mut RunnerConfig,
    values: RunnerConfig,
    source: &ConfigSource,
    attribution: &mut HashMap<String, ConfigSource>,
) {
    layer(
        &mut runner.stderr_capture_bytes,
        values.stderr_capture_bytes,
        "stderr_capture_bytes",
        source,
        attribution,
    );
    layer(
        &mut runner.wait_delay_ms,
        values.wait_delay_ms,
        "wait_delay_ms",
        source,
        attribution,
    );
    layer(
        &mut runner.allow_implicit_relative,
        values.allow_implicit_relative,
        "allow_implicit_relative",
        source,
        attribution,
    );
    layer(
        &mut runner.timeout_secs,
        values.timeout_secs,
        "timeout_secs",
        source,
        attribution,
    );
    layer(
        &mut runner.env_case_insensitive,
        values.env_case_insensitive,
        "env_case_insensitive",
        source,
        attribution,
    );
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// Uses the current working directory for config file discovery when no
    /// explicit path is provided in `cli_args`.
    pub fn discover(cli_args: &CliArgs) -> Result<Self> {
        let start_dir = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover and load configuration starting from a specific directory
    ///
    /// This is the path-driven variant used by tests to avoid process-global state.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self> {
        let mut source_attribution = HashMap::new();
        for key in Self::KEYS {
            source_attribution.insert(key.to_string(), ConfigSource::Defaults);
        }
        let mut runner = RunnerConfig::default();

        let config_path = match &cli_args.config_path {
            Some(explicit) => Some(explicit.clone()),
            None => Self::discover_config_file_from(start_dir),
        };

        if let Some(path) = &config_path {
            let file_config = Self::load_config_file(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?;
            if let Some(file_runner) = file_config.runner {
                let source = ConfigSource::ConfigFile(path.clone());
                layer_runner(&mut runner, file_runner, &source, &mut source_attribution);
            }
            debug!(path = %path.display(), "loaded config file");
        }

        let cli_runner = RunnerConfig {
            stderr_capture_bytes: cli_args.stderr_capture_bytes,
            wait_delay_ms: cli_args.wait_delay_ms,
            allow_implicit_relative: cli_args.allow_implicit_relative,
            timeout_secs: cli_args.timeout_secs,
            env_case_insensitive: cli_args.env_case_insensitive,
        };
        layer_runner(
            &mut runner,
            cli_runner,
            &ConfigSource::Cli,
            &mut source_attribution,
        );

        let config = Self {
            runner,
            source_attribution,
            config_path,
        };
        config.validate()?;
        Ok(config)
    }

    /// Search upward from `start_dir` for `.procrun/config.toml`.
    ///
    /// Stops at the filesystem root or at the first repository root
    /// (`.git`, `.hg` or `.svn`).
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        let mut current = Some(start_dir);
        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_DIR).join(CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }
            if REPO_MARKERS.iter().any(|marker| dir.join(marker).exists()) {
                break;
            }
            current = dir.parent();
        }
        None
    }

    /// Load configuration from TOML file
    fn load_config_file(path: &Path) -> Result<TomlConfig> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).with_context(|| {
                format!("Failed to parse TOML config file: {}", path.display())
            }),
            // Missing config file is OK - defaults apply
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TomlConfig::default()),
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let config_dir = dir.join(CONFIG_DIR);
        fs::create_dir_all(&config_dir).unwrap();
        let path = config_dir.join(CONFIG_FILE);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join(".git")).unwrap();

        let config = Config::discover_from(root.path(), &CliArgs::default()).unwrap();
        assert!(config.config_path.is_none());
        assert_eq!(config.stderr_capture_bytes(), 32768);
        assert_eq!(
            config.get_source("stderr_capture_bytes"),
            Some(&ConfigSource::Defaults)
        );
    }

    #[test]
    fn test_discovers_file_in_parent() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join(".git")).unwrap();
        let path = write_config(root.path(), "[runner]\nwait_delay_ms = 500\n");
        let nested = root.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let config = Config::discover_from(&nested, &CliArgs::default()).unwrap();
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(config.runner.wait_delay_ms, Some(500));
        assert_eq!(
            config.get_source("wait_delay_ms"),
            Some(&ConfigSource::ConfigFile(path))
        );
    }

    #[test]
    fn test_search_stops_at_repository_root() {
        let outer = TempDir::new().unwrap();
        write_config(outer.path(), "[runner]\ntimeout_secs = 5\n");
        let repo = outer.path().join("repo");
        fs::create_dir_all(repo.join(".hg")).unwrap();

        assert!(Config::discover_config_file_from(&repo).is_none());
    }

    #[test]
    fn test_cli_overrides_file() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join(".git")).unwrap();
        write_config(
            root.path(),
            "[runner]\nstderr_capture_bytes = 1024\nallow_implicit_relative = false\n",
        );

        let cli = CliArgs {
            allow_implicit_relative: Some(true),
            ..CliArgs::default()
        };
        let config = Config::discover_from(root.path(), &cli).unwrap();
        assert_eq!(config.stderr_capture_bytes(), 1024);
        assert!(config.allow_implicit_relative());
        assert_eq!(
            config.get_source("allow_implicit_relative"),
            Some(&ConfigSource::Cli)
        );
    }

    #[test]
    fn test_explicit_path_skips_discovery() {
        let root = TempDir::new().unwrap();
        let explicit = root.path().join("custom.toml");
        fs::write(&explicit, "[runner]\ntimeout_secs = 9\n").unwrap();

        let cli = CliArgs {
            config_path: Some(explicit.clone()),
            ..CliArgs::default()
        };
        let config = Config::discover_from(root.path(), &cli).unwrap();
        assert_eq!(config.timeout(), Some(std::time::Duration::from_secs(9)));
        assert_eq!(config.config_path, Some(explicit));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join(".git")).unwrap();
        write_config(root.path(), "[runner]\nstderr_capture_bytes = 0\n");

        let err = Config::discover_from(root.path(), &CliArgs::default()).unwrap_err();
        assert!(err.to_string().contains("stderr_capture_bytes"));
    }

    #[test]
    fn test_unknown_key_is_a_parse_error() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join(".git")).unwrap();
        write_config(root.path(), "[runner]\nshell = true\n");

        let err = Config::discover_from(root.path(), &CliArgs::default()).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse TOML"));
    }
}
