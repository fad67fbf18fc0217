//! Configuration management for procrun
//!
//! Hierarchical configuration with discovery and precedence:
//! CLI > file > defaults. The TOML file lives at `.procrun/config.toml` and
//! holds a single `[runner]` section.

mod discovery;
mod error;
mod model;
mod validation;

pub use error::ConfigError;
pub use model::{
    CliArgs, Config, ConfigSource, DEFAULT_STDERR_CAPTURE_BYTES, MAX_STDERR_CAPTURE_BYTES,
    RunnerConfig,
};
