//! CLI command implementations
//!
//! Each handler returns the exit code to use; only failures of procrun
//! itself come back as errors.

mod exec;
mod inspect;

pub use exec::{execute_output_command, execute_run_command};
pub use inspect::{execute_config_command, execute_env_command, execute_which_command};
