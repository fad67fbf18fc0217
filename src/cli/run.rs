//! CLI entry point and dispatch logic
//!
//! This module owns the `run()` function which:
//! - Parses CLI arguments
//! - Initializes logging
//! - Builds CliArgs and discovers Config
//! - Creates the tokio runtime
//! - Dispatches to command handlers
//! - Handles all error output

use clap::Parser;
use tracing::debug;

use super::args::{Cli, Commands};
use super::commands;

use crate::logging::init_tracing;
use crate::{CliArgs, Config, ExitCode};

/// Configuration overrides carried by the chosen subcommand.
fn cli_args(cli: &Cli) -> CliArgs {
    let mut args = CliArgs {
        config_path: cli.config.clone(),
        ..CliArgs::default()
    };
    match &cli.command {
        Commands::Run { exec } | Commands::Output { exec, .. } => {
            args.timeout_secs = exec.timeout;
            args.wait_delay_ms = exec.wait_delay_ms;
            args.allow_implicit_relative = exec.allow_relative.then_some(true);
        }
        Commands::Env {
            case_insensitive, ..
        } => {
            args.env_case_insensitive = case_insensitive.then_some(true);
        }
        Commands::Which { .. } | Commands::Config { .. } => {}
    }
    if let Commands::Output {
        stderr_capture_bytes,
        ..
    } = &cli.command
    {
        args.stderr_capture_bytes = *stderr_capture_bytes;
    }
    args
}

/// Main CLI execution function.
///
/// Handles ALL output including errors. On failure returns the exit code
/// main should exit with; main does not print.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose, cli.log_json) {
        eprintln!("procrun: failed to initialize logging: {e}");
    }

    let cli_args = cli_args(&cli);
    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("procrun: {err:#}");
            return Err(ExitCode::CLI_ARGS);
        }
    };
    debug!(config_path = ?config.config_path, "configuration loaded");

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("procrun: failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let result = rt.block_on(async {
        match &cli.command {
            Commands::Run { exec } => commands::execute_run_command(exec, &config).await,
            Commands::Output { exec, combined, .. } => {
                commands::execute_output_command(exec, *combined, &config).await
            }
            Commands::Which { name, json } => commands::execute_which_command(name, *json),
            Commands::Env {
                dir,
                vars,
                clear_env,
                ..
            } => commands::execute_env_command(dir.as_ref(), vars, *clear_env, &config),
            Commands::Config { json } => commands::execute_config_command(&config, *json),
        }
    });

    // A child left behind by a timed-out copy must not keep the runtime alive.
    rt.shutdown_background();

    match result {
        Ok(code) if code == ExitCode::SUCCESS => Ok(()),
        Ok(code) => Err(code),
        Err(err) => {
            eprintln!("procrun: {err:#}");
            Err(ExitCode::INTERNAL)
        }
    }
}
