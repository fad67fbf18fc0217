//! `which`, `env` and `config`: report without running anything.

use anyhow::Result;
use serde_json::json;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

use procrun_config::Config;
use procrun_runner::env::split_entry;
use procrun_runner::{Command, LookupError, look_path};

use super::exec::env_policy;
use crate::ExitCode;

fn lookup_exit_code(err: &LookupError) -> ExitCode {
    match err {
        LookupError::NotFound | LookupError::EmptyName => ExitCode::NOT_FOUND,
        LookupError::NotExecutable => ExitCode::NOT_EXECUTABLE,
        LookupError::CurrentDir { .. } => ExitCode::INTERNAL,
    }
}

/// Print where `name` resolves.
pub fn execute_which_command(name: &OsStr, json: bool) -> Result<ExitCode> {
    match look_path(name) {
        Ok(resolution) => {
            let implicit = resolution.is_implicit_relative();
            if json {
                let value = json!({
                    "name": name.to_string_lossy(),
                    "path": resolution.path().to_string_lossy(),
                    "implicit_relative": implicit,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else if implicit {
                println!(
                    "{} (relative to current directory, requires --allow-relative)",
                    resolution.path().display()
                );
            } else {
                println!("{}", resolution.path().display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("procrun: {:?}: {err}", name);
            Ok(lookup_exit_code(&err))
        }
    }
}

/// Print the environment a child would be given.
pub fn execute_env_command(
    dir: Option<&PathBuf>,
    vars: &[OsString],
    clear_env: bool,
    config: &Config,
) -> Result<ExitCode> {
    // The program is never launched; only its environment is computed.
    let mut cmd = Command::new("env");
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    if clear_env {
        cmd.env_clear();
    }
    for var in vars {
        let Some((key, value)) = split_entry(var) else {
            eprintln!("procrun: invalid --env value {var:?}: expected KEY=VALUE");
            return Ok(ExitCode::CLI_ARGS);
        };
        cmd.env(key, value);
    }

    cmd.env_policy(env_policy(config));
    let environ = cmd.environ();
    for entry in &environ.entries {
        println!("{}", entry.to_string_lossy());
    }
    match environ.error {
        Some(err) => {
            eprintln!("procrun: {err}");
            Ok(ExitCode::CLI_ARGS)
        }
        None => Ok(ExitCode::SUCCESS),
    }
}

/// Print every configuration key with its effective value and source.
pub fn execute_config_command(config: &Config, json: bool) -> Result<ExitCode> {
    let values = config.effective_values();
    if json {
        let entries: serde_json::Map<String, serde_json::Value> = values
            .iter()
            .map(|(key, value, source)| {
                (
                    (*key).to_string(),
                    json!({ "value": value, "source": source.to_string() }),
                )
            })
            .collect();
        let value = json!({
            "config_path": config.config_path.as_ref().map(|p| p.display().to_string()),
            "runner": entries,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(ExitCode::SUCCESS);
    }

    match &config.config_path {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: none"),
    }
    println!("\n  Effective configuration:");
    for (key, value, source) in values {
        println!("    {key} = {value} (from {source})");
    }
    Ok(ExitCode::SUCCESS)
}
