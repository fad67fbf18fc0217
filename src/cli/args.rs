//! CLI argument definitions and parsing structures

use clap::{Args, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// procrun - run external programs with supervised stdio and cancellation
#[derive(Parser, Debug)]
#[command(name = "procrun")]
#[command(about = "Run external programs with supervised stdio, bounded stderr capture and cancellation")]
#[command(long_about = r#"
procrun starts a program directly (argv-style, never through a shell), bridges
its standard streams, and terminates it cleanly on timeout or Ctrl-C.

EXAMPLES:
  # Run a program with inherited stdio, killing it after 30 seconds
  procrun run --timeout 30 -- make test

  # Capture stdout; on failure the tail of stderr is printed
  procrun output -- git rev-parse HEAD

  # Capture stdout and stderr interleaved
  procrun output --combined -- cargo --version

  # Show how a program name resolves
  procrun which python3

  # Show the environment a child would receive
  procrun env --clear-env --env A=1 --env A=2

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults
  Config file is discovered by searching upward from CWD for .procrun/config.toml
  Use --config to specify an explicit config file path

EXIT STATUS:
  The child's exit status is propagated (128+N for signal N). procrun itself
  exits 124 on timeout, 130 on interrupt, 126/127 when the program cannot be
  executed or found, 125 on internal failure and 2 on invalid usage.
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON records on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a program with inherited stdio and report its exit status
    Run {
        #[command(flatten)]
        exec: ExecArgs,
    },

    /// Run a program and print its captured output
    Output {
        /// Capture stdout and stderr interleaved in one stream
        #[arg(long)]
        combined: bool,

        /// Bytes of stderr kept at each end of the failure excerpt
        #[arg(long)]
        stderr_capture_bytes: Option<usize>,

        #[command(flatten)]
        exec: ExecArgs,
    },

    /// Show how a program name resolves against PATH
    Which {
        /// Program name or path
        name: OsString,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the normalized environment a child would receive
    Env {
        /// Working directory (adds PWD on Unix)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Set a variable (KEY=VALUE), may be repeated
        #[arg(long = "env", value_name = "KEY=VALUE")]
        vars: Vec<OsString>,

        /// Start from an empty environment instead of inheriting
        #[arg(long)]
        clear_env: bool,

        /// Compare keys ignoring case
        #[arg(long)]
        case_insensitive: bool,
    },

    /// Print the effective configuration and where each value came from
    Config {
        /// Print the configuration as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Options shared by commands that launch a program.
#[derive(Args, Debug, Clone)]
pub struct ExecArgs {
    /// Working directory for the program
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Set a variable (KEY=VALUE), may be repeated
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub vars: Vec<OsString>,

    /// Start from an empty environment instead of inheriting
    #[arg(long)]
    pub clear_env: bool,

    /// Terminate the program after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Grace period for I/O after exit and for termination after cancellation
    #[arg(long, value_name = "MS")]
    pub wait_delay_ms: Option<u64>,

    /// Allow running executables found through a relative PATH entry
    #[arg(long)]
    pub allow_relative: bool,

    /// Program to run followed by its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true, value_name = "PROGRAM")]
    pub program: Vec<OsString>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_collects_trailing_arguments() {
        let cli = Cli::try_parse_from([
            "procrun", "run", "--timeout", "5", "--env", "A=1", "--", "sh", "-c", "exit 3",
        ])
        .unwrap();
        let Commands::Run { exec } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(exec.timeout, Some(5));
        assert_eq!(exec.vars, vec![OsString::from("A=1")]);
        assert_eq!(
            exec.program,
            vec![
                OsString::from("sh"),
                OsString::from("-c"),
                OsString::from("exit 3")
            ]
        );
    }

    #[test]
    fn test_program_is_required() {
        assert!(Cli::try_parse_from(["procrun", "output"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["procrun", "config", "--verbose", "--json"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Config { json: true }));
    }
}
