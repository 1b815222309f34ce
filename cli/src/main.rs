//! procpipe CLI binary
//!
//! Runs one command with piped standard streams, mirrors its output and
//! exits with its exit code.

use clap::{Parser, Subcommand};
use cli::{run, CliError, RunOptions, TIMEOUT_EXIT_CODE};
use procpipe_core::config::load_config_from_toml_path;
use procpipe_core::{ProcessConfig, WaitTimeout};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "procpipe")]
#[command(about = "Run a command with piped stdio, a timeout and clean shutdown")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Path to a TOML config with poll interval and shutdown timeouts
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a command and wait for it to finish
    Run {
        /// Text written to the command's stdin before it is closed
        #[arg(long)]
        input: Option<String>,
        /// Milliseconds to wait before shutting the command down
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u32>,
        /// Program and arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        argv: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = procpipe_core::utils::init_tracing(&cli.log_level) {
        eprintln!("procpipe: {}", e);
    }

    match execute(cli) {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(e) => {
            error!("[{}] {}", e.code(), e);
            eprintln!("procpipe: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> cli::Result<i32> {
    let config = match &cli.config {
        Some(path) => load_config_from_toml_path(path)
            .map_err(|e| CliError::ConfigError(e.to_string()))?,
        None => ProcessConfig::default(),
    };

    match cli.command {
        Commands::Run {
            input,
            timeout_ms,
            argv,
        } => {
            let options = RunOptions {
                argv,
                input: input.map(String::into_bytes),
                timeout: timeout_ms.map_or(WaitTimeout::Infinite, WaitTimeout::from_millis),
                config,
            };
            let output = run(&options)?;

            std::io::stdout().write_all(&output.stdout)?;
            std::io::stderr().write_all(&output.stderr)?;
            if output.timed_out {
                eprintln!("procpipe: timed out, exiting with {}", TIMEOUT_EXIT_CODE);
            }
            Ok(output.exit_code())
        }
    }
}
