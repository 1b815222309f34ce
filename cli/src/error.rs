//! CLI error types

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// The command line was unusable
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The config file was rejected
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A lifecycle operation on the child failed
    #[error("Process error: {0}")]
    ProcessError(#[from] procpipe_core::ProcessError),

    /// A thread draining the child's output panicked
    #[error("Output thread for {0} panicked")]
    ReaderPanicked(procpipe_core::StdStream),

    /// Mirroring output or spawning a thread failed
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CliError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CliError::InvalidArgument(_) => "CLI002",
            CliError::ConfigError(_) => "CLI003",
            CliError::ProcessError(_) => "CLI006",
            CliError::ReaderPanicked(_) => "CLI007",
            CliError::IoError(_) => "CLI008",
        }
    }
}

/// CLI-specific result type
pub type Result<T> = std::result::Result<T, CliError>;
