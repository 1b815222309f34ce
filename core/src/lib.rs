//! Core functionality for procpipe
//!
//! Spawns a single child process with its standard streams connected to
//! pipes, exposes blocking I/O and bounded waits over it, stops it
//! cooperatively or forcibly, and releases every OS handle exactly once.

pub mod config;
pub mod error;
pub mod pipe;
pub mod process;


pub use config::{load_config_from_toml_path, load_config_from_toml_str, ProcessConfig};
pub use error::{ProcessError, Result};
pub use pipe::{Pipe, PipeProvider, StdStream, SystemPipes};
pub use process::{ChildOutput, Process, Stage, WaitTimeout};

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    ///
    /// `RUST_LOG` takes precedence over `level` when set.
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| crate::ProcessError::Initialization(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
