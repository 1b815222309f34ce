//! Configuration loading and validation for process lifecycle tuning
//!
//! All keys are optional; a missing file section or key falls back to the
//! defaults below. Example:
//!
//! ```toml
//! pollIntervalMs = 10
//! terminateTimeoutMs = 5000
//! killTimeoutMs = 5000
//! ```

use crate::{ProcessError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

const DEFAULT_POLL_INTERVAL_MS: u64 = 10;
const DEFAULT_TERMINATE_TIMEOUT_MS: u32 = 5_000;
const DEFAULT_KILL_TIMEOUT_MS: u32 = 5_000;
const MAX_POLL_INTERVAL_MS: u64 = 1_000;

/// Tuning knobs for waits and shutdown escalation
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ProcessConfig {
    /// How often a bounded wait polls the child for exit
    pub poll_interval_ms: u64,
    /// How long `shutdown` waits after the cooperative stop signal
    pub terminate_timeout_ms: u32,
    /// How long `shutdown` waits after a forcible kill
    pub kill_timeout_ms: u32,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            terminate_timeout_ms: DEFAULT_TERMINATE_TIMEOUT_MS,
            kill_timeout_ms: DEFAULT_KILL_TIMEOUT_MS,
        }
    }
}

impl ProcessConfig {
    /// Validate the configuration with key-path error messages
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 || self.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(ProcessError::InvalidArgument(format!(
                "pollIntervalMs: must be 1..={}",
                MAX_POLL_INTERVAL_MS
            )));
        }
        if self.terminate_timeout_ms == 0 {
            return Err(ProcessError::InvalidArgument(
                "terminateTimeoutMs: must be greater than 0".to_string(),
            ));
        }
        if self.kill_timeout_ms == 0 {
            return Err(ProcessError::InvalidArgument(
                "killTimeoutMs: must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Load a process config from a TOML file path
pub fn load_config_from_toml_path(path: impl AsRef<Path>) -> Result<ProcessConfig> {
    let data = fs::read_to_string(&path).map_err(|e| {
        ProcessError::Configuration(format!("Failed to read config {:?}: {}", path.as_ref(), e))
    })?;
    load_config_from_toml_str(&data)
}

/// Load a process config from a TOML string
pub fn load_config_from_toml_str(input: &str) -> Result<ProcessConfig> {
    let cfg: ProcessConfig = toml::from_str(input)
        .map_err(|e| ProcessError::Configuration(format!("TOML parse error: {}", e)))?;
    cfg.validate()?;
    Ok(cfg)
}
