//! Portable error taxonomy for process operations
//!
//! Every raw OS failure (errno on Unix, Win32 error codes on Windows) is
//! funnelled through [`ProcessError::from_system`], so callers match on one
//! enum regardless of platform. The raw code stays available through
//! [`ProcessError::raw_os_error`] for logging.

use crate::pipe::StdStream;
use crate::process::Stage;
use thiserror::Error;

/// Errors produced by process lifecycle operations
#[derive(Error, Debug)]
pub enum ProcessError {
    /// A bounded wait expired before the child exited. This is an expected
    /// outcome, not a failure of the OS.
    #[error("Timed out waiting for process to exit")]
    Timeout,

    /// A caller-supplied value was rejected before any OS call
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not legal in the current lifecycle stage
    #[error("Cannot {operation} while process is {stage}")]
    InvalidStage {
        /// Operation that was rejected
        operation: &'static str,
        /// Stage the instance was in
        stage: Stage,
    },

    /// The stream's parent-side handle was already closed or taken
    #[error("{0} is closed")]
    Closed(StdStream),

    /// The program or a path component does not exist
    #[error("No such file or program (os error {0})")]
    NotFound(i32),

    /// The OS refused access
    #[error("Permission denied (os error {0})")]
    PermissionDenied(i32),

    /// The OS could not allocate memory
    #[error("Out of memory (os error {0})")]
    OutOfMemory(i32),

    /// The other end of a pipe was closed
    #[error("Broken pipe (os error {0})")]
    BrokenPipe(i32),

    /// A per-process or system-wide handle limit was reached
    #[error("Too many open handles (os error {0})")]
    TooManyHandles(i32),

    /// A blocking call was interrupted before it completed
    #[error("Interrupted system call (os error {0})")]
    Interrupted(i32),

    /// Any OS failure without a more specific variant
    #[error("System error (os error {0})")]
    System(i32),

    /// An I/O failure that carries no raw OS code
    #[error("I/O error: {0}")]
    Io(std::io::Error),

    /// A config file could not be read or parsed
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Global setup such as the tracing subscriber failed
    #[error("Initialization error: {0}")]
    Initialization(String),
}

impl ProcessError {
    /// Translate a raw OS error code into the portable taxonomy.
    ///
    /// Unmapped codes fall back to [`ProcessError::System`].
    pub fn from_system(code: i32) -> Self {
        crate::process::sys::classify(code)
    }

    /// Capture the calling thread's last OS error
    pub fn last_os_error() -> Self {
        std::io::Error::last_os_error().into()
    }

    /// The raw OS error code carried by this error, if any
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            ProcessError::NotFound(code)
            | ProcessError::PermissionDenied(code)
            | ProcessError::OutOfMemory(code)
            | ProcessError::BrokenPipe(code)
            | ProcessError::TooManyHandles(code)
            | ProcessError::Interrupted(code)
            | ProcessError::System(code) => Some(*code),
            ProcessError::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }

    /// Whether this is the wait-timeout outcome
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProcessError::Timeout)
    }

    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            ProcessError::Timeout => "PROC001",
            ProcessError::InvalidArgument(_) => "PROC002",
            ProcessError::InvalidStage { .. } => "PROC003",
            ProcessError::Closed(_) => "PROC004",
            ProcessError::NotFound(_) => "PROC005",
            ProcessError::PermissionDenied(_) => "PROC006",
            ProcessError::OutOfMemory(_) => "PROC007",
            ProcessError::BrokenPipe(_) => "PROC008",
            ProcessError::TooManyHandles(_) => "PROC009",
            ProcessError::Interrupted(_) => "PROC010",
            ProcessError::Io(_) => "PROC011",
            ProcessError::Configuration(_) => "PROC012",
            ProcessError::Initialization(_) => "PROC013",
            ProcessError::System(_) => "PROC999",
        }
    }
}

impl From<std::io::Error> for ProcessError {
    fn from(err: std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) => ProcessError::from_system(code),
            None => ProcessError::Io(err),
        }
    }
}

#[cfg(unix)]
impl From<nix::errno::Errno> for ProcessError {
    fn from(errno: nix::errno::Errno) -> Self {
        ProcessError::from_system(errno as i32)
    }
}

/// Result type for process operations
pub type Result<T> = std::result::Result<T, ProcessError>;
