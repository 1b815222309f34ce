//! Pipe provisioning for the three standard streams
//!
//! Each standard stream gets one unidirectional byte pipe. Both ends are
//! created non-inheritable; the child-owned end only becomes inheritable
//! inside the launch itself, so a concurrent spawn elsewhere in the process
//! never picks up our ends and end-of-stream is observed as soon as the child
//! exits.

use crate::process::sys;
use crate::Result;
use std::fmt;
use std::fs::File;

/// One of the child's standard streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StdStream {
    /// Child standard input (parent writes)
    Stdin,
    /// Child standard output (parent reads)
    Stdout,
    /// Child standard error (parent reads)
    Stderr,
}

impl StdStream {
    /// All streams in provisioning order
    pub const ALL: [StdStream; 3] = [StdStream::Stdin, StdStream::Stdout, StdStream::Stderr];

    /// Stream name used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            StdStream::Stdin => "stdin",
            StdStream::Stdout => "stdout",
            StdStream::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StdStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unidirectional byte pipe: bytes written to `writer` are read from
/// `reader` in the same order, without framing.
#[derive(Debug)]
pub struct Pipe {
    /// Read end
    pub reader: File,
    /// Write end
    pub writer: File,
}

impl Pipe {
    /// Partition the pipe into `(parent_end, child_end)` for `stream`
    pub fn split(self, stream: StdStream) -> (File, File) {
        match stream {
            StdStream::Stdin => (self.writer, self.reader),
            StdStream::Stdout | StdStream::Stderr => (self.reader, self.writer),
        }
    }
}

/// Source of pipes consumed by [`Process::init_with`](crate::Process::init_with)
pub trait PipeProvider {
    /// Create the pipe that will carry `stream`
    fn create(&mut self, stream: StdStream) -> Result<Pipe>;
}

/// Pipes backed by the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPipes;

impl PipeProvider for SystemPipes {
    fn create(&mut self, stream: StdStream) -> Result<Pipe> {
        let pipe = sys::create_pipe()?;
        tracing::trace!("Created {} pipe", stream);
        Ok(pipe)
    }
}
