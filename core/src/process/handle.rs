//! Owned stream handles that are present or absent independently
//!
//! Closing takes the handle out of its slot, so a slot is closed at most once
//! and teardown is a single pass of "close if present" over every slot.

use super::sys;
use crate::pipe::StdStream;
use crate::{ProcessError, Result};
use std::fs::File;
use std::process::Stdio;
use tracing::warn;

/// A single nullable pipe end
#[derive(Debug)]
pub(crate) struct Handle {
    stream: StdStream,
    file: Option<File>,
}

impl Handle {
    pub(crate) fn empty(stream: StdStream) -> Self {
        Self { stream, file: None }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub(crate) fn set(&mut self, file: File) {
        debug_assert!(self.file.is_none(), "{} handle already set", self.stream);
        self.file = Some(file);
    }

    pub(crate) fn file_mut(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(ProcessError::Closed(self.stream))
    }

    pub(crate) fn take(&mut self) -> Option<File> {
        self.file.take()
    }

    /// Duplicate the handle for hand-off to a child's stdio.
    ///
    /// The duplicate is non-inheritable like the original; the launcher
    /// makes it the child's standard stream and it is closed when the
    /// command that owns it is dropped.
    pub(crate) fn to_stdio(&self) -> Result<Stdio> {
        let file = self.file.as_ref().ok_or(ProcessError::Closed(self.stream))?;
        Ok(Stdio::from(file.try_clone()?))
    }

    /// Close the handle if present. Closing an absent handle is a no-op.
    pub(crate) fn close(&mut self) -> Result<()> {
        match self.file.take() {
            Some(file) => sys::close(file),
            None => Ok(()),
        }
    }
}

/// One handle per standard stream
#[derive(Debug)]
pub(crate) struct StreamSet {
    pub(crate) stdin: Handle,
    pub(crate) stdout: Handle,
    pub(crate) stderr: Handle,
}

impl StreamSet {
    pub(crate) fn empty() -> Self {
        Self {
            stdin: Handle::empty(StdStream::Stdin),
            stdout: Handle::empty(StdStream::Stdout),
            stderr: Handle::empty(StdStream::Stderr),
        }
    }

    pub(crate) fn get_mut(&mut self, stream: StdStream) -> &mut Handle {
        match stream {
            StdStream::Stdin => &mut self.stdin,
            StdStream::Stdout => &mut self.stdout,
            StdStream::Stderr => &mut self.stderr,
        }
    }

    pub(crate) fn all_open(&self) -> bool {
        self.stdin.is_open() && self.stdout.is_open() && self.stderr.is_open()
    }

    pub(crate) fn any_open(&self) -> bool {
        self.stdin.is_open() || self.stdout.is_open() || self.stderr.is_open()
    }

    /// Close every present handle, attempting all of them.
    ///
    /// Returns the earliest failure.
    pub(crate) fn close_all(&mut self) -> Result<()> {
        let mut first_error = None;
        for handle in [&mut self.stdin, &mut self.stdout, &mut self.stderr] {
            if let Err(e) = handle.close() {
                warn!("Failed to close {} handle: {}", handle.stream, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
