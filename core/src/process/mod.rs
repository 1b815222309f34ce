//! Child process lifecycle with piped standard streams
//!
//! A [`Process`] moves through a strict sequence of stages:
//!
//! ```text
//! Fresh --init--> Initialized --start--> Running --wait/terminate/kill--> Exited | Terminated | Killed
//!   |                  |                    |
//!   +---- failure -----+---> Failed         +--- teardown (any stage) ---> Released
//! ```
//!
//! ## Handle ownership
//!
//! - The parent-side ends (stdin-write, stdout-read, stderr-read) belong to
//!   the instance from `init` until `teardown`, `close_stdin` or `take_*`.
//! - The child-side ends belong to the instance only between `init` and
//!   `start`; `start` always closes them, whether or not the launch worked.
//! - Every slot is independently present or absent, so `teardown` works on
//!   partially initialized instances and never closes a handle twice.
//!
//! ## Process groups
//!
//! Each child is launched in its own isolated process group (Unix: a new
//! session via `setsid()`; Windows: `CREATE_NEW_PROCESS_GROUP`). The
//! cooperative stop signal sent by [`Process::terminate`] targets that group
//! only.
//!
//! ## Platform Support
//!
//! - **Unix**: `pipe2`/`killpg` via `nix`
//! - **Windows**: anonymous pipes and `CTRL_BREAK_EVENT` via `windows`

mod handle;
mod stage;
mod wait;

#[cfg(unix)]
pub(crate) mod unix;
#[cfg(unix)]
pub(crate) use self::unix as sys;

#[cfg(windows)]
pub(crate) mod win32;
#[cfg(windows)]
pub(crate) use self::win32 as sys;

pub use stage::Stage;
pub use wait::WaitTimeout;

use crate::config::ProcessConfig;
use crate::pipe::{PipeProvider, StdStream, SystemPipes};
use crate::{ProcessError, Result};
use handle::StreamSet;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus};
use tracing::{debug, error, warn};

/// A child process and the pipes connected to its standard streams
///
/// Instances are not internally synchronized: every operation takes
/// `&mut self`. To drain stdout and stderr on separate threads, move the
/// read ends out with [`take_stdout`](Self::take_stdout) and
/// [`take_stderr`](Self::take_stderr).
#[derive(Debug)]
pub struct Process {
    stage: Stage,
    config: ProcessConfig,
    /// Ends the parent keeps: stdin-write, stdout-read, stderr-read
    parent: StreamSet,
    /// Ends handed to the child: stdin-read, stdout-write, stderr-write
    child_side: StreamSet,
    child: Option<Child>,
    pid: Option<u32>,
    exit_status: Option<ExitStatus>,
}

impl Default for Process {
    fn default() -> Self {
        Self::new()
    }
}

impl Process {
    /// Create a fresh instance with the default configuration
    pub fn new() -> Self {
        Self::with_config(ProcessConfig::default())
    }

    /// Create a fresh instance with the given configuration
    pub fn with_config(config: ProcessConfig) -> Self {
        Self {
            stage: Stage::Fresh,
            config,
            parent: StreamSet::empty(),
            child_side: StreamSet::empty(),
            child: None,
            pid: None,
            exit_status: None,
        }
    }

    /// Current lifecycle stage
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// OS process id, which is also the child's process group id.
    /// `None` until a launch succeeds and after teardown.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status, once an exit has been observed
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Configuration this instance was built with
    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Create the three standard-stream pipes using OS pipes
    pub fn init(&mut self) -> Result<()> {
        self.init_with(&mut SystemPipes)
    }

    /// Create the three standard-stream pipes using `provider`.
    ///
    /// Provisioning stops at the first failure and the stage becomes
    /// [`Stage::Failed`]. Pipes created before the failure stay with the
    /// instance; [`teardown`](Self::teardown) releases them.
    pub fn init_with<P: PipeProvider + ?Sized>(&mut self, provider: &mut P) -> Result<()> {
        self.require_stage("initialize", Stage::Fresh)?;

        for stream in StdStream::ALL {
            match provider.create(stream) {
                Ok(pipe) => {
                    let (parent_end, child_end) = pipe.split(stream);
                    self.parent.get_mut(stream).set(parent_end);
                    self.child_side.get_mut(stream).set(child_end);
                }
                Err(e) => {
                    error!("Failed to create {} pipe: {}", stream, e);
                    self.stage = Stage::Failed;
                    return Err(e);
                }
            }
        }

        debug!("Created standard stream pipes");
        self.stage = Stage::Initialized;
        Ok(())
    }

    /// Launch `argv[0]` with `argv[1..]` as arguments, wired to the pipes.
    ///
    /// The child inherits the caller's environment and working directory
    /// and is placed in its own process group. The child-side pipe ends are
    /// closed afterwards regardless of the outcome; a launch failure takes
    /// priority over a close failure. If the launch succeeded but a close
    /// failed, the child is kept so it can still be stopped, and the close
    /// error is returned.
    ///
    /// ## Example
    ///
    /// ```rust,no_run
    /// use procpipe_core::{Process, WaitTimeout};
    ///
    /// let mut process = Process::new();
    /// process.init()?;
    /// process.start(&["echo", "hello"])?;
    /// process.wait(WaitTimeout::Infinite)?;
    /// process.teardown()?;
    /// # Ok::<(), procpipe_core::ProcessError>(())
    /// ```
    pub fn start<S: AsRef<OsStr>>(&mut self, argv: &[S]) -> Result<()> {
        self.require_stage("start", Stage::Initialized)?;
        if !self.parent.all_open() || !self.child_side.all_open() || self.child.is_some() {
            return Err(ProcessError::InvalidStage {
                operation: "start",
                stage: self.stage,
            });
        }
        let (program, args) = validate_argv(argv)?;
        let command_line = join_command_line(argv);

        debug!("Launching process: {}", command_line);
        let launched = self.launch(program, args);
        let closed = self.child_side.close_all();

        match settle_launch(launched, closed) {
            Err(e) => {
                error!("Failed to launch '{}': {}", command_line, e);
                self.stage = Stage::Failed;
                Err(e)
            }
            Ok((child, closed)) => {
                let pid = child.id();
                debug!("Launched process {} in its own process group", pid);
                self.child = Some(child);
                self.pid = Some(pid);
                self.stage = Stage::Running;
                closed
            }
        }
    }

    fn launch(&self, program: &OsStr, args: &[impl AsRef<OsStr>]) -> Result<Child> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(self.child_side.stdin.to_stdio()?)
            .stdout(self.child_side.stdout.to_stdio()?)
            .stderr(self.child_side.stderr.to_stdio()?);
        sys::isolate_process_group(&mut command);

        // The duplicated child ends held by `command` close when it drops
        Ok(command.spawn()?)
    }

    /// Write once to the child's stdin; the count may be short
    pub fn write_stdin(&mut self, buf: &[u8]) -> Result<usize> {
        self.require_launched("write to stdin")?;
        Ok(self.parent.stdin.file_mut()?.write(buf)?)
    }

    /// Write all of `buf` to the child's stdin, looping over short writes
    pub fn write_stdin_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            match self.write_stdin(buf)? {
                0 => return Err(ProcessError::Io(io::ErrorKind::WriteZero.into())),
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }

    /// Close the child's stdin so it observes end-of-input
    pub fn close_stdin(&mut self) -> Result<()> {
        self.require_launched("close stdin")?;
        self.parent.stdin.close()
    }

    /// Read once from the child's stdout. `Ok(0)` means end-of-stream.
    pub fn read_stdout(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.read_stream(StdStream::Stdout, buf)
    }

    /// Read once from the child's stderr. `Ok(0)` means end-of-stream.
    pub fn read_stderr(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.read_stream(StdStream::Stderr, buf)
    }

    fn read_stream(&mut self, stream: StdStream, buf: &mut [u8]) -> Result<usize> {
        self.require_launched("read")?;
        Ok(self.parent.get_mut(stream).file_mut()?.read(buf)?)
    }

    /// Move the stdout read end out of the instance
    pub fn take_stdout(&mut self) -> Option<ChildOutput> {
        self.take_output(StdStream::Stdout)
    }

    /// Move the stderr read end out of the instance
    pub fn take_stderr(&mut self) -> Option<ChildOutput> {
        self.take_output(StdStream::Stderr)
    }

    fn take_output(&mut self, stream: StdStream) -> Option<ChildOutput> {
        if !self.stage.is_launched() {
            return None;
        }
        self.parent
            .get_mut(stream)
            .take()
            .map(|file| ChildOutput { stream, file })
    }

    /// Wait up to `timeout` for the child to exit.
    ///
    /// Returns [`ProcessError::Timeout`] if it is still running. Waiting does
    /// not stop the child, and a successful wait does not mean the wait
    /// caused the exit.
    pub fn wait(&mut self, timeout: impl Into<WaitTimeout>) -> Result<ExitStatus> {
        let status = self.wait_inner("wait", timeout.into())?;
        if self.stage == Stage::Running {
            self.stage = Stage::Exited;
        }
        Ok(status)
    }

    /// Send the cooperative stop signal to the child's process group, then
    /// wait up to `timeout`.
    ///
    /// If the signal cannot be delivered the error is returned without
    /// waiting. A timeout leaves the child running so the caller can
    /// escalate to [`kill`](Self::kill).
    pub fn terminate(&mut self, timeout: impl Into<WaitTimeout>) -> Result<ExitStatus> {
        self.require_launched("terminate")?;
        if let Some(status) = self.exit_status {
            // Already reaped: the pid may belong to someone else by now
            return Ok(status);
        }
        let pid = self.running_pid("terminate")?;
        if let Some(status) = self.poll_exit()? {
            self.stage = Stage::Exited;
            return Ok(status);
        }

        sys::signal_group(pid)?;
        let status = self.wait_inner("terminate", timeout.into())?;
        self.stage = Stage::Terminated;
        Ok(status)
    }

    /// Forcibly kill the child, then wait up to `timeout`.
    ///
    /// The child gets no chance to clean up and its exit status carries no
    /// meaning. A failed kill request is returned without waiting.
    pub fn kill(&mut self, timeout: impl Into<WaitTimeout>) -> Result<ExitStatus> {
        self.require_launched("kill")?;
        if let Some(status) = self.exit_status {
            return Ok(status);
        }
        let child = self.child.as_mut().ok_or(ProcessError::InvalidStage {
            operation: "kill",
            stage: self.stage,
        })?;

        debug!("Killing process {}", child.id());
        child.kill().map_err(|e| {
            error!("Failed to kill process {}: {}", child.id(), e);
            ProcessError::from(e)
        })?;
        let status = self.wait_inner("kill", timeout.into())?;
        self.stage = Stage::Killed;
        Ok(status)
    }

    /// Forcibly kill every process left in the child's process group.
    ///
    /// Unlike [`kill`](Self::kill) this also reaches descendants that share
    /// the group, such as a shell's background jobs still holding the output
    /// pipes. It may be called after the child itself has exited: a group id
    /// is not reused while the group has members, and an empty group is not
    /// an error. The stage is left unchanged. On Windows only the leader can
    /// be stopped, so this does nothing there.
    pub fn kill_group(&mut self) -> Result<()> {
        self.require_launched("kill group")?;
        let pgid = self.running_pid("kill group")?;
        sys::kill_group(pgid)
    }

    /// Stop the child using the configured timeouts: the cooperative signal
    /// first, then a forcible kill if it is still running.
    pub fn shutdown(&mut self) -> Result<ExitStatus> {
        let terminate_timeout = WaitTimeout::from_millis(self.config.terminate_timeout_ms);
        match self.terminate(terminate_timeout) {
            Err(ProcessError::Timeout) => {
                warn!(
                    "Process {:?} did not exit within {:?}, killing it",
                    self.pid, terminate_timeout
                );
                self.kill(WaitTimeout::from_millis(self.config.kill_timeout_ms))
            }
            other => other,
        }
    }

    /// Close every handle still held and release the process reference.
    ///
    /// Does not wait for or kill the child; a child still running is left
    /// detached. Every handle is attempted even if an earlier close fails,
    /// and the first failure is returned. Calling this again is a no-op.
    pub fn teardown(&mut self) -> Result<()> {
        if self.stage == Stage::Released {
            return Ok(());
        }

        let parent = self.parent.close_all();
        let leftover = self.child_side.close_all();
        if let Some(child) = self.child.take() {
            if self.exit_status.is_none() {
                debug!("Detaching from process {} without waiting", child.id());
            }
        }
        self.pid = None;
        self.stage = Stage::Released;
        debug!("Released process handles");

        parent.and(leftover)
    }

    fn wait_inner(&mut self, operation: &'static str, timeout: WaitTimeout) -> Result<ExitStatus> {
        self.require_launched(operation)?;
        let poll = self.config.poll_interval();
        let stage = self.stage;
        let child = self
            .child
            .as_mut()
            .ok_or(ProcessError::InvalidStage { operation, stage })?;

        let status = wait::wait_child(child, timeout, poll)?;
        if self.exit_status.is_none() {
            debug!("Process {} exited with {}", child.id(), status);
        }
        self.exit_status = Some(status);
        Ok(status)
    }

    fn poll_exit(&mut self) -> Result<Option<ExitStatus>> {
        match self.wait_inner("poll", WaitTimeout::Immediate) {
            Ok(status) => Ok(Some(status)),
            Err(ProcessError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn running_pid(&self, operation: &'static str) -> Result<u32> {
        self.pid.ok_or(ProcessError::InvalidStage {
            operation,
            stage: self.stage,
        })
    }

    fn require_stage(&self, operation: &'static str, expected: Stage) -> Result<()> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(ProcessError::InvalidStage {
                operation,
                stage: self.stage,
            })
        }
    }

    fn require_launched(&self, operation: &'static str) -> Result<()> {
        if self.stage.is_launched() {
            Ok(())
        } else {
            Err(ProcessError::InvalidStage {
                operation,
                stage: self.stage,
            })
        }
    }

    #[cfg(test)]
    pub(crate) fn holds_child_side_handles(&self) -> bool {
        self.child_side.any_open()
    }

    #[cfg(test)]
    pub(crate) fn holds_parent_handles(&self) -> bool {
        self.parent.any_open()
    }
}

/// A read end moved out of a [`Process`]; closed when dropped
#[derive(Debug)]
pub struct ChildOutput {
    stream: StdStream,
    file: File,
}

impl ChildOutput {
    /// Which stream this end reads
    pub fn stream(&self) -> StdStream {
        self.stream
    }
}

impl Read for ChildOutput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

fn validate_argv<S: AsRef<OsStr>>(argv: &[S]) -> Result<(&OsStr, &[S])> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| ProcessError::InvalidArgument("argument vector is empty".to_string()))?;
    let program = program.as_ref();
    if program.is_empty() {
        return Err(ProcessError::InvalidArgument(
            "program name is empty".to_string(),
        ));
    }
    if let Some(index) = argv
        .iter()
        .position(|arg| arg.as_ref().as_encoded_bytes().contains(&0))
    {
        return Err(ProcessError::InvalidArgument(format!(
            "argument {} contains a NUL byte",
            index
        )));
    }
    Ok((program, args))
}

/// Combine a launch outcome with the closing of the child-side ends.
///
/// A launch failure wins over any close failure. A launched child is always
/// kept, together with the close result, so it can still be stopped.
fn settle_launch<T>(launched: Result<T>, closed: Result<()>) -> Result<(T, Result<()>)> {
    launched.map(|child| (child, closed))
}

/// Whitespace-joined rendering of `argv` for diagnostics
fn join_command_line<S: AsRef<OsStr>>(argv: &[S]) -> String {
    argv.iter()
        .map(|arg| arg.as_ref().to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
