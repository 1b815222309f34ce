//! Run a single command through procpipe and collect its output
//!
//! The command's stdout and stderr are drained on their own threads while
//! the calling thread feeds stdin and enforces the timeout, so a chatty
//! child never blocks on a full pipe.

pub mod error;

pub use error::{CliError, Result};

use procpipe_core::{ChildOutput, Process, ProcessConfig, ProcessError, StdStream, WaitTimeout};
use std::io::{self, Read};
use std::process::ExitStatus;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Exit code reported when the command had to be stopped after its timeout
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// What to run and how
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Program followed by its arguments
    pub argv: Vec<String>,
    /// Bytes written to the child's stdin before it is closed
    pub input: Option<Vec<u8>>,
    /// How long to wait before stopping the child
    pub timeout: WaitTimeout,
    /// Poll interval and shutdown timeouts
    pub config: ProcessConfig,
}

/// Everything the command produced
#[derive(Debug)]
pub struct RunOutput {
    /// Captured standard output
    pub stdout: Vec<u8>,
    /// Captured standard error
    pub stderr: Vec<u8>,
    /// How the child exited
    pub status: ExitStatus,
    /// Whether the child was stopped because the timeout expired
    pub timed_out: bool,
}

impl RunOutput {
    /// Exit code to mirror: the child's own code, `128 + signal` for a
    /// signalled child, or [`TIMEOUT_EXIT_CODE`] after a timeout
    pub fn exit_code(&self) -> i32 {
        if self.timed_out {
            return TIMEOUT_EXIT_CODE;
        }
        if let Some(code) = self.status.code() {
            return code;
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = self.status.signal() {
                return 128 + signal;
            }
        }
        1
    }
}

/// Run the command described by `options` to completion.
///
/// The input is written in full before the timeout starts counting, so a
/// child that never reads more than a pipe buffer of input will block the
/// run.
pub fn run(options: &RunOptions) -> Result<RunOutput> {
    if options.argv.is_empty() {
        return Err(CliError::InvalidArgument("no command given".to_string()));
    }

    let mut process = Process::with_config(options.config.clone());
    let result = drive(&mut process, options);
    if result.is_err() && process.stage() == procpipe_core::Stage::Running {
        warn!("Run failed, killing process {:?}", process.pid());
        if let Err(e) = process.kill(WaitTimeout::from_millis(options.config.kill_timeout_ms)) {
            warn!("Failed to kill process {:?}: {}", process.pid(), e);
        }
    }
    let released = process.teardown();

    let output = result?;
    released?;
    Ok(output)
}

fn drive(process: &mut Process, options: &RunOptions) -> Result<RunOutput> {
    process.init()?;
    process.start(options.argv.as_slice())?;
    info!("Started '{}' as pid {:?}", options.argv[0], process.pid());

    let stdout = process
        .take_stdout()
        .ok_or(ProcessError::Closed(StdStream::Stdout))?;
    let stderr = process
        .take_stderr()
        .ok_or(ProcessError::Closed(StdStream::Stderr))?;
    let stdout_reader = spawn_reader(stdout)?;
    let stderr_reader = spawn_reader(stderr)?;

    if let Some(input) = &options.input {
        match process.write_stdin_all(input) {
            Ok(()) => debug!("Wrote {} bytes of input", input.len()),
            // The child may exit without reading its input
            Err(ProcessError::BrokenPipe(_)) => debug!("Child closed stdin early"),
            Err(e) => return Err(e.into()),
        }
    }
    process.close_stdin()?;

    let (status, timed_out) = match process.wait(options.timeout) {
        Ok(status) => (status, false),
        Err(ProcessError::Timeout) => {
            warn!(
                "'{}' still running after {:?}, shutting it down",
                options.argv[0], options.timeout
            );
            let stopped = process.shutdown();
            // Descendants sharing the group may still hold the output pipes
            if let Err(e) = process.kill_group() {
                warn!("Failed to kill process group {:?}: {}", process.pid(), e);
            }
            (stopped?, true)
        }
        Err(e) => return Err(e.into()),
    };
    info!("'{}' exited with {}", options.argv[0], status);

    Ok(RunOutput {
        stdout: join_reader(stdout_reader, StdStream::Stdout)?,
        stderr: join_reader(stderr_reader, StdStream::Stderr)?,
        status,
        timed_out,
    })
}

fn spawn_reader(mut output: ChildOutput) -> Result<JoinHandle<io::Result<Vec<u8>>>> {
    let handle = thread::Builder::new()
        .name(format!("procpipe-{}", output.stream()))
        .spawn(move || {
            let mut buf = Vec::new();
            output.read_to_end(&mut buf)?;
            Ok(buf)
        })?;
    Ok(handle)
}

fn join_reader(handle: JoinHandle<io::Result<Vec<u8>>>, stream: StdStream) -> Result<Vec<u8>> {
    let bytes = handle
        .join()
        .map_err(|_| CliError::ReaderPanicked(stream))??;
    Ok(bytes)
}
