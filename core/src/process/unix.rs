//! Unix backend: pipes, process groups and signals
//!
//! ## Process Groups
//!
//! Every launched child calls `setsid()` before `exec()`, which:
//! - Creates a new session and makes the child its leader
//! - Creates a new process group whose id equals the child's pid
//! - Detaches the child from the controlling terminal
//!
//! The cooperative stop signal (`SIGTERM`) is then sent with `killpg()` to
//! that group only, so unrelated processes sharing our group never see it.

// Process setup requires libc::setsid() in a pre_exec hook
#![allow(unsafe_code)]

use crate::pipe::Pipe;
use crate::{ProcessError, Result};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::fs::File;
use std::os::unix::io::IntoRawFd;
use std::os::unix::process::CommandExt;
use std::process::Command;
use tracing::{debug, error};

/// Create a pipe whose ends are both close-on-exec
#[cfg(not(target_vendor = "apple"))]
pub(crate) fn create_pipe() -> Result<Pipe> {
    use nix::fcntl::OFlag;

    let (reader, writer) = nix::unistd::pipe2(OFlag::O_CLOEXEC)?;
    Ok(Pipe {
        reader: File::from(reader),
        writer: File::from(writer),
    })
}

/// Create a pipe whose ends are both close-on-exec
///
/// Apple targets lack `pipe2`, so the flag is applied after creation.
#[cfg(target_vendor = "apple")]
pub(crate) fn create_pipe() -> Result<Pipe> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};
    use std::os::unix::io::AsRawFd;

    let (reader, writer) = nix::unistd::pipe()?;
    for fd in [reader.as_raw_fd(), writer.as_raw_fd()] {
        fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok(Pipe {
        reader: File::from(reader),
        writer: File::from(writer),
    })
}

/// Close a pipe end, surfacing the `close(2)` result
pub(crate) fn close(file: File) -> Result<()> {
    nix::unistd::close(file.into_raw_fd()).map_err(ProcessError::from)
}

/// Place the child in its own session and process group on spawn
pub(crate) fn isolate_process_group(command: &mut Command) {
    // Safety: setsid() is async-signal-safe and runs in the forked child
    // before exec
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

/// Send `SIGTERM` to the process group led by `pgid`
///
/// `ESRCH` and `EPERM` mean the group has no live members left (the leader
/// already exited and is awaiting reaping), so they are reported as success
/// and the following wait observes the exit.
pub(crate) fn signal_group(pgid: u32) -> Result<()> {
    let group = Pid::from_raw(pgid as i32);
    debug!("Sending SIGTERM to process group {}", group);

    match killpg(group, Signal::SIGTERM) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) | Err(Errno::EPERM) => {
            debug!("Process group {} already exited", group);
            Ok(())
        }
        Err(e) => {
            error!("Failed to send SIGTERM to process group {}: {}", group, e);
            Err(e.into())
        }
    }
}

/// Send `SIGKILL` to every member of the process group led by `pgid`
///
/// As with [`signal_group`], an empty group is not an error.
pub(crate) fn kill_group(pgid: u32) -> Result<()> {
    let group = Pid::from_raw(pgid as i32);
    debug!("Sending SIGKILL to process group {}", group);

    match killpg(group, Signal::SIGKILL) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) | Err(Errno::EPERM) => {
            debug!("Process group {} already exited", group);
            Ok(())
        }
        Err(e) => {
            error!("Failed to send SIGKILL to process group {}: {}", group, e);
            Err(e.into())
        }
    }
}

/// Map an errno value onto the portable error taxonomy
pub(crate) fn classify(code: i32) -> ProcessError {
    match code {
        libc::ENOENT | libc::ENOTDIR => ProcessError::NotFound(code),
        libc::EACCES | libc::EPERM => ProcessError::PermissionDenied(code),
        libc::ENOMEM => ProcessError::OutOfMemory(code),
        libc::EPIPE => ProcessError::BrokenPipe(code),
        libc::EMFILE | libc::ENFILE => ProcessError::TooManyHandles(code),
        libc::EINTR => ProcessError::Interrupted(code),
        _ => ProcessError::System(code),
    }
}
