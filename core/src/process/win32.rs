//! Windows backend: anonymous pipes, process groups and console control events
//!
//! Children are created with `CREATE_NEW_PROCESS_GROUP`, which makes the new
//! group id equal to the child's process id. `CTRL_BREAK_EVENT` is then
//! delivered to that group only. The child must share our console to
//! receive it.

// Raw handle ownership transfers require unsafe conversions
#![allow(unsafe_code)]

use crate::pipe::Pipe;
use crate::{ProcessError, Result};
use std::fs::File;
use std::os::windows::io::{FromRawHandle, IntoRawHandle, OwnedHandle};
use std::os::windows::process::CommandExt;
use std::process::Command;
use tracing::{debug, error};
use windows::Win32::Foundation::{
    CloseHandle, ERROR_ACCESS_DENIED, ERROR_BROKEN_PIPE, ERROR_FILE_NOT_FOUND,
    ERROR_NOT_ENOUGH_MEMORY, ERROR_NO_DATA, ERROR_OPERATION_ABORTED, ERROR_OUTOFMEMORY,
    ERROR_PATH_NOT_FOUND, ERROR_TOO_MANY_OPEN_FILES, HANDLE, WIN32_ERROR,
};
use windows::Win32::System::Console::{GenerateConsoleCtrlEvent, CTRL_BREAK_EVENT};
use windows::Win32::System::Pipes::CreatePipe;
use windows::Win32::System::Threading::CREATE_NEW_PROCESS_GROUP;

/// Create an anonymous pipe with non-inheritable ends
pub(crate) fn create_pipe() -> Result<Pipe> {
    let mut reader = HANDLE::default();
    let mut writer = HANDLE::default();
    // No security attributes: neither end is inheritable
    unsafe { CreatePipe(&mut reader, &mut writer, None, 0) }
        .map_err(|_| ProcessError::last_os_error())?;

    // Safety: CreatePipe succeeded, so both handles are valid and owned by us
    let (reader, writer) = unsafe {
        (
            OwnedHandle::from_raw_handle(reader.0),
            OwnedHandle::from_raw_handle(writer.0),
        )
    };
    Ok(Pipe {
        reader: File::from(reader),
        writer: File::from(writer),
    })
}

/// Close a pipe end, surfacing the `CloseHandle` result
pub(crate) fn close(file: File) -> Result<()> {
    let raw = file.into_raw_handle();
    unsafe { CloseHandle(HANDLE(raw)) }.map_err(|_| ProcessError::last_os_error())
}

/// Create the child in a new process group
pub(crate) fn isolate_process_group(command: &mut Command) {
    command.creation_flags(CREATE_NEW_PROCESS_GROUP.0);
}

/// Deliver `CTRL_BREAK_EVENT` to the process group led by `pgid`
pub(crate) fn signal_group(pgid: u32) -> Result<()> {
    debug!("Sending CTRL_BREAK_EVENT to process group {}", pgid);
    unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pgid) }.map_err(|_| {
        let err = ProcessError::last_os_error();
        error!("Failed to send CTRL_BREAK_EVENT to process group {}: {}", pgid, err);
        err
    })
}

/// Forcibly stopping a whole group needs a job object, which we do not
/// create; only the leader is killed (by [`Child::kill`](std::process::Child::kill)).
pub(crate) fn kill_group(pgid: u32) -> Result<()> {
    debug!("No group-wide kill on Windows, leaving group {} to its leader", pgid);
    Ok(())
}

/// Map a Win32 error code onto the portable error taxonomy
pub(crate) fn classify(code: i32) -> ProcessError {
    let is = |known: WIN32_ERROR| known.0 as i32 == code;

    if is(ERROR_FILE_NOT_FOUND) || is(ERROR_PATH_NOT_FOUND) {
        ProcessError::NotFound(code)
    } else if is(ERROR_ACCESS_DENIED) {
        ProcessError::PermissionDenied(code)
    } else if is(ERROR_NOT_ENOUGH_MEMORY) || is(ERROR_OUTOFMEMORY) {
        ProcessError::OutOfMemory(code)
    } else if is(ERROR_BROKEN_PIPE) || is(ERROR_NO_DATA) {
        ProcessError::BrokenPipe(code)
    } else if is(ERROR_TOO_MANY_OPEN_FILES) {
        ProcessError::TooManyHandles(code)
    } else if is(ERROR_OPERATION_ABORTED) {
        ProcessError::Interrupted(code)
    } else {
        ProcessError::System(code)
    }
}
