//! Bounded waits over a child's exit

use crate::{ProcessError, Result};
use std::process::{Child, ExitStatus};
use std::time::{Duration, Instant};
use tracing::trace;

/// How long a wait may block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTimeout {
    /// Poll once without blocking
    Immediate,
    /// Block for at most the given duration
    After(Duration),
    /// Block until the child exits
    Infinite,
}

impl WaitTimeout {
    /// Millisecond sentinel meaning "block until exit"
    pub const INFINITE_MS: u32 = u32::MAX;

    /// Build a timeout from milliseconds: `0` never blocks and
    /// [`INFINITE_MS`](Self::INFINITE_MS) blocks until exit.
    pub fn from_millis(ms: u32) -> Self {
        match ms {
            0 => WaitTimeout::Immediate,
            Self::INFINITE_MS => WaitTimeout::Infinite,
            ms => WaitTimeout::After(Duration::from_millis(u64::from(ms))),
        }
    }
}

impl From<Duration> for WaitTimeout {
    fn from(duration: Duration) -> Self {
        if duration.is_zero() {
            WaitTimeout::Immediate
        } else {
            WaitTimeout::After(duration)
        }
    }
}

/// Wait for `child` to exit within `timeout`, polling every `poll`.
///
/// `std::process::Child` caches the reaped status, so waiting again after an
/// exit returns the same status without touching the OS.
pub(crate) fn wait_child(
    child: &mut Child,
    timeout: WaitTimeout,
    poll: Duration,
) -> Result<ExitStatus> {
    match timeout {
        WaitTimeout::Infinite => Ok(child.wait()?),
        WaitTimeout::Immediate => child.try_wait()?.ok_or(ProcessError::Timeout),
        WaitTimeout::After(limit) => {
            // A limit past the end of the monotonic clock never expires
            let Some(deadline) = Instant::now().checked_add(limit) else {
                return Ok(child.wait()?);
            };
            loop {
                if let Some(status) = child.try_wait()? {
                    return Ok(status);
                }
                let now = Instant::now();
                if now >= deadline {
                    trace!("Wait on process {} timed out after {:?}", child.id(), limit);
                    return Err(ProcessError::Timeout);
                }
                std::thread::sleep(poll.min(deadline - now));
            }
        }
    }
}
