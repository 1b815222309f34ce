//! Lifecycle stages of a process instance

use std::fmt;

/// Where a [`Process`](super::Process) is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Constructed, no OS resources held
    Fresh,
    /// All three pipes created, not yet launched
    Initialized,
    /// Launched; exit not yet observed
    Running,
    /// Exit observed by a wait
    Exited,
    /// Exit observed after the cooperative stop signal
    Terminated,
    /// Exit observed after a forcible kill
    Killed,
    /// Pipe provisioning or launch failed
    Failed,
    /// Torn down; every handle is closed
    Released,
}

impl Stage {
    /// Whether the child was launched, so its streams and identity exist
    pub fn is_launched(&self) -> bool {
        matches!(
            self,
            Stage::Running | Stage::Exited | Stage::Terminated | Stage::Killed
        )
    }

    /// Whether the child's exit has been observed
    pub fn has_exited(&self) -> bool {
        matches!(self, Stage::Exited | Stage::Terminated | Stage::Killed)
    }

    /// Stage name used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fresh => "fresh",
            Stage::Initialized => "initialized",
            Stage::Running => "running",
            Stage::Exited => "exited",
            Stage::Terminated => "terminated",
            Stage::Killed => "killed",
            Stage::Failed => "failed",
            Stage::Released => "released",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launched_stages() {
        assert!(!Stage::Fresh.is_launched());
        assert!(!Stage::Initialized.is_launched());
        assert!(Stage::Running.is_launched());
        assert!(Stage::Killed.is_launched());
        assert!(!Stage::Failed.is_launched());
        assert!(!Stage::Released.is_launched());
    }

    #[test]
    fn test_exited_stages() {
        assert!(!Stage::Running.has_exited());
        assert!(Stage::Exited.has_exited());
        assert!(Stage::Terminated.has_exited());
    }
}
