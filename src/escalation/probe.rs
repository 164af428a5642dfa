//! Memoized check for non-interactive `sudo`.
use std::cell::Cell;

use crate::exec::Executor;

/// Outcome of the `sudo -n -v` probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeState {
    /// Not probed yet.
    #[default]
    Unknown,
    /// `sudo` is installed and usable.
    Yes,
    /// `sudo` is missing or refuses this user.
    No,
}

/// Runs `sudo -n -v` at most once per process.
///
/// A zero exit counts as usable, and so does a failure whose output starts
/// with `sudo:` (sudo exists but wants a password it will prompt for). A
/// spawn failure means `sudo` is not installed.
#[derive(Debug, Default)]
pub struct PrivilegeProbe {
    state: Cell<ProbeState>,
}

impl PrivilegeProbe {
    /// Create a probe with a known outcome.
    #[must_use]
    pub const fn preset(state: ProbeState) -> Self {
        Self {
            state: Cell::new(state),
        }
    }

    /// Current memoized state.
    #[must_use]
    pub fn state(&self) -> ProbeState {
        self.state.get()
    }

    /// Return whether `sudo` is usable, probing on first use.
    pub fn check(&self, executor: &dyn Executor) -> bool {
        if self.state.get() == ProbeState::Unknown {
            let usable = executor.run_unchecked("sudo", &["-n", "-v"]).is_ok_and(|r| {
                r.success || r.stderr.starts_with("sudo:") || r.stdout.starts_with("sudo:")
            });
            let state = if usable { ProbeState::Yes } else { ProbeState::No };
            tracing::debug!("sudo probe: {state:?}");
            self.state.set(state);
        }
        self.state.get() == ProbeState::Yes
    }
}
