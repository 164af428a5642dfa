//! Subcommand orchestration.
pub mod download;
pub mod git;
pub mod init;
pub mod run;
pub mod set;
pub mod update;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use crate::config::{State, state};
use crate::directives::Context;
use crate::error::SystemError;
use crate::escalation::Escalator;
use crate::exec::{Executor, SystemExecutor};
use crate::logging::{Log, Logger};
use crate::platform::Platform;

/// The user's home directory from `HOME` or `USERPROFILE`.
///
/// # Errors
///
/// Returns [`SystemError::HomeDirectory`] if neither is set.
pub fn home_dir() -> Result<PathBuf, SystemError> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .ok_or(SystemError::HomeDirectory)
}

/// Environment shared by every command: platform facts, home, persisted
/// state and the escalation role.
pub struct CommandSetup {
    /// Detected platform.
    pub platform: Arc<Platform>,
    /// Home directory used for `~`.
    pub home: PathBuf,
    /// State file, loaded.
    pub state: State,
    /// Parent or elevated child.
    pub escalator: Escalator,
    /// Runs external programs.
    pub executor: Arc<dyn Executor>,
}

impl std::fmt::Debug for CommandSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSetup")
            .field("platform", &self.platform)
            .field("home", &self.home)
            .field("state", &self.state)
            .field("escalator", &self.escalator)
            .field("executor", &"<dyn Executor>")
            .finish()
    }
}

impl CommandSetup {
    /// Detect the platform and load the state file.
    ///
    /// # Errors
    ///
    /// Returns a [`SystemError`] if the home directory is unknown or the
    /// state file cannot be read.
    pub fn init() -> Result<Self, SystemError> {
        let home = home_dir()?;
        let state = State::load(&state::default_path(&home))?;
        Ok(Self {
            platform: Arc::new(Platform::detect()),
            home,
            state,
            escalator: Escalator::from_env(),
            executor: Arc::new(SystemExecutor),
        })
    }

    /// Setup over explicit parts, for tests.
    #[must_use]
    pub fn new(platform: Platform, home: PathBuf, state: State, executor: Arc<dyn Executor>) -> Self {
        Self {
            platform: Arc::new(platform),
            home,
            state,
            escalator: Escalator::from_env(),
            executor,
        }
    }

    /// Replace the escalator.
    #[must_use]
    pub fn with_escalator(mut self, escalator: Escalator) -> Self {
        self.escalator = escalator;
        self
    }

    /// The dotfiles directory: the `directory` state key, else the working
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns an error if neither is available.
    pub fn base_dir(&self) -> Result<PathBuf> {
        match self.state.base_dir() {
            Some(dir) => Ok(dir),
            None => std::env::current_dir().context("cannot determine the working directory"),
        }
    }

    /// Build a directive context over `base_dir`. The setup's state moves
    /// into the context.
    #[must_use]
    pub fn into_context(self, log: Arc<dyn Log>, base_dir: PathBuf, dry_run: bool) -> Context {
        Context::new(self.platform, log, self.executor, self.home, base_dir)
            .with_dry_run(dry_run)
            .with_escalator(self.escalator)
            .with_state(self.state)
    }
}

/// Print the summary and fail if any directive failed.
///
/// # Errors
///
/// Returns an error naming the number of failed directives.
pub fn finish(log: &Logger) -> Result<()> {
    log.print_summary();
    let count = log.failure_count();
    if count > 0 {
        anyhow::bail!("{count} directive(s) failed");
    }
    Ok(())
}
