//! Shared state threaded through every directive.
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{Node, State};
use crate::escalation::Escalator;
use crate::exec::Executor;
use crate::logging::Log;
use crate::platform::Platform;
use crate::resources::fs::{absolute, expand_user};
use crate::template::{self, Environment, TemplateError, TemplateVars};

/// Shared context for directive execution.
pub struct Context {
    /// Detected platform information.
    pub platform: Arc<Platform>,
    /// Logger for output and directive recording.
    pub log: Arc<dyn Log>,
    /// Command executor (for testing or real system calls).
    pub executor: Arc<dyn Executor>,
    /// User's home directory, used for `~` expansion.
    pub home: PathBuf,
    /// Directory of the dotfiles repository; relative sources resolve here.
    pub base_dir: PathBuf,
    /// Report intended actions without applying them.
    pub dry_run: bool,
    /// Active group filter, `None` to run every group.
    pub groups: Option<Vec<String>>,
    /// Template variables.
    pub vars: TemplateVars,
    /// Privilege escalation policy.
    pub escalator: Escalator,
    /// Persisted state (installed versions).
    pub state: RefCell<State>,
    temp_files: RefCell<Vec<PathBuf>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("platform", &self.platform)
            .field("log", &"<dyn Log>")
            .field("executor", &"<dyn Executor>")
            .field("home", &self.home)
            .field("base_dir", &self.base_dir)
            .field("dry_run", &self.dry_run)
            .field("groups", &self.groups)
            .field("vars", &self.vars)
            .field("escalator", &self.escalator)
            .field("state", &self.state)
            .field("temp_files", &self.temp_files)
            .finish()
    }
}

impl Context {
    /// Create a context with no group filter, an in-memory state and a
    /// parent-role escalator.
    #[must_use]
    pub fn new(
        platform: Arc<Platform>,
        log: Arc<dyn Log>,
        executor: Arc<dyn Executor>,
        home: PathBuf,
        base_dir: PathBuf,
    ) -> Self {
        Self {
            platform,
            log,
            executor,
            home,
            base_dir,
            dry_run: false,
            groups: None,
            vars: TemplateVars::new(),
            escalator: Escalator::new(crate::escalation::Role::Parent),
            state: RefCell::new(State::in_memory()),
            temp_files: RefCell::new(Vec::new()),
        }
    }

    /// Set dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set the active group filter.
    #[must_use]
    pub fn with_groups(mut self, groups: Option<Vec<String>>) -> Self {
        self.groups = groups;
        self
    }

    /// Replace the escalator.
    #[must_use]
    pub fn with_escalator(mut self, escalator: Escalator) -> Self {
        self.escalator = escalator;
        self
    }

    /// Replace the persisted state.
    #[must_use]
    pub fn with_state(mut self, state: State) -> Self {
        self.state = RefCell::new(state);
        self
    }

    /// Render a template field.
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] if the field is not a valid template.
    pub fn render(&self, src: &str) -> Result<String, TemplateError> {
        template::render_field(self, src)
    }

    /// Render a path field and expand `~`.
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] if the field is not a valid template.
    pub fn path(&self, src: &str) -> Result<PathBuf, TemplateError> {
        Ok(expand_user(&self.render(src)?, &self.home))
    }

    /// Like [`path`](Self::path) but relative results resolve against the
    /// base directory.
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] if the field is not a valid template.
    pub fn source_path(&self, src: &str) -> Result<PathBuf, TemplateError> {
        Ok(absolute(&self.path(src)?, &self.base_dir))
    }

    /// Log `msg` as an action: a dry-run line in dry-run mode, otherwise
    /// an info line.
    pub fn report(&self, msg: &str) {
        if self.dry_run {
            self.log.dry_run(msg);
        } else {
            self.log.info(msg);
        }
    }

    /// Whether elevated commands can run (`CanSudo`).
    pub fn can_sudo(&self) -> bool {
        self.escalator.can_sudo(&self.platform, self.executor.as_ref())
    }

    /// Whether a permission error would lead to an elevated retry.
    pub fn would_sudo(&self) -> bool {
        self.escalator
            .would_sudo(&self.platform, self.executor.as_ref())
    }

    /// Remember a temporary file for [`remove_temp_files`](Self::remove_temp_files).
    pub fn track_temp(&self, path: PathBuf) {
        self.temp_files.borrow_mut().push(path);
    }

    /// Delete every tracked temporary file. Failures are logged.
    pub fn remove_temp_files(&self) {
        for path in self.temp_files.borrow_mut().drain(..) {
            if let Err(e) = std::fs::remove_file(&path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                self.log
                    .warn(&format!("cannot remove temporary file {}: {e}", path.display()));
            }
        }
    }

    /// Files currently tracked for removal.
    #[must_use]
    pub fn temp_files(&self) -> Vec<PathBuf> {
        self.temp_files.borrow().clone()
    }

    /// `true` if `path` lies inside the base directory.
    #[must_use]
    pub fn in_base_dir(&self, path: &Path) -> bool {
        path.starts_with(&self.base_dir)
    }
}

impl Environment for Context {
    fn lookup(&self, name: &str) -> Option<Node> {
        self.vars.get(name)
    }

    fn platform(&self) -> &Platform {
        &self.platform
    }

    fn can_sudo(&self) -> bool {
        Self::can_sudo(self)
    }
}
