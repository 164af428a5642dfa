//! Privilege escalation through an elevated child process.
//!
//! A parent that hits a permission error serializes the failing entries and
//! a snapshot of the template variables into an [`Envelope`], then pipes it
//! to `sudo -E <exe> run --stdin` with [`MARKER_ENV`] set. The child reads
//! the envelope as an ordinary document. Because the marker makes the child
//! take the [`Role::Child`] role, it never escalates again: only one hop is
//! ever taken.
mod probe;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use probe::{PrivilegeProbe, ProbeState};

use crate::config::{Mapping, Node, pair};
use crate::error::EscalationError;
use crate::exec::Executor;
use crate::platform::Platform;

/// Environment variable marking the elevated child.
pub const MARKER_ENV: &str = "DOTBOT_SUDO";

/// Which side of the protocol this process is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// A normal invocation; may spawn one elevated child.
    Parent,
    /// Spawned by a parent; never escalates, updates or syncs the repo.
    Child,
}

/// The document sent to an elevated child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Canonical directive list.
    pub config: Node,
    /// Template variables visible to the failing directive.
    #[serde(default, skip_serializing_if = "Mapping::is_empty")]
    pub vars: Mapping,
}

impl Envelope {
    /// Wrap one directive body as `{config: [{name: body}], vars}`.
    #[must_use]
    pub fn single(name: &str, body: Node, vars: Mapping) -> Self {
        Self {
            config: Node::Sequence(vec![pair(name, body)]),
            vars,
        }
    }

    /// Wrap an already canonical directive list.
    #[must_use]
    pub const fn list(config: Node, vars: Mapping) -> Self {
        Self { config, vars }
    }

    /// Serialize to YAML.
    ///
    /// # Errors
    ///
    /// Returns [`EscalationError::Envelope`] if a value cannot be
    /// represented.
    pub fn to_yaml(&self) -> Result<String, EscalationError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Decides whether and how to re-run work with elevated privileges.
#[derive(Debug)]
pub struct Escalator {
    role: Role,
    probe: PrivilegeProbe,
    executable: Option<PathBuf>,
}

impl Escalator {
    /// Create an escalator for `role` with an unprobed `sudo`.
    #[must_use]
    pub fn new(role: Role) -> Self {
        Self {
            role,
            probe: PrivilegeProbe::default(),
            executable: None,
        }
    }

    /// Take the role from [`MARKER_ENV`]: any non-empty value means child.
    #[must_use]
    pub fn from_env() -> Self {
        let child = std::env::var_os(MARKER_ENV).is_some_and(|v| !v.is_empty());
        Self::new(if child { Role::Child } else { Role::Parent })
    }

    /// Use `probe` instead of an unprobed one.
    #[must_use]
    pub fn with_probe(mut self, probe: PrivilegeProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Spawn `path` instead of the current executable.
    #[must_use]
    pub fn with_executable(mut self, path: PathBuf) -> Self {
        self.executable = Some(path);
        self
    }

    /// This process's role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// `true` in an elevated child.
    #[must_use]
    pub fn is_child(&self) -> bool {
        self.role == Role::Child
    }

    /// Whether elevated commands can run: always as root, otherwise when
    /// `sudo` passes the probe.
    pub fn can_sudo(&self, platform: &Platform, executor: &dyn Executor) -> bool {
        platform.is_root || self.probe.check(executor)
    }

    /// Whether a permission error would lead to an elevated retry.
    pub fn would_sudo(&self, platform: &Platform, executor: &dyn Executor) -> bool {
        !self.is_child() && !platform.is_root && self.probe.check(executor)
    }

    /// Pipe `envelope` to an elevated child and wait for it.
    ///
    /// # Errors
    ///
    /// - [`EscalationError::Refused`] in the child role
    /// - [`EscalationError::Unavailable`] as root or without usable `sudo`
    /// - [`EscalationError::Executable`] if the own path cannot be resolved
    /// - [`EscalationError::Spawn`] if `sudo` cannot be started
    /// - [`EscalationError::ChildFailed`] if the child exits non-zero
    pub fn escalate(
        &self,
        platform: &Platform,
        executor: &dyn Executor,
        envelope: &Envelope,
    ) -> Result<(), EscalationError> {
        if self.is_child() {
            return Err(EscalationError::Refused);
        }
        if platform.is_root || !self.probe.check(executor) {
            return Err(EscalationError::Unavailable);
        }
        let exe = match &self.executable {
            Some(path) => path.clone(),
            None => std::env::current_exe().map_err(EscalationError::Executable)?,
        };
        let exe = exe.display().to_string();
        let document = envelope.to_yaml()?;
        tracing::debug!("escalating via sudo:\n{document}");

        let result = executor
            .run_with_input(
                "sudo",
                &["-E", &exe, "run", "--stdin"],
                &[(MARKER_ENV, "1")],
                document.as_bytes(),
            )
            .map_err(EscalationError::Spawn)?;
        if result.success {
            Ok(())
        } else {
            Err(EscalationError::ChildFailed { code: result.code })
        }
    }
}
