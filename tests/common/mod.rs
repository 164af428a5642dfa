// Shared helpers for integration tests.
//
// Provides a temporary home and dotfiles directory plus a builder for the
// document, so each integration test runs against an isolated tree.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dotbot::cli::GlobalOpts;
use dotbot::commands::CommandSetup;
use dotbot::config::{State, state};
use dotbot::escalation::{Escalator, PrivilegeProbe, ProbeState, Role};
use dotbot::exec::SystemExecutor;
use dotbot::logging::Logger;
use dotbot::platform::Platform;

/// Document header that keeps runs offline.
pub const OFFLINE: &str = "update_repo: false\nupdate_dotbot: false\nshow_total_time: false\n";

/// An isolated home and dotfiles directory backed by a
/// [`tempfile::TempDir`].
pub struct Dotfiles {
    /// Owns both directories.
    pub root: tempfile::TempDir,
}

impl Dotfiles {
    /// Create empty `home/` and `dotfiles/` directories.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir_all(root.path().join("home")).expect("create home");
        std::fs::create_dir_all(root.path().join("dotfiles")).expect("create dotfiles");
        Self { root }
    }

    /// The fake home directory.
    pub fn home(&self) -> PathBuf {
        self.root.path().join("home")
    }

    /// The dotfiles directory.
    pub fn base(&self) -> PathBuf {
        self.root.path().join("dotfiles")
    }

    /// Write `content` to `rel` inside the dotfiles directory.
    pub fn with_file(self, rel: &str, content: &str) -> Self {
        let path = self.base().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(&path, content).expect("write file");
        self
    }

    /// Write `dotbot.yaml` with the offline header followed by `config`.
    pub fn with_document(self, config: &str) -> Self {
        self.with_file("dotbot.yaml", &format!("{OFFLINE}{config}"))
    }

    /// Path of the state file.
    pub fn state_path(&self) -> PathBuf {
        state::default_path(&self.home())
    }

    /// A command setup whose state points at the dotfiles directory and
    /// whose `sudo` probe always fails.
    pub fn setup(&self) -> CommandSetup {
        let mut st = State::load(&self.state_path()).expect("load state");
        st.set(state::DIRECTORY_KEY, self.base().display().to_string());
        CommandSetup::new(
            Platform::detect(),
            self.home(),
            st,
            Arc::new(SystemExecutor),
        )
        .with_escalator(
            Escalator::new(Role::Parent).with_probe(PrivilegeProbe::preset(ProbeState::No)),
        )
    }

    /// Global options pointing `--config` at the document.
    pub fn global(&self) -> GlobalOpts {
        GlobalOpts {
            config: Some(self.base().join("dotbot.yaml")),
            ..GlobalOpts::default()
        }
    }
}

/// A logger for one test run.
pub fn logger() -> Arc<Logger> {
    Arc::new(Logger::new("test"))
}

/// `true` if `path` is a symlink pointing at `target`.
pub fn links_to(path: &Path, target: &Path) -> bool {
    std::fs::read_link(path).is_ok_and(|t| t == target)
}
