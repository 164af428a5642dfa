//! `dotbot status` and `dotbot diff`: git views of the dotfiles directory.
use std::path::Path;

use anyhow::{Context as _, Result};

use super::CommandSetup;
use crate::exec::{Attach, Executor, Invocation};

/// Which git view to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// `git status -s`
    Status,
    /// `git diff`
    Diff,
}

impl View {
    fn args(self) -> &'static [&'static str] {
        match self {
            Self::Status => &["status", "-s"],
            Self::Diff => &["diff"],
        }
    }
}

/// Run the `status` or `diff` command.
///
/// # Errors
///
/// Returns an error if the dotfiles directory is unknown or git fails.
pub fn run(view: View) -> Result<()> {
    let setup = CommandSetup::init()?;
    let dir = setup.base_dir()?;
    show(setup.executor.as_ref(), &dir, view)
}

/// Run git for `view` in `dir` attached to the terminal.
///
/// # Errors
///
/// Returns an error if git cannot be started or exits non-zero.
pub fn show(executor: &dyn Executor, dir: &Path, view: View) -> Result<()> {
    let path = dir.display().to_string();
    let mut args = vec!["-C", path.as_str()];
    args.extend_from_slice(view.args());
    Invocation::new("git", args)
        .run_attached(executor, Attach::default())
        .with_context(|| format!("failed running git {}", view.args().join(" ")))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::resources::test_helpers::MockExecutor;

    #[test]
    fn status_and_diff_run_in_the_dotfiles_directory() {
        let mock = MockExecutor::new();
        show(&mock, Path::new("/dots"), View::Status).unwrap();
        show(&mock, Path::new("/dots"), View::Diff).unwrap();
        assert_eq!(mock.calls(), ["git -C /dots status -s", "git -C /dots diff"]);
    }

    #[test]
    fn git_failure_is_an_error() {
        let mock = MockExecutor::fail("not a git repository");
        let err = show(&mock, Path::new("/dots"), View::Status).unwrap_err();
        assert!(err.to_string().contains("git status -s"));
    }
}
