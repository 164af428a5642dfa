//! Pull the dotfiles repository before applying its document.
use std::path::Path;

use anyhow::{Context as _, Result};

use crate::exec::{Attach, Executor, Invocation};
use crate::logging::Log;

/// Set to `1` to skip pulling the dotfiles repository.
pub const NO_UPDATE_REPO_ENV: &str = "DOTBOT_NO_UPDATE_REPO";

/// `true` when `DOTBOT_NO_UPDATE_REPO=1`.
#[must_use]
pub fn disabled_by_env() -> bool {
    std::env::var(NO_UPDATE_REPO_ENV).is_ok_and(|v| v == "1")
}

/// Commit id of `HEAD` in the repository at `dir`, `None` if there is no
/// repository or no commit yet.
#[must_use]
pub fn head(dir: &Path) -> Option<git2::Oid> {
    let repo = git2::Repository::open(dir).ok()?;
    let head = repo.head().ok()?;
    head.target()
}

/// Run `git pull` in `dir`. Returns `true` when `HEAD` moved, which means
/// the document may have changed and should be reloaded.
///
/// # Errors
///
/// Returns an error if `git pull` fails.
pub fn pull(log: &dyn Log, executor: &dyn Executor, dir: &Path) -> Result<bool> {
    let Some(before) = head(dir) else {
        log.debug(&format!("{} is not a git repository", dir.display()));
        return Ok(false);
    };
    let path = dir.display().to_string();
    Invocation::new("git", ["-C", path.as_str(), "pull", "--ff-only"])
        .run_attached(
            executor,
            Attach {
                stdin: false,
                ..Attach::default()
            },
        )
        .with_context(|| format!("updating repository {path}"))?;
    let moved = head(dir) != Some(before);
    if moved {
        log.info("dotfiles repository updated");
    } else {
        log.debug("dotfiles repository is up to date");
    }
    Ok(moved)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::directives::test_helpers::CaptureLog;
    use crate::resources::test_helpers::MockExecutor;

    fn commit(repo: &git2::Repository) -> git2::Oid {
        let sig = git2::Signature::now("t", "t@example.com").unwrap();
        let tree_id = repo.index().unwrap().write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[]).unwrap()
    }

    #[test]
    fn head_of_missing_or_empty_repository() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(head(dir.path()), None);
        git2::Repository::init(dir.path()).unwrap();
        assert_eq!(head(dir.path()), None);
    }

    #[test]
    fn pull_reports_unchanged_head() {
        let dir = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init(dir.path()).unwrap();
        let id = commit(&repo);
        assert_eq!(head(dir.path()), Some(id));

        let mock = MockExecutor::new();
        let log = CaptureLog::default();
        assert!(!pull(&log, &mock, dir.path()).unwrap());
        assert_eq!(
            mock.calls(),
            [format!("git -C {} pull --ff-only", dir.path().display())]
        );
        assert!(log.contains("up to date"));
    }

    #[test]
    fn pull_skips_non_repository() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockExecutor::new();
        assert!(!pull(&CaptureLog::default(), &mock, dir.path()).unwrap());
        assert_eq!(mock.call_count(), 0);
    }
}
