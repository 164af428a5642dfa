//! Idempotent resource primitives (check + apply pattern).
pub mod directory;
pub mod error;
pub mod fs;
pub mod symlink;

use anyhow::Result;

pub use error::ResourceError;

/// Minimal interface for resources that can be described and applied.
pub trait Applicable {
    /// Human-readable description of this resource.
    fn description(&self) -> String;

    /// Apply the resource change.
    ///
    /// This method should:
    /// - Create parent directories if needed
    /// - Update the resource to match the desired state
    /// - Return the appropriate `ResourceChange` result
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be applied due to I/O failures,
    /// permission issues, invalid paths, or other system errors.
    fn apply(&self) -> Result<ResourceChange>;
}

/// State of a filesystem resource.
///
/// # Examples
///
/// ```
/// use dotbot::resources::ResourceState;
///
/// let missing = ResourceState::Missing;
/// let correct = ResourceState::Correct;
/// let wrong = ResourceState::Incorrect { current: "points to /other".into() };
///
/// assert_ne!(missing, correct);
/// assert_ne!(wrong, correct);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    /// Resource does not exist.
    Missing,
    /// Resource exists and matches the desired state.
    Correct,
    /// Something else occupies the resource's place.
    Incorrect {
        /// What is there now.
        current: String,
    },
    /// Resource cannot be applied at all (e.g. the link source is missing).
    Invalid {
        /// Reason why the resource cannot be applied.
        reason: String,
    },
}

/// Result of applying a resource change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceChange {
    /// Resource was created or updated.
    Applied,
    /// Resource was already correct (no change needed).
    AlreadyCorrect,
    /// An existing file was moved out of the way before applying.
    Displaced {
        /// Where the previous file went, or `None` when it was deleted.
        moved_to: Option<std::path::PathBuf>,
    },
}

/// Unified interface for resources that can be checked and applied.
///
/// ```ignore
/// // All resources follow the same check-then-apply pattern:
/// if resource.needs_change()? {
///     resource.apply()?;
/// }
/// ```
pub trait Resource: Applicable {
    /// Check the current state of the resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource state cannot be determined due to I/O
    /// failures or permission issues.
    fn current_state(&self) -> Result<ResourceState>;

    /// Determine if the resource needs to be changed.
    ///
    /// # Errors
    ///
    /// Propagates errors from `current_state()`.
    fn needs_change(&self) -> Result<bool> {
        Ok(matches!(
            self.current_state()?,
            ResourceState::Missing | ResourceState::Incorrect { .. }
        ))
    }
}


#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::test_helpers::{MockExecutor, Reply};
    use super::*;
    use crate::exec::Executor as _;

    struct Fixed(ResourceState);

    impl Applicable for Fixed {
        fn description(&self) -> String {
            "fixed".to_string()
        }
        fn apply(&self) -> Result<ResourceChange> {
            Ok(ResourceChange::Applied)
        }
    }

    impl Resource for Fixed {
        fn current_state(&self) -> Result<ResourceState> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn needs_change_for_missing_and_incorrect_only() {
        assert!(Fixed(ResourceState::Missing).needs_change().unwrap());
        assert!(
            Fixed(ResourceState::Incorrect {
                current: "file".into()
            })
            .needs_change()
            .unwrap()
        );
        assert!(!Fixed(ResourceState::Correct).needs_change().unwrap());
        assert!(
            !Fixed(ResourceState::Invalid {
                reason: "no source".into()
            })
            .needs_change()
            .unwrap()
        );
    }

    #[test]
    fn mock_records_calls_and_replays_in_order() {
        let mock = MockExecutor::with_replies(vec![
            Reply::Ok("first".into()),
            Reply::Fail("sudo: a password is required".into()),
        ]);
        let a = mock.run("echo", &["a"]).unwrap();
        let b = mock.run_unchecked("sudo", &["-n", "-v"]).unwrap();
        assert_eq!(a.stdout, "first");
        assert!(!b.success);
        assert_eq!(mock.calls(), ["echo a", "sudo -n -v"]);
    }

    #[test]
    fn mock_checked_run_fails_on_failed_reply() {
        let mock = MockExecutor::fail("boom");
        assert!(mock.run("false", &[]).is_err());
    }

    #[test]
    fn mock_on_path_limits_which() {
        let mock = MockExecutor::new().with_on_path(&["apt-get"]);
        assert!(mock.which("apt-get"));
        assert!(!mock.which("brew"));
    }
}
