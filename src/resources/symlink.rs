//! Symlink resource.
use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};

use super::{Applicable, Resource, ResourceChange, ResourceError, ResourceState, fs};

/// What to do with an existing file that is not the desired link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Conflict {
    /// Leave it and fail.
    #[default]
    Fail,
    /// Delete it.
    Remove,
    /// Rename it to the first free `path.N`.
    RenameAside,
}

/// A symlink resource that can be checked and applied.
#[derive(Debug, Clone)]
pub struct SymlinkResource {
    /// The absolute source file/directory (what the symlink points to).
    pub source: PathBuf,
    /// The target path (where the symlink will be created).
    pub target: PathBuf,
    /// Create missing parent directories of `target`.
    pub mkdirs: bool,
    /// Policy for anything already at `target`.
    pub conflict: Conflict,
}

impl SymlinkResource {
    /// Create a new symlink resource that creates parents and fails on
    /// conflicts.
    #[must_use]
    pub const fn new(source: PathBuf, target: PathBuf) -> Self {
        Self {
            source,
            target,
            mkdirs: true,
            conflict: Conflict::Fail,
        }
    }

    /// Set the conflict policy.
    #[must_use]
    pub const fn with_conflict(mut self, conflict: Conflict) -> Self {
        self.conflict = conflict;
        self
    }

    /// Set whether missing parents are created.
    #[must_use]
    pub const fn with_mkdirs(mut self, mkdirs: bool) -> Self {
        self.mkdirs = mkdirs;
        self
    }

    /// Move the current occupant of `target` out of the way per
    /// [`Conflict`].
    fn displace(&self) -> Result<ResourceChange> {
        match self.conflict {
            Conflict::Fail => Err(ResourceError::TargetExists {
                path: self.target.display().to_string(),
            }
            .into()),
            Conflict::Remove => {
                fs::require_writable_parent(&self.target)?;
                remove_occupant(&self.target)?;
                Ok(ResourceChange::Displaced { moved_to: None })
            }
            Conflict::RenameAside => {
                fs::require_writable_parent(&self.target)?;
                let dest = fs::rename_aside(&self.target)?;
                Ok(ResourceChange::Displaced {
                    moved_to: Some(dest),
                })
            }
        }
    }
}

impl Applicable for SymlinkResource {
    fn description(&self) -> String {
        format!("{} -> {}", self.target.display(), self.source.display())
    }

    fn apply(&self) -> Result<ResourceChange> {
        let mut change = ResourceChange::Applied;
        match self.current_state()? {
            ResourceState::Correct => return Ok(ResourceChange::AlreadyCorrect),
            ResourceState::Invalid { reason } => {
                return Err(ResourceError::InvalidState {
                    resource: self.target.display().to_string(),
                    reason,
                }
                .into());
            }
            ResourceState::Incorrect { .. } => change = self.displace()?,
            ResourceState::Missing => {}
        }

        fs::require_writable_parent(&self.target)?;
        if self.mkdirs {
            fs::ensure_parent_dir(&self.target)?;
        }

        create_symlink(&self.source, &self.target)
            .with_context(|| format!("create link: {}", self.target.display()))?;

        Ok(change)
    }
}

impl Resource for SymlinkResource {
    fn current_state(&self) -> Result<ResourceState> {
        if !fs::occupied(&self.source) {
            return Ok(ResourceState::Invalid {
                reason: "source does not exist".to_string(),
            });
        }

        let Ok(meta) = self.target.symlink_metadata() else {
            return Ok(ResourceState::Missing);
        };

        if !meta.is_symlink() {
            let kind = if meta.is_dir() { "directory" } else { "file" };
            return Ok(ResourceState::Incorrect {
                current: format!("target is a {kind}"),
            });
        }

        let existing = std::fs::read_link(&self.target)
            .with_context(|| format!("read link: {}", self.target.display()))?;
        if points_to(&self.target, &existing, &self.source) {
            Ok(ResourceState::Correct)
        } else {
            Ok(ResourceState::Incorrect {
                current: format!("points to {}", existing.display()),
            })
        }
    }
}

/// `true` if the link at `link`, whose raw value is `existing`, resolves to
/// the same file as `source`.
fn points_to(link: &Path, existing: &Path, source: &Path) -> bool {
    if paths_equal(existing, source) {
        return true;
    }
    let resolved = link
        .parent()
        .map_or_else(|| existing.to_path_buf(), |p| p.join(existing));
    match (dunce::canonicalize(resolved), dunce::canonicalize(source)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Compare two paths for equality, handling UNC prefix normalization on Windows.
fn paths_equal(a: &Path, b: &Path) -> bool {
    let normalize = |p: &Path| -> PathBuf {
        #[cfg(windows)]
        {
            let s = p.to_string_lossy();
            if let Some(stripped) = s.strip_prefix(r"\\?\") {
                return PathBuf::from(stripped);
            }
        }
        p.to_path_buf()
    };

    normalize(a) == normalize(b)
}

/// Create a symlink at `link` pointing to `target`.
fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link).with_context(|| {
            format!(
                "creating symlink {} -> {}",
                link.display(),
                target.display()
            )
        })?;
    }

    #[cfg(windows)]
    {
        let result = if target.is_dir() {
            std::os::windows::fs::symlink_dir(target, link)
        } else {
            std::os::windows::fs::symlink_file(target, link)
        };
        result.with_context(|| {
            format!(
                "creating symlink {} -> {}",
                link.display(),
                target.display()
            )
        })?;
    }

    Ok(())
}

/// Remove a link or a real file/directory at `path`.
///
/// On Windows, directory symlinks must be removed with `remove_dir` (not
/// `remove_file`), so the raw `FILE_ATTRIBUTE_DIRECTORY` flag is checked.
fn remove_occupant(path: &Path) -> Result<()> {
    let meta = std::fs::symlink_metadata(path)
        .with_context(|| format!("reading metadata: {}", path.display()))?;
    if meta.is_symlink() {
        if is_dir_like(&meta) {
            std::fs::remove_dir(path)
        } else {
            std::fs::remove_file(path)
        }
        .with_context(|| format!("removing link: {}", path.display()))
    } else {
        fs::remove_existing(path)
    }
}

/// Check if metadata represents a directory-like entry.
fn is_dir_like(meta: &std::fs::Metadata) -> bool {
    #[cfg(windows)]
    {
        use std::os::windows::fs::MetadataExt;
        meta.file_attributes() & 0x10 != 0 // FILE_ATTRIBUTE_DIRECTORY
    }
    #[cfg(not(windows))]
    {
        meta.is_dir()
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("dotfiles/bashrc");
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, "export A=1").unwrap();
        let target = dir.path().join("home/.bashrc");
        (dir, source, target)
    }

    #[test]
    fn paths_equal_works() {
        assert!(paths_equal(Path::new("/tmp/test"), Path::new("/tmp/test")));
        assert!(!paths_equal(Path::new("/tmp/test"), Path::new("/tmp/other")));
    }

    #[test]
    fn description_shows_both_paths() {
        let r = SymlinkResource::new(PathBuf::from("/source"), PathBuf::from("/target"));
        assert_eq!(r.description(), "/target -> /source");
    }

    #[test]
    fn invalid_when_source_missing() {
        let (dir, _source, target) = fixture();
        let r = SymlinkResource::new(dir.path().join("nope"), target);
        assert!(matches!(
            r.current_state().unwrap(),
            ResourceState::Invalid { .. }
        ));
        let err = r.apply().unwrap_err();
        assert!(format!("{err:#}").contains("source does not exist"));
    }

    #[test]
    fn creates_link_and_parents() {
        let (_dir, source, target) = fixture();
        let r = SymlinkResource::new(source.clone(), target.clone());
        assert_eq!(r.current_state().unwrap(), ResourceState::Missing);
        assert_eq!(r.apply().unwrap(), ResourceChange::Applied);
        assert_eq!(std::fs::read_link(&target).unwrap(), source);
        assert_eq!(r.current_state().unwrap(), ResourceState::Correct);
    }

    #[test]
    fn correct_link_is_left_alone() {
        let (_dir, source, target) = fixture();
        let r = SymlinkResource::new(source, target);
        r.apply().unwrap();
        assert_eq!(r.apply().unwrap(), ResourceChange::AlreadyCorrect);
    }

    #[test]
    fn existing_file_fails_without_force() {
        let (_dir, source, target) = fixture();
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(&target, "mine").unwrap();
        let r = SymlinkResource::new(source, target.clone());
        let err = r.apply().unwrap_err();
        assert!(err.to_string().contains("target already exists"));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "mine");
    }

    #[test]
    fn force_replaces_directory() {
        let (_dir, source, target) = fixture();
        std::fs::create_dir_all(target.join("inner")).unwrap();
        let r = SymlinkResource::new(source.clone(), target.clone()).with_conflict(Conflict::Remove);
        assert_eq!(
            r.apply().unwrap(),
            ResourceChange::Displaced { moved_to: None }
        );
        assert_eq!(std::fs::read_link(&target).unwrap(), source);
    }

    #[test]
    fn safe_force_renames_existing_file() {
        let (_dir, source, target) = fixture();
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(&target, "mine").unwrap();
        let r = SymlinkResource::new(source, target.clone())
            .with_conflict(Conflict::RenameAside);
        let change = r.apply().unwrap();
        let backup = target.with_file_name(".bashrc.1");
        assert_eq!(
            change,
            ResourceChange::Displaced {
                moved_to: Some(backup.clone())
            }
        );
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "mine");
        assert!(target.symlink_metadata().unwrap().is_symlink());
    }

    #[test]
    fn wrong_link_is_incorrect() {
        let (dir, source, target) = fixture();
        let other = dir.path().join("other");
        std::fs::write(&other, "").unwrap();
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::os::unix::fs::symlink(&other, &target).unwrap();
        let r = SymlinkResource::new(source, target);
        assert!(matches!(
            r.current_state().unwrap(),
            ResourceState::Incorrect { current } if current.contains("points to")
        ));
    }

    #[test]
    fn relative_link_to_same_file_is_correct() {
        let (_dir, source, target) = fixture();
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::os::unix::fs::symlink("../dotfiles/bashrc", &target).unwrap();
        let r = SymlinkResource::new(source, target);
        assert_eq!(r.current_state().unwrap(), ResourceState::Correct);
    }

    #[test]
    fn missing_parent_without_mkdirs_fails() {
        let (_dir, source, target) = fixture();
        let r = SymlinkResource::new(source, target).with_mkdirs(false);
        assert!(r.apply().is_err());
    }
}
