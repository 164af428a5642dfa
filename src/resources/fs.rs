//! File-system resource helpers.
use anyhow::{Context as _, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::ResourceError;

/// Expand a leading `~` to `home`.
#[must_use]
pub fn expand_user(path: &str, home: &Path) -> PathBuf {
    let home = home.to_string_lossy();
    PathBuf::from(shellexpand::tilde_with_context(path, || Some(&*home)).as_ref())
}

/// Make `path` absolute by joining it onto `base` when relative.
#[must_use]
pub fn absolute(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// `true` if something (including a dangling symlink) exists at `path`.
#[must_use]
pub fn occupied(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Ensure the parent directory of `path` exists, creating it (and any
/// ancestors) if necessary.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create parent: {}", parent.display()))?;
    }
    Ok(())
}

/// Remove whatever is at `path`: a file, a symlink (dangling or not), or a
/// whole directory tree. Does nothing if `path` does not exist.
///
/// # Errors
///
/// Returns an error if the path exists but cannot be removed.
pub fn remove_existing(path: &Path) -> Result<()> {
    let Ok(meta) = path.symlink_metadata() else {
        return Ok(());
    };
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
    .with_context(|| format!("remove existing: {}", path.display()))
}

/// Move `path` aside to the first free `path.1` .. `path.10`.
///
/// # Errors
///
/// Returns [`ResourceError::TooManyRenames`] if every candidate is taken, or
/// an I/O error if the rename fails.
pub fn rename_aside(path: &Path) -> Result<PathBuf> {
    for i in 1..=10 {
        let mut name = path.as_os_str().to_os_string();
        name.push(format!(".{i}"));
        let dest = PathBuf::from(name);
        if !occupied(&dest) {
            fs::rename(path, &dest).with_context(|| {
                format!("rename {} to {}", path.display(), dest.display())
            })?;
            return Ok(dest);
        }
    }
    Err(ResourceError::TooManyRenames {
        path: path.display().to_string(),
    }
    .into())
}

/// Return the closest ancestor of `path` (or `path` itself) that exists.
#[must_use]
pub fn existing_ancestor(path: &Path) -> Option<&Path> {
    path.ancestors().find(|p| !p.as_os_str().is_empty() && p.exists())
}

/// `true` if the current user can write to `path`.
///
/// Directories are probed by creating and removing a scratch file. Files
/// are opened for writing without truncation. Missing paths are not
/// writable.
#[must_use]
pub fn is_writable(path: &Path) -> bool {
    if path.is_dir() {
        let probe = path.join(format!(".dotbot-probe-{}", std::process::id()));
        let created = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&probe)
            .is_ok();
        if created {
            fs::remove_file(&probe).ok();
        }
        created
    } else {
        fs::OpenOptions::new().write(true).open(path).is_ok()
    }
}

/// Fail with [`ResourceError::PermissionDenied`] unless the directory that
/// would hold `path` is writable.
///
/// # Errors
///
/// Returns [`ResourceError::PermissionDenied`] when it is not.
pub fn require_writable_parent(path: &Path) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let dir = existing_ancestor(parent).unwrap_or(parent);
    if is_writable(dir) {
        Ok(())
    } else {
        Err(ResourceError::PermissionDenied {
            path: dir.display().to_string(),
        }
        .into())
    }
}

/// Set the permission bits of `path` on unix; a no-op elsewhere.
///
/// # Errors
///
/// Returns an error if the permissions cannot be changed.
#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt as _;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("chmod {mode:o} {}", path.display()))
}

/// Set the permission bits of `path` on unix; a no-op elsewhere.
///
/// # Errors
///
/// Never fails on this platform.
#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
