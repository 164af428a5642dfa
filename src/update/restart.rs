//! Replace the running process with a freshly installed executable.
use std::path::Path;
use std::process::Command;

use anyhow::{Context as _, Result};

/// Re-run `exe` with the current arguments. Only returns on failure.
///
/// # Errors
///
/// Returns an error if the new executable cannot be started.
#[cfg(unix)]
pub fn restart(exe: &Path) -> Result<()> {
    use std::os::unix::process::CommandExt as _;

    let err = Command::new(exe).args(std::env::args_os().skip(1)).exec();
    Err(err).with_context(|| format!("failed to restart {}", exe.display()))
}

/// Re-run `exe` with the current arguments, wait for it and exit with its
/// status. Only returns on failure.
///
/// # Errors
///
/// Returns an error if the new executable cannot be started.
#[cfg(not(unix))]
pub fn restart(exe: &Path) -> Result<()> {
    let status = Command::new(exe)
        .args(std::env::args_os().skip(1))
        .status()
        .with_context(|| format!("failed to restart {}", exe.display()))?;
    std::process::exit(status.code().unwrap_or(1));
}

/// Hidden sibling of `exe` named `.<name>.<suffix>`.
#[must_use]
pub fn sibling(exe: &Path, suffix: &str) -> std::path::PathBuf {
    let name = exe.file_name().map_or_else(
        || "dotbot".to_string(),
        |n| n.to_string_lossy().into_owned(),
    );
    exe.with_file_name(format!(".{name}.{suffix}"))
}
