//! Self-update of the `dotbot` executable and of the dotfiles repository.
//!
//! Both run before a document is applied. Self-update replaces the running
//! process once the new executable is in place, so the rest of the run
//! uses the new version.
pub mod release;
pub mod repo;
pub mod restart;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use crate::directives::extract::{MemberKind, walk_archive};
use crate::escalation::Escalator;
use crate::logging::Log;
use crate::platform::Platform;
use crate::resources::fs;
use crate::{VERSION, http};

pub use release::Release;

/// Where releases are published.
pub const REPO_URL: &str = "https://github.com/jcwillox/dotbot";

/// Set to `1` to disable self-update.
pub const NO_UPDATE_ENV: &str = "DOTBOT_NO_UPDATE";

/// Why an update was not attempted, if it should not be.
#[must_use]
pub fn skip_reason(version: &str, escalator: &Escalator, env_disabled: bool) -> Option<&'static str> {
    if env_disabled {
        Some("disabled by DOTBOT_NO_UPDATE")
    } else if escalator.is_child() {
        Some("running as the elevated child")
    } else if version.starts_with("dev") {
        Some("development build")
    } else {
        None
    }
}

fn env_disabled() -> bool {
    std::env::var(NO_UPDATE_ENV).is_ok_and(|v| v == "1")
}

/// Result of [`self_update`] when it returns normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// Not attempted.
    Skipped(&'static str),
    /// Already at the latest version.
    UpToDate,
    /// A newer release exists but its assets are not published yet.
    Pending(String),
    /// The executable cannot be replaced by this user.
    NotWritable(PathBuf),
    /// The executable was replaced; only returned when `restart` is off.
    Installed(String),
}

/// Update the running executable to the latest release and restart into it
/// when `restart` is set.
///
/// # Errors
///
/// Returns an error if the release cannot be looked up, downloaded,
/// verified or unpacked, or if the restart fails. The previous executable
/// is put back when installing the new one fails.
pub fn self_update(
    log: &dyn Log,
    platform: &Platform,
    escalator: &Escalator,
    restart: bool,
) -> Result<Update> {
    if let Some(reason) = skip_reason(VERSION, escalator, env_disabled()) {
        log.debug(&format!("skipping self-update: {reason}"));
        return Ok(Update::Skipped(reason));
    }
    let exe = std::env::current_exe().context("locating the running executable")?;
    let exe = dunce::canonicalize(&exe).unwrap_or(exe);
    update_executable(log, platform, &exe, REPO_URL, VERSION, restart)
}

/// Update `exe` from `repo` when its latest release differs from `current`.
///
/// # Errors
///
/// Same as [`self_update`].
pub fn update_executable(
    log: &dyn Log,
    platform: &Platform,
    exe: &Path,
    repo: &str,
    current: &str,
    restart: bool,
) -> Result<Update> {
    let latest = http::latest_release(repo).context("failed to get the latest version of dotbot")?;
    if latest == current {
        log.debug(&format!("dotbot {current} is up to date"));
        return Ok(Update::UpToDate);
    }
    let release = Release::new(repo, &latest);
    if !http::exists(&release.checksums_url())
        .context("failed checking if release assets are available")?
    {
        log.debug(&format!("dotbot {latest} assets are not published yet"));
        return Ok(Update::Pending(latest));
    }
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    if !fs::is_writable(dir) {
        log.warn("skipping update as user does not have sufficient permissions");
        return Ok(Update::NotWritable(exe.to_path_buf()));
    }

    log.info(&format!("updating dotbot {current} -> {latest}"));
    let old = restart::sibling(exe, "old");
    std::fs::rename(exe, &old)
        .with_context(|| format!("failed to move {} aside", exe.display()))?;
    if let Err(e) = install(platform, &release, exe) {
        let _ = std::fs::remove_file(exe);
        std::fs::rename(&old, exe)
            .with_context(|| format!("failed to restore {}", exe.display()))?;
        return Err(e);
    }
    if let Err(e) = std::fs::remove_file(&old) {
        log.debug(&format!("cannot remove {}: {e}", old.display()));
    }
    log.info(&format!("updated dotbot to {latest}"));

    if restart {
        restart::restart(exe)?;
    }
    Ok(Update::Installed(latest))
}

/// Download, verify and unpack the release binary to `exe`.
fn install(platform: &Platform, release: &Release, exe: &Path) -> Result<()> {
    let asset = release.asset_name(platform);
    let listing = http::get_string(&release.checksums_url())?;
    let expected = release::expected_checksum(&listing, &asset)
        .with_context(|| format!("{asset} is missing from {}", release::CHECKSUMS))?;

    let archive = restart::sibling(exe, &asset);
    let result = download(&release.asset_url(platform), &archive)
        .and_then(|()| release::verify(&archive, &expected))
        .and_then(|()| unpack(&archive, release::binary_name(platform), exe));
    let _ = std::fs::remove_file(&archive);
    result
}

fn download(url: &str, dest: &Path) -> Result<()> {
    let file = File::create(dest).with_context(|| format!("create {}", dest.display()))?;
    let mut out = BufWriter::new(file);
    http::download_to(url, &mut out)?;
    std::io::Write::flush(&mut out)?;
    Ok(())
}

/// Write the archive member named `binary` to `exe`.
fn unpack(archive: &Path, binary: &str, exe: &Path) -> Result<()> {
    let mut found = false;
    walk_archive(archive, &mut |name, kind, _mode, data| {
        let base = name.rsplit('/').next().unwrap_or(name);
        if found || kind != MemberKind::File || base != binary {
            return Ok(());
        }
        let mut out = File::create(exe).with_context(|| format!("create {}", exe.display()))?;
        std::io::copy(data, &mut out)?;
        found = true;
        Ok(())
    })?;
    if !found {
        anyhow::bail!("{binary} not found in {}", archive.display());
    }
    fs::set_mode(exe, 0o755)?;
    Ok(())
}
