//! Release asset naming and checksum verification.
use std::fmt::Write as _;
use std::io::Read;
use std::path::Path;

use anyhow::{Context as _, Result, bail};
use sha2::{Digest, Sha256};

use crate::platform::Platform;

/// Name of the checksum listing published with every release.
pub const CHECKSUMS: &str = "checksums.txt";

/// One published release of `dotbot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// Repository URL, without a trailing slash.
    pub repo: String,
    /// Version without the leading `v`.
    pub version: String,
}

impl Release {
    /// Create a release of `repo` at `version`.
    #[must_use]
    pub fn new(repo: &str, version: &str) -> Self {
        Self {
            repo: repo.trim_end_matches('/').to_string(),
            version: version.to_string(),
        }
    }

    fn download_url(&self, file: &str) -> String {
        format!("{}/releases/download/v{}/{file}", self.repo, self.version)
    }

    /// URL of the checksum listing.
    #[must_use]
    pub fn checksums_url(&self) -> String {
        self.download_url(CHECKSUMS)
    }

    /// Archive name for `platform`, e.g. `dotbot_1.2.0_linux_amd64.tar.gz`.
    #[must_use]
    pub fn asset_name(&self, platform: &Platform) -> String {
        let (arch, ext) = if platform.is_windows() {
            let arch = match platform.arch.as_str() {
                "amd64" => "x64",
                "386" => "x86",
                other => other,
            };
            (arch, "zip")
        } else {
            let arch = match platform.arch.as_str() {
                "386" => "i386",
                other => other,
            };
            (arch, "tar.gz")
        };
        format!("dotbot_{}_{}_{arch}.{ext}", self.version, platform.os)
    }

    /// URL of the archive for `platform`.
    #[must_use]
    pub fn asset_url(&self, platform: &Platform) -> String {
        self.download_url(&self.asset_name(platform))
    }
}

/// Name of the executable inside the archive.
#[must_use]
pub fn binary_name(platform: &Platform) -> &'static str {
    if platform.is_windows() {
        "dotbot.exe"
    } else {
        "dotbot"
    }
}

/// Expected digest of `asset` in a `sha256sum`-style listing.
#[must_use]
pub fn expected_checksum(listing: &str, asset: &str) -> Option<String> {
    listing.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let digest = parts.next()?;
        let name = parts.next()?.trim_start_matches('*');
        (name == asset).then(|| digest.to_ascii_lowercase())
    })
}

/// Lowercase hex SHA-256 digest of everything `reader` yields.
///
/// # Errors
///
/// Returns an error if reading fails.
pub fn sha256_hex(reader: &mut dyn Read) -> Result<String> {
    let mut hasher = Sha256::new();
    std::io::copy(reader, &mut hasher)?;
    let mut hex = String::with_capacity(64);
    for b in hasher.finalize() {
        // write! to a String is infallible; unwrap_or(()) makes that explicit.
        write!(hex, "{b:02x}").unwrap_or(());
    }
    Ok(hex)
}

/// Compare the SHA-256 digest of the file at `path` with `expected`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the digests differ.
pub fn verify(path: &Path, expected: &str) -> Result<()> {
    let mut file =
        std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let actual = sha256_hex(&mut file).context("reading archive for checksum verification")?;
    if !actual.eq_ignore_ascii_case(expected) {
        bail!("checksum verification failed: expected {expected}, got {actual}");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    const REPO: &str = "https://github.com/jcwillox/dotbot/";

    #[test]
    fn asset_names_per_platform() {
        let release = Release::new(REPO, "2.1.0");
        assert_eq!(
            release.asset_name(&Platform::new("linux", "amd64")),
            "dotbot_2.1.0_linux_amd64.tar.gz"
        );
        assert_eq!(
            release.asset_name(&Platform::new("linux", "386")),
            "dotbot_2.1.0_linux_i386.tar.gz"
        );
        assert_eq!(
            release.asset_name(&Platform::new("windows", "amd64")),
            "dotbot_2.1.0_windows_x64.zip"
        );
        assert_eq!(
            release.asset_name(&Platform::new("darwin", "arm64")),
            "dotbot_2.1.0_darwin_arm64.tar.gz"
        );
    }

    #[test]
    fn urls_use_the_v_tag() {
        let release = Release::new(REPO, "2.1.0");
        assert_eq!(
            release.checksums_url(),
            "https://github.com/jcwillox/dotbot/releases/download/v2.1.0/checksums.txt"
        );
        assert!(
            release
                .asset_url(&Platform::new("linux", "arm64"))
                .ends_with("/v2.1.0/dotbot_2.1.0_linux_arm64.tar.gz")
        );
    }

    #[test]
    fn finds_expected_checksum() {
        let listing = "abc123  dotbot_2.1.0_linux_amd64.tar.gz\n\
                       DEF456 *dotbot_2.1.0_windows_x64.zip\n";
        assert_eq!(
            expected_checksum(listing, "dotbot_2.1.0_linux_amd64.tar.gz").as_deref(),
            Some("abc123")
        );
        assert_eq!(
            expected_checksum(listing, "dotbot_2.1.0_windows_x64.zip").as_deref(),
            Some("def456")
        );
        assert_eq!(expected_checksum(listing, "dotbot_2.1.0_linux_amd64"), None);
    }

    #[test]
    fn sha256_known_value() {
        let digest = sha256_hex(&mut "hello\n".as_bytes()).unwrap();
        assert_eq!(
            digest,
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
    }

    #[test]
    fn verify_rejects_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a");
        std::fs::write(&path, "hello\n").unwrap();
        verify(
            &path,
            "5891B5B522D5DF086D0FF0B110FBD9D21BB4FC7163AF34D08286A2E846F6BE03",
        )
        .unwrap();
        let err = verify(&path, "00").unwrap_err();
        assert!(err.to_string().contains("checksum verification failed"));
    }
}
