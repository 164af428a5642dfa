//! Persisted key/value state (`state.json`).
//!
//! Holds the configured base directory under `directory` and the installed
//! version of every `install` entry keyed by its URL.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SystemError;

/// Key holding the base directory of the dotfiles repository.
pub const DIRECTORY_KEY: &str = "directory";

/// String key/value store backed by a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    path: Option<PathBuf>,
    values: BTreeMap<String, String>,
}

/// Default state file location.
///
/// `$XDG_STATE_HOME/dotbot/state.json`, else
/// `%LOCALAPPDATA%\dotbot\state.json` on Windows, else
/// `~/.local/state/dotbot/state.json`.
#[must_use]
pub fn default_path(home: &Path) -> PathBuf {
    if let Some(dir) = std::env::var_os("XDG_STATE_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(dir).join("dotbot").join("state.json");
    }
    if cfg!(windows)
        && let Some(dir) = std::env::var_os("LOCALAPPDATA")
    {
        return PathBuf::from(dir).join("dotbot").join("state.json");
    }
    home.join(".local/state/dotbot/state.json")
}

impl State {
    /// A state that is never written to disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the state at `path`. A missing file yields an empty state.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::StateIo`] if the file exists but cannot be
    /// read, or [`SystemError::StateFormat`] if it is not a JSON object of
    /// strings.
    pub fn load(path: &Path) -> Result<Self, SystemError> {
        let values = match fs::read_to_string(path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|source| SystemError::StateFormat {
                path: path.display().to_string(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(SystemError::StateIo {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            values,
        })
    }

    /// Return the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Store `value` under `key` (in memory only).
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// The configured base directory, if any.
    #[must_use]
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.get(DIRECTORY_KEY)
            .filter(|d| !d.is_empty())
            .map(PathBuf::from)
    }

    /// File backing this state, `None` for an in-memory state.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the state back to its file as pretty-printed JSON with mode
    /// `0600`. An in-memory state is not written.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::StateIo`] if the directory or file cannot be
    /// written.
    pub fn save(&self) -> Result<(), SystemError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source| SystemError::StateIo {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let data = serde_json::to_string_pretty(&self.values).map_err(|source| {
            SystemError::StateFormat {
                path: path.display().to_string(),
                source,
            }
        })?;
        fs::write(path, data).map_err(io_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(io_err)?;
        }
        Ok(())
    }

    /// Set `key` and save immediately.
    ///
    /// # Errors
    ///
    /// Same as [`save`](Self::save).
    pub fn set_save(&mut self, key: &str, value: &str) -> Result<(), SystemError> {
        self.set(key, value);
        self.save()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = State::load(&dir.path().join("state.json")).unwrap();
        assert_eq!(state.get("directory"), None);
        assert_eq!(state.base_dir(), None);
    }

    #[test]
    fn set_save_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state.json");
        let mut state = State::load(&path).unwrap();
        state.set_save(DIRECTORY_KEY, "/home/me/dotfiles").unwrap();
        state.set_save("https://github.com/sharkdp/bat", "0.24.0").unwrap();

        let reloaded = State::load(&path).unwrap();
        assert_eq!(reloaded.base_dir(), Some(PathBuf::from("/home/me/dotfiles")));
        assert_eq!(reloaded.get("https://github.com/sharkdp/bat"), Some("0.24.0"));
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "[1, 2]").unwrap();
        let err = State::load(&path).unwrap_err();
        assert!(matches!(err, SystemError::StateFormat { .. }));
    }

    #[test]
    fn in_memory_state_never_writes() {
        let mut state = State::in_memory();
        state.set_save("k", "v").unwrap();
        assert_eq!(state.get("k"), Some("v"));
        assert!(state.path().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt as _;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        State::load(&path).unwrap().set_save("a", "b").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn file_is_pretty_json_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        State::load(&path).unwrap().set_save("directory", "/d").unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "{\n  \"directory\": \"/d\"\n}");
    }
}
