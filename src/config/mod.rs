//! Document loading: includes, canonical shapes, profiles and state.
pub mod canonical;
pub mod include;
pub mod node;
pub mod profiles;
pub mod state;

use std::path::{Path, PathBuf};

pub use node::{Mapping, Node, decode, encode, key_str, pair, scalar_text};
pub use profiles::{DefaultProfile, Profile, Selection};
pub use state::State;

use crate::error::ConfigError;
use canonical::FLAT_LIST;

/// File names searched for when no document path is given.
pub const DOCUMENT_NAMES: &[&str] = &["dotbot.yaml", "dotbot.yml", "dotbot.json"];

/// `PATH` prefix stripped by `strip_path: true`.
pub const DEFAULT_STRIP_PREFIX: &str = "/mnt/c";

/// A loaded document with its includes resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Root directive list, not yet canonicalized.
    pub config: Node,
    /// Named profiles.
    pub profiles: Vec<Profile>,
    /// Candidates for the default profile.
    pub default_profile: Vec<DefaultProfile>,
    /// Initial template variables.
    pub vars: Mapping,
    /// `PATH` prefixes to drop on WSL.
    pub strip_path: Vec<String>,
    /// Pull the dotfiles repository before running.
    pub update_repo: bool,
    /// Check for a newer dotbot release before running.
    pub update_dotbot: bool,
    /// Log the elapsed time at the end of a run.
    pub show_total_time: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            config: Node::Sequence(Vec::new()),
            profiles: Vec::new(),
            default_profile: Vec::new(),
            vars: Mapping::new(),
            strip_path: Vec::new(),
            update_repo: true,
            update_dotbot: true,
            show_total_time: true,
        }
    }
}

impl Document {
    /// Load the document at `path`, resolving includes relative to it.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read or parsed, an
    /// include fails, or a top-level key has the wrong shape.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_node(include::load_file(path)?)
    }

    /// Parse a document from `text`; relative includes resolve against
    /// `base`.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn parse(text: &str, origin: &str, base: &Path) -> Result<Self, ConfigError> {
        let node = include::parse(text, origin)?;
        Self::from_node(include::resolve(node, base)?)
    }

    /// Build a document from an already include-resolved tree. A root
    /// sequence is the directive list itself.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a top-level key has the wrong shape.
    pub fn from_node(node: Node) -> Result<Self, ConfigError> {
        let mut doc = Self::default();
        let map = match node {
            Node::Null => return Ok(doc),
            Node::Sequence(_) => {
                doc.config = node;
                return Ok(doc);
            }
            Node::Mapping(map) => map,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "document must be a mapping or a list, got {other:?}"
                )));
            }
        };

        for (key, value) in map {
            let Some(key) = key_str(&key) else {
                return Err(ConfigError::Invalid(format!(
                    "document keys must be strings, got {key:?}"
                )));
            };
            match key.as_str() {
                "config" => doc.config = value,
                "profiles" => doc.profiles = profiles::decode_profiles(value)?,
                "default_profile" => doc.default_profile = profiles::decode_default_profile(value)?,
                "vars" => {
                    doc.vars = match value {
                        Node::Null => Mapping::new(),
                        Node::Mapping(m) => m,
                        other => {
                            return Err(ConfigError::Invalid(format!(
                                "vars must be a mapping, got {other:?}"
                            )));
                        }
                    };
                }
                "strip_path" => doc.strip_path = decode_strip_path(value)?,
                "update_repo" => doc.update_repo = decode_flag(&key, value, true)?,
                "update_dotbot" => doc.update_dotbot = decode_flag(&key, value, true)?,
                "show_total_time" => doc.show_total_time = decode_flag(&key, value, true)?,
                other => tracing::warn!("ignoring unknown document key '{other}'"),
            }
        }
        Ok(doc)
    }
}

fn decode_flag(key: &str, value: Node, default: bool) -> Result<bool, ConfigError> {
    Ok(decode::<Option<bool>>(key, value)?.unwrap_or(default))
}

/// `true` means the default prefix, `false` none, otherwise a list.
fn decode_strip_path(value: Node) -> Result<Vec<String>, ConfigError> {
    match value {
        Node::Bool(true) => Ok(vec![DEFAULT_STRIP_PREFIX.to_string()]),
        Node::Bool(false) | Node::Null => Ok(Vec::new()),
        other => decode("strip_path", FLAT_LIST.canonicalize(other)?),
    }
}

/// Locate the document.
///
/// An explicit path (flag or `DOTBOT_CONFIG`) is used as is. Otherwise the
/// first of [`DOCUMENT_NAMES`] found in `base_dir`, then in `cwd`.
#[must_use]
pub fn config_path(explicit: Option<&Path>, base_dir: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    base_dir
        .into_iter()
        .chain(std::iter::once(cwd))
        .flat_map(|dir| DOCUMENT_NAMES.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

/// Remove every entry of the `PATH`-style `path` that starts with one of
/// `prefixes`.
#[must_use]
pub fn strip_path_entries(path: &str, prefixes: &[String]) -> String {
    let separator = if cfg!(windows) { ";" } else { ":" };
    path.split(separator)
        .filter(|entry| {
            !prefixes
                .iter()
                .any(|p| !p.is_empty() && entry.starts_with(p.as_str()))
        })
        .collect::<Vec<_>>()
        .join(separator)
}
