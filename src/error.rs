//! Domain-specific error types for dotbot.
//!
//! Internal modules return typed errors (e.g. [`ConfigError`],
//! [`DirectiveError`]) while command handlers at the CLI boundary convert
//! them to [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! DotbotError
//! ├── Config(ConfigError)         document parsing, includes, decoding (fatal)
//! ├── Directive(DirectiveError)   a single directive failed (recorded, non-fatal)
//! ├── Escalation(EscalationError) elevated child could not run the batch
//! └── System(SystemError)         environment discovery (fatal)
//! ```

use std::io;

use thiserror::Error;

use crate::config::Node;
use crate::resources::ResourceError;
use crate::template::TemplateError;

/// Top-level error type for dotbot.
#[derive(Error, Debug)]
pub enum DotbotError {
    /// The document could not be loaded or decoded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A directive failed while running.
    #[error("Directive error: {0}")]
    Directive(#[from] DirectiveError),

    /// Privilege escalation failed.
    #[error("Escalation error: {0}")]
    Escalation(#[from] EscalationError),

    /// The runtime environment could not be discovered.
    #[error("System error: {0}")]
    System(#[from] SystemError),
}

/// Errors raised while loading, canonicalizing, or decoding a document.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A document or included file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File that could not be read.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The document is not valid YAML.
    #[error("invalid document {origin}: {source}")]
    Parse {
        /// File name or `<stdin>`.
        origin: String,
        /// Parser error.
        source: serde_yaml::Error,
    },

    /// A file includes itself, directly or through other files.
    #[error("include cycle detected at {path}")]
    IncludeCycle {
        /// The file that was about to be included a second time.
        path: String,
    },

    /// A canonical node could not be decoded into its typed directive.
    #[error("invalid '{directive}' directive: {source}")]
    Decode {
        /// Directive or document key being decoded.
        directive: String,
        /// Deserializer error.
        source: serde_yaml::Error,
    },

    /// A shape's transforms kept rewriting the node.
    #[error("'{shape}' did not reach a canonical form after {passes} passes")]
    NotConverging {
        /// Name of the shape being applied.
        shape: &'static str,
        /// Number of passes attempted.
        passes: usize,
    },

    /// The default profile names a profile that is not defined.
    #[error("profile '{0}' is not defined")]
    UnknownProfile(String),

    /// A structural value has the wrong kind.
    #[error("{0}")]
    Invalid(String),

    /// A template used during resolution failed to render.
    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl ConfigError {
    /// Wrap a deserializer error for `directive`.
    pub fn decode(directive: &str, source: serde_yaml::Error) -> Self {
        Self::Decode {
            directive: directive.to_string(),
            source,
        }
    }
}

/// Failure of a single directive's `run_all`.
#[derive(Error, Debug)]
pub enum DirectiveError {
    /// Some entries failed; each was already logged.
    #[error("{failed} of {total} entries failed")]
    Entries {
        /// Number of failed entries.
        failed: usize,
        /// Number of entries attempted.
        total: usize,
    },

    /// Entries failed with permission errors and may be retried elevated.
    #[error("permission denied for {denied} {}", entry_noun(.denied))]
    PermissionDenied {
        /// Canonical node holding only the denied entries.
        batch: Node,
        /// Number of denied entries.
        denied: usize,
        /// Entries that failed for other reasons.
        failed: usize,
    },

    /// A template inside the directive failed to render.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The elevated retry failed.
    #[error(transparent)]
    Escalation(#[from] EscalationError),

    /// Any other failure; format with `{:#}` to include the context chain.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Errors of the privilege escalation protocol.
#[derive(Error, Debug)]
pub enum EscalationError {
    /// This process is already an elevated child.
    #[error("already elevated, refusing to escalate again")]
    Refused,

    /// The process is root or `sudo` cannot be used non-interactively.
    #[error("privilege escalation is not available")]
    Unavailable,

    /// The path of the running executable could not be resolved.
    #[error("cannot resolve own executable: {0}")]
    Executable(#[source] io::Error),

    /// The envelope could not be serialized.
    #[error("cannot serialize escalation envelope: {0}")]
    Envelope(#[from] serde_yaml::Error),

    /// The elevated child could not be started.
    #[error("cannot start elevated child: {0:#}")]
    Spawn(anyhow::Error),

    /// The elevated child exited unsuccessfully.
    #[error("elevated child failed ({})", exit_label(.code))]
    ChildFailed {
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
    },
}

const fn entry_noun(count: &usize) -> &'static str {
    if *count == 1 { "entry" } else { "entries" }
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "terminated by signal".to_string(), |c| format!("exit {c}"))
}

/// Environment discovery failures; these end the process.
#[derive(Error, Debug)]
pub enum SystemError {
    /// Neither `HOME` nor `USERPROFILE` is set.
    #[error("cannot determine home directory")]
    HomeDirectory,

    /// The state file exists but cannot be read or written.
    #[error("state file {path}: {source}")]
    StateIo {
        /// State file path.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The state file is not a JSON object of strings.
    #[error("state file {path} is corrupt: {source}")]
    StateFormat {
        /// State file path.
        path: String,
        /// Parser error.
        source: serde_json::Error,
    },

    /// The path of the running executable could not be resolved.
    #[error("cannot resolve own executable: {0}")]
    Executable(#[source] io::Error),
}

/// Return `true` if `err` or any error in its chain is a permission failure.
///
/// Recognises [`io::ErrorKind::PermissionDenied`] anywhere in the chain and
/// [`ResourceError::PermissionDenied`].
#[must_use]
pub fn is_permission_denied(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|e| e.kind() == io::ErrorKind::PermissionDenied)
            || matches!(
                cause.downcast_ref::<ResourceError>(),
                Some(ResourceError::PermissionDenied { .. })
            )
    })
}
