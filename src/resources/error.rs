//! Typed error variants for resource operations.
//!
//! Internal resource code returns these variants; callers convert to
//! [`anyhow::Error`] via `?` and [`crate::error::is_permission_denied`]
//! recognises [`ResourceError::PermissionDenied`] anywhere in the chain.

use thiserror::Error;

/// Errors that arise from resource checks and apply operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The current user may not modify this path.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// Path for which permission was denied.
        path: String,
    },

    /// Something already occupies the target and neither `force` nor
    /// `safe_force` was set.
    #[error("failed to create link as target already exists: {path}")]
    TargetExists {
        /// The occupied path.
        path: String,
    },

    /// `path.1` through `path.10` are all taken.
    #[error("unable to rename {path}: too many failed renames")]
    TooManyRenames {
        /// The path that could not be moved aside.
        path: String,
    },

    /// A resource cannot be applied in its current state.
    #[error("invalid state for '{resource}': {reason}")]
    InvalidState {
        /// Name or description of the resource.
        resource: String,
        /// Human-readable explanation.
        reason: String,
    },
}
