//! Directory resource.
use anyhow::{Context as _, Result};
use std::path::PathBuf;

use super::{Applicable, Resource, ResourceChange, ResourceState, fs};

/// A directory that should exist, created with `mode` when missing.
#[derive(Debug, Clone)]
pub struct DirectoryResource {
    /// Directory path.
    pub path: PathBuf,
    /// Permission bits applied to a newly created directory.
    pub mode: u32,
}

impl DirectoryResource {
    /// Create a new directory resource.
    #[must_use]
    pub const fn new(path: PathBuf, mode: u32) -> Self {
        Self { path, mode }
    }
}

impl Applicable for DirectoryResource {
    fn description(&self) -> String {
        format!("{:o} {}", self.mode, self.path.display())
    }

    fn apply(&self) -> Result<ResourceChange> {
        if self.path.is_dir() {
            return Ok(ResourceChange::AlreadyCorrect);
        }
        if let Some(ancestor) = fs::existing_ancestor(&self.path)
            && !fs::is_writable(ancestor)
        {
            return Err(super::ResourceError::PermissionDenied {
                path: ancestor.display().to_string(),
            }
            .into());
        }
        std::fs::create_dir_all(&self.path)
            .with_context(|| format!("create directory: {}", self.path.display()))?;
        fs::set_mode(&self.path, self.mode)?;
        Ok(ResourceChange::Applied)
    }
}

impl Resource for DirectoryResource {
    fn current_state(&self) -> Result<ResourceState> {
        match self.path.metadata() {
            Ok(meta) if meta.is_dir() => Ok(ResourceState::Correct),
            Ok(_) => Ok(ResourceState::Invalid {
                reason: "exists and is not a directory".to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ResourceState::Missing),
            Err(e) => Err(e).with_context(|| format!("stat {}", self.path.display())),
        }
    }
}
