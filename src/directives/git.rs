//! `git`: clone repositories and keep them up to date.
use std::path::Path;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use super::{Context, Decode, Directive, Registry, default_true, run_entries, summarize};
use crate::config::canonical::{Shape, Transform};
use crate::config::{Node, decode, encode};
use crate::error::{ConfigError, DirectiveError};
use crate::exec::{Attach, Invocation};
use crate::resources::ResourceError;
use crate::resources::fs;

/// Canonical form of `git`: `{~/.vim/pack/x: https://...}` or full entries.
pub const GIT: Shape = Shape {
    name: "git",
    key: Some("path"),
    fields: &["path", "url", "name", "method", "shallow"],
    list: &[Transform::MapToSliceMap, Transform::EnsureList],
    entry: &[
        Transform::MapKeyIntoValueMap("path"),
        Transform::MapSplitKeyVal("path", "url"),
    ],
    nested: &[],
};

/// Printed by `git pull` when nothing changed.
const UP_TO_DATE: &str = "Already up to date.";

/// What to do with a repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Clone when missing, otherwise pull.
    #[default]
    ClonePull,
    /// Clone when missing, otherwise leave alone.
    Clone,
    /// Pull an existing clone; a missing one is an error.
    Pull,
}

/// One repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitEntry {
    /// Working tree location.
    pub path: String,
    /// Remote to clone from.
    #[serde(default)]
    pub url: String,
    /// Display name, defaults to the URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Clone and pull behaviour.
    #[serde(default)]
    pub method: Method,
    /// Clone with `--depth=1`.
    #[serde(default = "default_true")]
    pub shallow: bool,
}

/// The `git` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Git {
    /// Repositories in document order.
    pub entries: Vec<GitEntry>,
}

impl Decode for Git {
    const NAME: &'static str = "git";
    const SHAPE: &'static Shape = &GIT;

    fn decode(_: &Registry, node: Node) -> Result<Self, ConfigError> {
        Ok(Self {
            entries: decode(Self::NAME, node)?,
        })
    }
}

impl Directive for Git {
    fn run_all(&self, ctx: &Context) -> Result<(), DirectiveError> {
        run_entries(ctx, Self::NAME, &self.entries, |entry| sync(ctx, entry))
    }

    fn describe(&self) -> Option<String> {
        summarize(self.entries.iter().map(|e| {
            if e.name.is_empty() {
                e.url.as_str()
            } else {
                e.name.as_str()
            }
        }))
    }

    fn to_node(&self) -> Result<Node, ConfigError> {
        encode(Self::NAME, &self.entries)
    }
}

/// `true` if `path` holds a repository.
///
/// # Errors
///
/// Returns an error if `path` looks like a repository but cannot be opened.
pub fn is_repository(path: &Path) -> Result<bool> {
    match git2::Repository::open(path) {
        Ok(_) => Ok(true),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("open repository {}", path.display())),
    }
}

/// Whether work in `dir` needs `sudo`. Fails when it does but `sudo` is not
/// available.
fn needs_sudo(ctx: &Context, dir: &Path) -> Result<bool> {
    let existing = fs::existing_ancestor(dir).unwrap_or(dir);
    if fs::is_writable(existing) {
        return Ok(false);
    }
    if !ctx.platform.is_root && ctx.can_sudo() {
        return Ok(true);
    }
    Err(ResourceError::PermissionDenied {
        path: existing.display().to_string(),
    }
    .into())
}

fn sync(ctx: &Context, entry: &GitEntry) -> Result<()> {
    let path = ctx.path(&entry.path)?;
    let url = ctx.render(&entry.url)?;
    let label = if entry.name.is_empty() {
        url.clone()
    } else {
        ctx.render(&entry.name)?
    };
    let exists = is_repository(&path)?;

    match (entry.method, exists) {
        (Method::ClonePull | Method::Clone, false) => {
            let parent = path.parent().unwrap_or_else(|| Path::new("."));
            clone(ctx, &url, &path, entry.shallow, &label, parent)
        }
        (Method::ClonePull | Method::Pull, true) => pull(ctx, &path, &label),
        (Method::Clone, true) => {
            ctx.log.debug(&format!("cloned {label}"));
            Ok(())
        }
        (Method::Pull, false) => {
            anyhow::bail!("{} is not a git repository", path.display())
        }
    }
}

fn clone(
    ctx: &Context,
    url: &str,
    path: &Path,
    shallow: bool,
    label: &str,
    parent: &Path,
) -> Result<()> {
    let elevate = needs_sudo(ctx, parent)?;
    ctx.report(&format!(
        "cloning{} {label}",
        if elevate { " (sudo)" } else { "" }
    ));
    if ctx.dry_run {
        return Ok(());
    }
    let target = path.display().to_string();
    let mut args = vec!["clone"];
    if shallow {
        args.push("--depth=1");
    }
    args.extend([url, target.as_str()]);
    Invocation::new("git", args).sudo_if(elevate).run_attached(
        ctx.executor.as_ref(),
        Attach {
            stdin: elevate,
            ..Attach::default()
        },
    )?;
    Ok(())
}

fn pull(ctx: &Context, path: &Path, label: &str) -> Result<()> {
    let elevate = needs_sudo(ctx, path)?;
    if ctx.dry_run {
        ctx.report(&format!("pulling {label}"));
        return Ok(());
    }
    let dir = path.display().to_string();
    let invocation =
        Invocation::new("git", ["-C", dir.as_str(), "pull", "--progress"]).sudo_if(elevate);

    let mut changed = Vec::new();
    let result = ctx.executor.run_streaming(
        &invocation.program,
        &invocation.arg_refs(),
        &mut |line| {
            if line.trim() != UP_TO_DATE {
                changed.push(line.to_string());
            }
        },
    )?;
    invocation.check(result)?;

    if changed.is_empty() {
        ctx.log.debug(&format!("up-to-date {label}"));
    } else {
        ctx.report(&format!("pulled {label}"));
        for line in &changed {
            ctx.log.debug(line);
        }
    }
    Ok(())
}
