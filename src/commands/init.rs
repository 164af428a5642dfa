//! `dotbot init`: clone a dotfiles repository from GitHub and remember it as
//! the dotfiles directory.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};

use super::CommandSetup;
use crate::cli::{GlobalOpts, InitOpts};
use crate::config::state::DIRECTORY_KEY;
use crate::directives::git::{Git, GitEntry, Method};
use crate::directives::{Context, Directive as _};
use crate::logging::{Log, Logger};

/// Repository assumed when only an owner is given.
pub const DEFAULT_REPO: &str = "dotfiles";

/// Split `owner` or `owner/repo` into the full `owner/repo` slug and the
/// directory name to clone into.
#[must_use]
pub fn repo_slug(repo: &str) -> (String, String) {
    match repo.split_once('/') {
        Some((_, name)) if !name.is_empty() => (repo.to_string(), name.to_string()),
        _ => (
            format!("{}/{DEFAULT_REPO}", repo.trim_end_matches('/')),
            DEFAULT_REPO.to_string(),
        ),
    }
}

/// Run the `init` command.
///
/// # Errors
///
/// Returns an error if cloning fails, the state file cannot be written, or
/// the `--apply` run fails.
pub fn run(global: &GlobalOpts, opts: &InitOpts, log: &Arc<Logger>) -> Result<()> {
    let cwd = std::env::current_dir().context("cannot determine the working directory")?;
    let setup = CommandSetup::init()?;
    let ctx = setup.into_context(Arc::clone(log) as Arc<dyn Log>, cwd.clone(), global.dry_run);
    let dir = clone_into(&ctx, &opts.repo, &cwd)?;
    log.info(&format!("dotfiles directory set to {}", dir.display()));

    if opts.apply && !global.dry_run {
        return super::run::run_document(CommandSetup::init()?, global, log, false);
    }
    Ok(())
}

/// Clone `repo` into `cwd` and store the clone as the dotfiles directory.
/// An existing clone is pulled instead.
///
/// # Errors
///
/// Returns an error if the clone fails or the state cannot be saved.
pub fn clone_into(ctx: &Context, repo: &str, cwd: &Path) -> Result<PathBuf> {
    let (slug, name) = repo_slug(repo);
    let dir = cwd.join(&name);
    let git = Git {
        entries: vec![GitEntry {
            path: dir.display().to_string(),
            url: format!("https://github.com/{slug}"),
            name: slug.clone(),
            method: Method::ClonePull,
            shallow: false,
        }],
    };
    git.run_all(ctx)
        .with_context(|| format!("failed to clone {slug}"))?;

    if ctx.dry_run {
        ctx.report(&format!("set {DIRECTORY_KEY} = {}", dir.display()));
    } else {
        ctx.state
            .borrow_mut()
            .set_save(DIRECTORY_KEY, &dir.display().to_string())?;
    }
    Ok(dir)
}
