//! `clean`: remove dead symlinks that point into the dotfiles repository.
use std::path::Path;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use super::{Context, Decode, Directive, Registry, run_entries, summarize};
use crate::config::canonical::{Shape, Transform};
use crate::config::{Node, decode, encode};
use crate::error::{ConfigError, DirectiveError};

/// Canonical form of `clean`: `[~, ~/.config]`, `{~/.config: {recursive: true}}`.
pub const CLEAN: Shape = Shape {
    name: "clean",
    key: Some("path"),
    fields: &["path", "force", "recursive"],
    list: &[Transform::MapToSliceMap, Transform::EnsureList],
    entry: &[Transform::EnsureMapMap, Transform::MapKeyIntoValueMap("path")],
    nested: &[],
};

/// One directory to clean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanEntry {
    /// Directory to scan.
    pub path: String,
    /// Also remove dead links that point outside the base directory.
    #[serde(default)]
    pub force: bool,
    /// Descend into subdirectories.
    #[serde(default)]
    pub recursive: bool,
}

/// The `clean` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clean {
    /// Directories in document order.
    pub entries: Vec<CleanEntry>,
}

impl Decode for Clean {
    const NAME: &'static str = "clean";
    const SHAPE: &'static Shape = &CLEAN;

    fn decode(_: &Registry, node: Node) -> Result<Self, ConfigError> {
        Ok(Self {
            entries: decode(Self::NAME, node)?,
        })
    }
}

impl Directive for Clean {
    fn run_all(&self, ctx: &Context) -> Result<(), DirectiveError> {
        let mut removed = 0;
        let result = run_entries(ctx, Self::NAME, &self.entries, |entry| {
            let dir = ctx.path(&entry.path)?;
            removed += clean_dir(ctx, entry, &dir)?;
            Ok(())
        });
        let paths = self.describe().unwrap_or_default();
        if removed > 0 {
            ctx.report(&format!("cleaned {paths}"));
        } else {
            ctx.log.debug(&format!("nothing to clean in {paths}"));
        }
        result
    }

    fn describe(&self) -> Option<String> {
        summarize(self.entries.iter().map(|e| e.path.as_str()))
    }

    fn to_node(&self) -> Result<Node, ConfigError> {
        encode(Self::NAME, &self.entries)
    }
}

/// Remove dead links directly in `dir` (or below it when recursive).
/// A missing `dir` is not an error.
fn clean_dir(ctx: &Context, entry: &CleanEntry, dir: &Path) -> Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e).with_context(|| format!("read {}", dir.display())),
    };

    let mut removed = 0;
    for item in entries {
        let item = item.with_context(|| format!("read {}", dir.display()))?;
        let path = item.path();
        let file_type = item
            .file_type()
            .with_context(|| format!("stat {}", path.display()))?;
        if file_type.is_dir() {
            if entry.recursive {
                removed += clean_dir(ctx, entry, &path)?;
            }
            continue;
        }
        if !file_type.is_symlink() {
            continue;
        }

        let dest = std::fs::read_link(&path)
            .with_context(|| format!("read link {}", path.display()))?;
        let resolved = if dest.is_absolute() {
            dest.clone()
        } else {
            dir.join(&dest)
        };
        if !entry.force && !ctx.in_base_dir(&resolved) {
            continue;
        }
        if resolved.exists() {
            continue;
        }

        if !ctx.dry_run {
            std::fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        }
        ctx.report(&format!("deleted {} -> {}", path.display(), dest.display()));
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::directives::test_helpers::{test_context, yaml};

    fn decode_clean(src: &str) -> Clean {
        Clean::decode(&Registry::standard(), CLEAN.canonicalize(yaml(src)).unwrap()).unwrap()
    }

    #[test]
    fn shorthand_forms() {
        let c = decode_clean("['~', {~/.config: {recursive: true}}, {path: /tmp, force: true}]");
        assert_eq!(c.entries.len(), 3);
        assert_eq!(c.entries[0].path, "~");
        assert!(c.entries[1].recursive);
        assert!(c.entries[2].force);

        let m = decode_clean("{'~': null, ~/.config: {recursive: true}}");
        assert_eq!(m.entries[0].path, "~");
        assert!(!m.entries[0].recursive);
        assert!(m.entries[1].recursive);
    }

    #[test]
    fn scalar_entry_becomes_path() {
        assert_eq!(decode_clean("~/.config").entries[0].path, "~/.config");
    }

    #[cfg(unix)]
    fn dead_link(ctx: &Context, name: &str, to: &Path) {
        std::os::unix::fs::symlink(to, ctx.home.join(name)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn removes_only_dead_links_into_base() {
        let (ctx, log, dir) = test_context();
        std::fs::write(ctx.base_dir.join("alive"), "").unwrap();
        dead_link(&ctx, ".dead", &ctx.base_dir.join("gone"));
        dead_link(&ctx, ".alive", &ctx.base_dir.join("alive"));
        dead_link(&ctx, ".foreign", &dir.path().join("elsewhere"));

        decode_clean("'~'").run_all(&ctx).unwrap();
        assert!(ctx.home.join(".dead").symlink_metadata().is_err());
        assert!(ctx.home.join(".alive").symlink_metadata().is_ok());
        assert!(ctx.home.join(".foreign").symlink_metadata().is_ok());
        assert!(log.contains("info: cleaned ~"));
    }

    #[cfg(unix)]
    #[test]
    fn force_removes_foreign_dead_links() {
        let (ctx, _log, dir) = test_context();
        dead_link(&ctx, ".foreign", &dir.path().join("elsewhere"));
        decode_clean("{'~': {force: true}}").run_all(&ctx).unwrap();
        assert!(ctx.home.join(".foreign").symlink_metadata().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn recursion_is_opt_in() {
        let (ctx, _log, _dir) = test_context();
        std::fs::create_dir(ctx.home.join("sub")).unwrap();
        dead_link(&ctx, "sub/.dead", &ctx.base_dir.join("gone"));
        decode_clean("'~'").run_all(&ctx).unwrap();
        assert!(ctx.home.join("sub/.dead").symlink_metadata().is_ok());
        decode_clean("{'~': {recursive: true}}").run_all(&ctx).unwrap();
        assert!(ctx.home.join("sub/.dead").symlink_metadata().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn dry_run_keeps_links() {
        let (ctx, log, _dir) = test_context();
        dead_link(&ctx, ".dead", &ctx.base_dir.join("gone"));
        let ctx = ctx.with_dry_run(true);
        decode_clean("'~'").run_all(&ctx).unwrap();
        assert!(ctx.home.join(".dead").symlink_metadata().is_ok());
        assert!(log.contains("dry_run: deleted"));
    }

    #[test]
    fn missing_directory_is_fine() {
        let (ctx, _log, _dir) = test_context();
        decode_clean("~/does-not-exist").run_all(&ctx).unwrap();
    }
}
