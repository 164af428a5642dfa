//! `link`: symlink files from the dotfiles repository into place.
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use super::{Context, Decode, Directive, Registry, default_true, run_entries, summarize};
use crate::config::canonical::{Shape, Transform};
use crate::config::{Node, decode, encode};
use crate::error::{ConfigError, DirectiveError};
use crate::resources::symlink::{Conflict, SymlinkResource};
use crate::resources::{Applicable as _, Resource as _, ResourceChange, ResourceError, ResourceState};

/// Canonical form of `link`.
///
/// `{~/.bashrc: bashrc}`, `[{~/.bashrc: {source: bashrc}}]` and
/// `{path: ~/.bashrc, source: bashrc}` are the same entry.
pub const LINK: Shape = Shape {
    name: "link",
    key: Some("path"),
    fields: &["path", "source", "mkdirs", "force", "safe_force"],
    list: &[
        Transform::EnsureFlatList,
        Transform::MapToSliceMap,
        Transform::EnsureList,
    ],
    entry: &[
        Transform::MapKeyIntoValueMap("path"),
        Transform::MapSplitKeyVal("path", "source"),
    ],
    nested: &[],
};

/// One symlink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEntry {
    /// Where the link is created.
    pub path: String,
    /// What it points to; relative paths resolve against the base directory.
    pub source: String,
    /// Create missing parent directories.
    #[serde(default = "default_true")]
    pub mkdirs: bool,
    /// Delete whatever is in the way.
    #[serde(default)]
    pub force: bool,
    /// Rename whatever is in the way to `path.N`.
    #[serde(default)]
    pub safe_force: bool,
}

impl LinkEntry {
    const fn conflict(&self) -> Conflict {
        if self.force {
            Conflict::Remove
        } else if self.safe_force {
            Conflict::RenameAside
        } else {
            Conflict::Fail
        }
    }
}

/// The `link` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Links in document order.
    pub entries: Vec<LinkEntry>,
}

impl Decode for Link {
    const NAME: &'static str = "link";
    const SHAPE: &'static Shape = &LINK;

    fn decode(_: &Registry, node: Node) -> Result<Self, ConfigError> {
        Ok(Self {
            entries: decode(Self::NAME, node)?,
        })
    }
}

impl Directive for Link {
    fn run_all(&self, ctx: &Context) -> Result<(), DirectiveError> {
        run_entries(ctx, Self::NAME, &self.entries, |entry| link(ctx, entry))
    }

    fn describe(&self) -> Option<String> {
        summarize(self.entries.iter().map(|e| e.path.as_str()))
    }

    fn to_node(&self) -> Result<Node, ConfigError> {
        encode(Self::NAME, &self.entries)
    }
}

fn link(ctx: &Context, entry: &LinkEntry) -> Result<()> {
    let resource = SymlinkResource::new(ctx.source_path(&entry.source)?, ctx.path(&entry.path)?)
        .with_conflict(entry.conflict())
        .with_mkdirs(entry.mkdirs);
    let target = resource.target.display().to_string();
    let linked = format!("linked {}", resource.description());

    if ctx.dry_run {
        return match resource.current_state()? {
            ResourceState::Correct => {
                ctx.log.debug(&format!("{linked} (unchanged)"));
                Ok(())
            }
            ResourceState::Invalid { reason } => Err(ResourceError::InvalidState {
                resource: target,
                reason,
            }
            .into()),
            ResourceState::Incorrect { .. } if entry.conflict() == Conflict::Fail => {
                Err(ResourceError::TargetExists { path: target }.into())
            }
            ResourceState::Incorrect { current } => {
                let verb = if entry.force { "deleted" } else { "renamed" };
                ctx.report(&format!("{verb} {target} ({current})"));
                ctx.report(&linked);
                Ok(())
            }
            ResourceState::Missing => {
                ctx.report(&linked);
                Ok(())
            }
        };
    }

    match resource.apply().with_context(|| format!("link {target}"))? {
        ResourceChange::AlreadyCorrect => ctx.log.debug(&format!("{linked} (unchanged)")),
        ResourceChange::Displaced { moved_to } => {
            match moved_to {
                Some(dest) => ctx.report(&format!("renamed {target} -> {}", dest.display())),
                None => ctx.report(&format!("deleted {target}")),
            }
            ctx.report(&linked);
        }
        ResourceChange::Applied => ctx.report(&linked),
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::directives::test_helpers::{test_context, yaml};

    fn decode_link(src: &str) -> Link {
        Link::decode(&Registry::standard(), LINK.canonicalize(yaml(src)).unwrap()).unwrap()
    }

    #[test]
    fn shorthand_forms_decode_alike() {
        let expected = vec![LinkEntry {
            path: "~/.bashrc".into(),
            source: "bashrc".into(),
            mkdirs: true,
            force: false,
            safe_force: false,
        }];
        for src in [
            "{~/.bashrc: bashrc}",
            "[{~/.bashrc: bashrc}]",
            "{~/.bashrc: {source: bashrc}}",
            "{path: ~/.bashrc, source: bashrc}",
            "[[{~/.bashrc: bashrc}]]",
        ] {
            assert_eq!(decode_link(src).entries, expected, "{src}");
        }
    }

    #[test]
    fn multi_key_mapping_keeps_order() {
        let link = decode_link("{~/.b: b, ~/.a: a, ~/.c: {source: c, force: true}}");
        let paths: Vec<_> = link.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, ["~/.b", "~/.a", "~/.c"]);
        assert!(link.entries[2].force);
    }

    #[cfg(unix)]
    #[test]
    fn creates_link_with_parents() {
        let (ctx, log, _dir) = test_context();
        std::fs::write(ctx.base_dir.join("gitconfig"), "").unwrap();
        decode_link("{~/.config/git/config: gitconfig}")
            .run_all(&ctx)
            .unwrap();
        let target = ctx.home.join(".config/git/config");
        assert_eq!(std::fs::read_link(&target).unwrap(), ctx.base_dir.join("gitconfig"));
        assert!(log.contains("info: linked"));
    }

    #[cfg(unix)]
    #[test]
    fn second_run_is_unchanged() {
        let (ctx, log, _dir) = test_context();
        std::fs::write(ctx.base_dir.join("bashrc"), "").unwrap();
        let link = decode_link("{~/.bashrc: bashrc}");
        link.run_all(&ctx).unwrap();
        link.run_all(&ctx).unwrap();
        assert!(log.contains("(unchanged)"));
    }

    #[cfg(unix)]
    #[test]
    fn dry_run_reports_the_same_message_without_linking() {
        let (ctx, log, _dir) = test_context();
        std::fs::write(ctx.base_dir.join("bashrc"), "").unwrap();
        let link = decode_link("{~/.bashrc: bashrc}");

        let dry = test_context();
        std::fs::write(dry.0.base_dir.join("bashrc"), "").unwrap();
        let dry_ctx = dry.0.with_dry_run(true);
        link.run_all(&dry_ctx).unwrap();
        assert!(!dry_ctx.home.join(".bashrc").exists());

        link.run_all(&ctx).unwrap();
        let real = log.lines()[0].trim_start_matches("info: ").to_string();
        let dry_line = dry.1.lines()[0].trim_start_matches("dry_run: ").to_string();
        assert_eq!(
            real.replace(&ctx.home.display().to_string(), "~")
                .replace(&ctx.base_dir.display().to_string(), "@"),
            dry_line
                .replace(&dry_ctx.home.display().to_string(), "~")
                .replace(&dry_ctx.base_dir.display().to_string(), "@")
        );
    }

    #[test]
    fn missing_source_fails_the_entry() {
        let (ctx, log, _dir) = test_context();
        let err = decode_link("{~/.x: nope}").run_all(&ctx).unwrap_err();
        assert!(matches!(err, DirectiveError::Entries { failed: 1, total: 1 }));
        assert!(log.contains("source does not exist"));
    }

    #[cfg(unix)]
    #[test]
    fn existing_file_fails_without_force() {
        let (ctx, log, _dir) = test_context();
        std::fs::write(ctx.base_dir.join("a"), "").unwrap();
        std::fs::write(ctx.home.join(".a"), "mine").unwrap();
        assert!(decode_link("{~/.a: a}").run_all(&ctx).is_err());
        assert!(log.contains("target already exists"));
        assert_eq!(std::fs::read_to_string(ctx.home.join(".a")).unwrap(), "mine");
    }

    #[cfg(unix)]
    #[test]
    fn force_replaces_and_safe_force_renames() {
        let (ctx, log, _dir) = test_context();
        std::fs::write(ctx.base_dir.join("a"), "").unwrap();
        std::fs::write(ctx.home.join(".a"), "mine").unwrap();
        std::fs::write(ctx.home.join(".b"), "mine").unwrap();
        decode_link("{~/.a: {source: a, force: true}, ~/.b: {source: a, safe_force: true}}")
            .run_all(&ctx)
            .unwrap();
        assert!(ctx.home.join(".a").is_symlink());
        assert!(ctx.home.join(".b").is_symlink());
        assert_eq!(std::fs::read_to_string(ctx.home.join(".b.1")).unwrap(), "mine");
        assert!(log.contains("deleted"));
        assert!(log.contains("renamed"));
    }

    #[cfg(unix)]
    #[test]
    fn templates_are_rendered() {
        let (ctx, _log, _dir) = test_context();
        ctx.vars.set("Name", "vimrc");
        std::fs::write(ctx.base_dir.join("vimrc"), "").unwrap();
        decode_link("{'~/.{{ .Name }}': '{{ .Name }}'}")
            .run_all(&ctx)
            .unwrap();
        assert!(ctx.home.join(".vimrc").symlink_metadata().is_ok());
    }
}
