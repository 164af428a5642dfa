//! `create`: make sure directories exist.
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use super::{Context, Decode, Directive, Registry, run_entries, summarize};
use crate::config::canonical::{Shape, Transform};
use crate::config::{Node, decode, encode};
use crate::error::{ConfigError, DirectiveError};
use crate::resources::directory::DirectoryResource;
use crate::resources::{Applicable as _, Resource as _, ResourceChange, ResourceError, ResourceState};

/// Canonical form of `create`.
pub const CREATE: Shape = Shape {
    name: "create",
    key: Some("path"),
    fields: &["path", "mode"],
    list: &[Transform::MapToSliceMap, Transform::EnsureList],
    entry: &[
        Transform::ScalarToMap("path"),
        Transform::MapKeyIntoValueMap("path"),
        Transform::MapSplitKeyVal("path", "mode"),
    ],
    nested: &[],
};

/// Permission bits written as octal digits (`755`, `"0644"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMode", into = "RawMode")]
pub struct Mode(pub u32);

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawMode {
    Digits(u64),
    Text(String),
}

impl TryFrom<RawMode> for Mode {
    type Error = String;

    fn try_from(raw: RawMode) -> Result<Self, Self::Error> {
        let digits = match raw {
            RawMode::Digits(n) => n.to_string(),
            RawMode::Text(s) => s.trim().trim_start_matches("0o").to_string(),
        };
        u32::from_str_radix(&digits, 8)
            .ok()
            .filter(|bits| *bits <= 0o7777)
            .map(Self)
            .ok_or_else(|| format!("invalid file mode '{digits}'"))
    }
}

impl From<Mode> for RawMode {
    fn from(mode: Mode) -> Self {
        format!("{:o}", mode.0)
            .parse()
            .map_or_else(|_| Self::Text(format!("{:o}", mode.0)), Self::Digits)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:o}", self.0)
    }
}

const fn default_dir_mode() -> Mode {
    Mode(0o755)
}

/// One directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEntry {
    /// Directory to create, parents included.
    pub path: String,
    /// Mode of a newly created directory.
    #[serde(default = "default_dir_mode")]
    pub mode: Mode,
}

/// The `create` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Create {
    /// Directories in document order.
    pub entries: Vec<CreateEntry>,
}

impl Decode for Create {
    const NAME: &'static str = "create";
    const SHAPE: &'static Shape = &CREATE;

    fn decode(_: &Registry, node: Node) -> Result<Self, ConfigError> {
        Ok(Self {
            entries: decode(Self::NAME, node)?,
        })
    }
}

impl Directive for Create {
    fn run_all(&self, ctx: &Context) -> Result<(), DirectiveError> {
        run_entries(ctx, Self::NAME, &self.entries, |entry| create(ctx, entry))
    }

    fn describe(&self) -> Option<String> {
        summarize(self.entries.iter().map(|e| e.path.as_str()))
    }

    fn to_node(&self) -> Result<Node, ConfigError> {
        encode(Self::NAME, &self.entries)
    }
}

fn create(ctx: &Context, entry: &CreateEntry) -> Result<()> {
    let resource = DirectoryResource::new(ctx.path(&entry.path)?, entry.mode.0);
    let path = resource.path.display().to_string();

    if ctx.dry_run {
        return match resource.current_state()? {
            ResourceState::Correct => {
                ctx.log.debug(&format!("exists {path}"));
                Ok(())
            }
            ResourceState::Invalid { reason } => Err(ResourceError::InvalidState {
                resource: path,
                reason,
            }
            .into()),
            ResourceState::Missing | ResourceState::Incorrect { .. } => {
                ctx.report(&format!("created {}", resource.description()));
                Ok(())
            }
        };
    }

    match resource
        .apply()
        .with_context(|| format!("create {path}"))?
    {
        ResourceChange::AlreadyCorrect => ctx.log.debug(&format!("exists {path}")),
        ResourceChange::Applied | ResourceChange::Displaced { .. } => {
            ctx.report(&format!("created {}", resource.description()));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::directives::test_helpers::{test_context, yaml};

    fn decode_create(src: &str) -> Create {
        Create::decode(&Registry::standard(), CREATE.canonicalize(yaml(src)).unwrap()).unwrap()
    }

    #[test]
    fn shorthand_forms() {
        let c = decode_create("[~/a, {~/b: 700}, {~/c: {mode: '0750'}}, {path: ~/d}]");
        let got: Vec<_> = c.entries.iter().map(|e| (e.path.as_str(), e.mode.0)).collect();
        assert_eq!(
            got,
            [("~/a", 0o755), ("~/b", 0o700), ("~/c", 0o750), ("~/d", 0o755)]
        );
    }

    #[test]
    fn mapping_form_keeps_order() {
        let c = decode_create("{~/z: 700, ~/y: 755}");
        assert_eq!(c.entries[0].path, "~/z");
        assert_eq!(c.entries[1].path, "~/y");
    }

    #[test]
    fn invalid_mode_is_a_decode_error() {
        let node = CREATE.canonicalize(yaml("{~/a: 999}")).unwrap();
        assert!(matches!(
            Create::decode(&Registry::standard(), node),
            Err(ConfigError::Decode { .. })
        ));
    }

    #[test]
    fn mode_serializes_as_octal_digits() {
        let c = decode_create("{~/b: 700}");
        assert_eq!(c.to_node().unwrap(), yaml("[{path: ~/b, mode: 700}]"));
    }

    #[test]
    fn creates_and_reports() {
        let (ctx, log, _dir) = test_context();
        decode_create("~/.cache/app").run_all(&ctx).unwrap();
        assert!(ctx.home.join(".cache/app").is_dir());
        assert!(log.contains("info: created 755"));

        decode_create("~/.cache/app").run_all(&ctx).unwrap();
        assert!(log.contains("debug: exists"));
    }

    #[test]
    fn dry_run_creates_nothing() {
        let (ctx, log, _dir) = test_context();
        let ctx = ctx.with_dry_run(true);
        decode_create("~/new").run_all(&ctx).unwrap();
        assert!(!ctx.home.join("new").exists());
        assert!(log.contains("dry_run: created 755"));
    }

    #[test]
    fn file_in_the_way_fails() {
        let (ctx, _log, _dir) = test_context();
        std::fs::write(ctx.home.join("f"), "").unwrap();
        let err = decode_create("~/f").run_all(&ctx).unwrap_err();
        assert!(matches!(err, DirectiveError::Entries { failed: 1, total: 1 }));
    }
}
