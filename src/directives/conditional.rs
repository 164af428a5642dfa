//! `if` and `system`: gate nested directive lists on templates and host
//! facts.
use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{Context, Decode, Directive, DirectiveList, Registry};
use crate::config::canonical::{FLAT_LIST, Shape, Transform};
use crate::config::{Mapping, Node, decode, encode};
use crate::error::{ConfigError, DirectiveError};
use crate::platform::Platform;
use crate::template;

/// Canonical form of `if`.
pub const IF: Shape = Shape {
    name: "if",
    key: None,
    fields: &["condition", "then", "else"],
    list: &[Transform::EnsureList],
    entry: &[],
    nested: &[("condition", &FLAT_LIST)],
};

/// Canonical form of `system`.
pub const SYSTEM: Shape = Shape {
    name: "system",
    key: None,
    fields: &[
        "os", "arch", "platform", "family", "libc", "distro", "is_root", "can_sudo", "then",
    ],
    list: &[Transform::EnsureList],
    entry: &[],
    nested: &[
        ("os", &FLAT_LIST),
        ("arch", &FLAT_LIST),
        ("platform", &FLAT_LIST),
        ("family", &FLAT_LIST),
        ("libc", &FLAT_LIST),
        ("distro", &FLAT_LIST),
    ],
};

/// Run `list` and report its failures as this entry's failure.
fn run_nested(ctx: &Context, list: &DirectiveList) -> Result<()> {
    let outcome = list.run_all(ctx);
    if outcome.failed > 0 {
        anyhow::bail!("{} of {} nested directives failed", outcome.failed, outcome.total);
    }
    Ok(())
}

fn insert_list(map: &mut Mapping, key: &str, list: &DirectiveList) -> Result<(), ConfigError> {
    if !list.is_empty() {
        map.insert(key.into(), list.to_node()?);
    }
    Ok(())
}

#[derive(Deserialize)]
struct RawIf {
    #[serde(default)]
    condition: Vec<String>,
    #[serde(default)]
    then: Node,
    #[serde(default, rename = "else")]
    otherwise: Node,
}

/// One `if` entry.
#[derive(Debug)]
pub struct IfEntry {
    /// Templates that must all render `true`.
    pub condition: Vec<String>,
    /// Run when every condition holds.
    pub then: DirectiveList,
    /// Run otherwise.
    pub otherwise: DirectiveList,
}

impl IfEntry {
    /// Evaluate the condition. An empty condition holds.
    ///
    /// # Errors
    ///
    /// Returns a [`template::TemplateError`] if a condition fails to render.
    pub fn holds(&self, ctx: &Context) -> Result<bool, template::TemplateError> {
        for condition in &self.condition {
            if !template::render_true(ctx, condition)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// The `if` directive.
#[derive(Debug)]
pub struct If {
    /// Entries in document order, each evaluated independently.
    pub entries: Vec<IfEntry>,
}

impl Decode for If {
    const NAME: &'static str = "if";
    const SHAPE: &'static Shape = &IF;
    const LISTS: &'static [&'static str] = &["then", "else"];

    fn decode(registry: &Registry, node: Node) -> Result<Self, ConfigError> {
        let raw: Vec<RawIf> = decode(Self::NAME, node)?;
        let entries = raw
            .into_iter()
            .map(|e| {
                Ok(IfEntry {
                    condition: e.condition,
                    then: registry.decode_list(e.then)?,
                    otherwise: registry.decode_list(e.otherwise)?,
                })
            })
            .collect::<Result<_, ConfigError>>()?;
        Ok(Self { entries })
    }
}

impl Directive for If {
    fn run_all(&self, ctx: &Context) -> Result<(), DirectiveError> {
        let mut failed = 0;
        for entry in &self.entries {
            let branch = match entry.holds(ctx) {
                Ok(true) => &entry.then,
                Ok(false) => &entry.otherwise,
                Err(e) => {
                    ctx.log.error(&format!("if: {e}"));
                    failed += 1;
                    continue;
                }
            };
            if let Err(e) = run_nested(ctx, branch) {
                ctx.log.debug(&format!("if: {e}"));
            }
        }
        if failed > 0 {
            return Err(DirectiveError::Entries {
                failed,
                total: self.entries.len(),
            });
        }
        Ok(())
    }

    fn describe(&self) -> Option<String> {
        let conditions: Vec<&str> = self
            .entries
            .iter()
            .flat_map(|e| e.condition.iter().map(String::as_str))
            .collect();
        super::summarize(conditions)
    }

    fn to_node(&self) -> Result<Node, ConfigError> {
        self.entries
            .iter()
            .map(|e| {
                let mut map = Mapping::new();
                map.insert("condition".into(), encode(Self::NAME, &e.condition)?);
                insert_list(&mut map, "then", &e.then)?;
                insert_list(&mut map, "else", &e.otherwise)?;
                Ok(Node::Mapping(map))
            })
            .collect::<Result<Vec<_>, ConfigError>>()
            .map(Node::Sequence)
    }
}

/// Host facts an entry must match. Empty lists match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    /// `linux`, `darwin`, `windows`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub os: Vec<String>,
    /// `amd64`, `arm64`, ...
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arch: Vec<String>,
    /// Distribution id.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platform: Vec<String>,
    /// Distribution family.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub family: Vec<String>,
    /// `glibc` or `musl`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libc: Vec<String>,
    /// Distribution name prefixes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub distro: Vec<String>,
    /// Require running as root. `false` places no constraint.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_root: bool,
    /// Require usable `sudo`. `false` places no constraint.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub can_sudo: bool,
}

fn one_of(wanted: &[String], actual: &str) -> bool {
    wanted.is_empty() || wanted.iter().any(|w| w.eq_ignore_ascii_case(actual))
}

impl Predicate {
    /// Match against the static facts of `platform`; `can_sudo` is only
    /// asked for when the predicate names it.
    pub fn matches(&self, platform: &Platform, can_sudo: impl FnOnce() -> bool) -> bool {
        one_of(&self.os, &platform.os)
            && one_of(&self.arch, &platform.arch)
            && one_of(&self.platform, &platform.platform)
            && one_of(&self.family, &platform.family)
            && one_of(&self.libc, &platform.libc)
            && (self.distro.is_empty() || self.distro.iter().any(|d| platform.match_distro(d)))
            && (!self.is_root || platform.is_root)
            && (!self.can_sudo || can_sudo())
    }
}

/// One `system` entry.
#[derive(Debug)]
pub struct SystemEntry {
    /// Facts to match.
    pub predicate: Predicate,
    /// Run when matched.
    pub then: DirectiveList,
}

/// The `system` directive.
#[derive(Debug)]
pub struct System {
    /// Entries tried in order; only the first match runs.
    pub entries: Vec<SystemEntry>,
}

impl Decode for System {
    const NAME: &'static str = "system";
    const SHAPE: &'static Shape = &SYSTEM;
    const LISTS: &'static [&'static str] = &["then"];

    fn decode(registry: &Registry, node: Node) -> Result<Self, ConfigError> {
        let raw: Vec<Mapping> = decode(Self::NAME, node)?;
        let entries = raw
            .into_iter()
            .map(|mut e| {
                let then = e.remove("then").unwrap_or_default();
                Ok(SystemEntry {
                    predicate: decode(Self::NAME, Node::Mapping(e))?,
                    then: registry.decode_list(then)?,
                })
            })
            .collect::<Result<_, ConfigError>>()?;
        Ok(Self { entries })
    }
}

impl Directive for System {
    fn run_all(&self, ctx: &Context) -> Result<(), DirectiveError> {
        let matched = self
            .entries
            .iter()
            .find(|e| e.predicate.matches(&ctx.platform, || ctx.can_sudo()));
        match matched {
            Some(entry) => {
                if let Err(e) = run_nested(ctx, &entry.then) {
                    ctx.log.debug(&format!("system: {e}"));
                }
            }
            None => ctx.log.debug("system: no entry matches this host"),
        }
        Ok(())
    }

    fn to_node(&self) -> Result<Node, ConfigError> {
        self.entries
            .iter()
            .map(|e| {
                let mut node = encode(Self::NAME, &e.predicate)?;
                if let Node::Mapping(map) = &mut node {
                    insert_list(map, "then", &e.then)?;
                }
                Ok(node)
            })
            .collect::<Result<Vec<_>, ConfigError>>()
            .map(Node::Sequence)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::directives::test_helpers::{registry, test_context, trail, yaml};
    use crate::logging::RunStatus;

    fn run(ctx: &Context, src: &str) {
        registry().decode_list(yaml(src)).unwrap().run_all(ctx);
    }

    #[test]
    fn if_picks_then_or_else() {
        let (ctx, _log, _dir) = test_context();
        ctx.vars.set("On", "true");
        run(
            &ctx,
            "[{if: [{condition: '{{ .On }}', then: {mark: yes1}, else: {mark: no1}}, \
             {condition: ['{{ .On }}', 'False'], then: {mark: yes2}, else: {mark: no2}}]}]",
        );
        assert_eq!(trail(&ctx), ["yes1", "no2"]);
    }

    #[test]
    fn if_condition_is_case_insensitive() {
        let (ctx, _log, _dir) = test_context();
        run(&ctx, "{if: {condition: '{{ eq OS \"linux\" }}', then: {mark: a}}}");
        run(&ctx, "{if: {condition: 'TRUE', then: {mark: b}}}");
        assert_eq!(trail(&ctx), ["a", "b"]);
    }

    #[test]
    fn if_render_error_fails_only_that_entry() {
        let (ctx, log, _dir) = test_context();
        run(
            &ctx,
            "{if: [{condition: '{{ nope }}', then: {mark: a}}, {condition: 'true', then: {mark: b}}]}",
        );
        assert_eq!(trail(&ctx), ["b"]);
        assert!(log.contains("not defined"));
        assert!(log.statuses().contains(&("if".to_string(), RunStatus::Failed)));
    }

    #[test]
    fn system_runs_first_match_only() {
        let (ctx, _log, _dir) = test_context();
        run(
            &ctx,
            "{system: [{os: windows, then: {mark: win}}, {os: [darwin, linux], arch: amd64, then: {mark: unix}}, {then: {mark: any}}]}",
        );
        assert_eq!(trail(&ctx), ["unix"]);
    }

    #[test]
    fn system_without_match_is_not_a_failure() {
        let (ctx, log, _dir) = test_context();
        run(&ctx, "{system: {os: windows, then: {mark: win}}}");
        assert!(trail(&ctx).is_empty());
        assert_eq!(log.statuses(), [("system".to_string(), RunStatus::Ok)]);
    }

    #[test]
    fn predicate_fields() {
        let platform = Platform::new("linux", "arm64")
            .with_distro("Ubuntu 22.04.3 LTS")
            .with_root(true);
        let p = |src: &str| -> Predicate {
            serde_yaml::from_value(SYSTEM.canonicalize(yaml(src)).unwrap()[0].clone()).unwrap()
        };
        assert!(p("{distro: ubuntu}").matches(&platform, || false));
        assert!(!p("{distro: debian}").matches(&platform, || false));
        assert!(p("{is_root: true, arch: [amd64, arm64]}").matches(&platform, || false));
        assert!(!p("{can_sudo: true}").matches(&platform, || false));
        assert!(p("{}").matches(&platform, || false));
    }

    #[test]
    fn false_flags_match_any_host() {
        let p = |src: &str| -> Predicate {
            serde_yaml::from_value(SYSTEM.canonicalize(yaml(src)).unwrap()[0].clone()).unwrap()
        };
        let root = Platform::new("linux", "amd64").with_root(true);
        let user = Platform::new("linux", "amd64");
        let relaxed = p("{is_root: false, can_sudo: false}");
        assert!(relaxed.matches(&root, || true));
        assert!(relaxed.matches(&user, || false));
        assert!(!p("{is_root: true}").matches(&user, || true));
    }

    #[test]
    fn system_is_root_false_runs_as_root() {
        let (mut ctx, _log, _dir) = test_context();
        ctx.platform = std::sync::Arc::new(Platform::new("linux", "amd64").with_root(true));
        run(&ctx, "{system: [{os: linux, is_root: false, then: {mark: a}}]}");
        assert_eq!(trail(&ctx), ["a"]);
    }

    #[test]
    fn can_sudo_is_only_probed_when_named() {
        let platform = Platform::new("linux", "amd64");
        let probed = std::cell::Cell::new(false);
        let p = Predicate {
            os: vec!["linux".into()],
            ..Predicate::default()
        };
        assert!(p.matches(&platform, || {
            probed.set(true);
            true
        }));
        assert!(!probed.get());
    }

    #[test]
    fn nested_lists_round_trip() {
        let reg = registry();
        let list = reg
            .decode_list(yaml(
                "[{system: {os: linux, then: {mark: a}}}, {if: {condition: 'true', else: {mark: b}}}]",
            ))
            .unwrap();
        assert_eq!(
            list.to_node().unwrap(),
            yaml(
                "[{system: [{os: [linux], then: [{mark: [{value: a, fail: false}]}]}]}, \
                 {if: [{condition: ['true'], else: [{mark: [{value: b, fail: false}]}]}]}]"
            )
        );
    }
}
