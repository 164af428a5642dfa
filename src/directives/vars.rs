//! `vars`: set template variables for the rest of the run.
use serde::{Deserialize, Serialize};

use super::{Context, Decode, Directive, Registry, summarize};
use crate::config::canonical::{Shape, Transform};
use crate::config::{Mapping, Node, decode, encode, key_str};
use crate::error::{ConfigError, DirectiveError};

/// Canonical form of `vars`: `[{Key: value}, ...]` in document order.
pub const VARS: Shape = Shape {
    name: "vars",
    key: None,
    fields: &[],
    list: &[Transform::MapToSliceMap, Transform::EnsureList],
    entry: &[],
    nested: &[],
};

/// The `vars` directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vars {
    /// One-key mappings in document order.
    pub entries: Vec<Mapping>,
}

impl Decode for Vars {
    const NAME: &'static str = "vars";
    const SHAPE: &'static Shape = &VARS;

    fn decode(_: &Registry, node: Node) -> Result<Self, ConfigError> {
        decode(Self::NAME, node)
    }
}

impl Directive for Vars {
    /// String values are rendered first, so later keys can refer to earlier
    /// ones.
    fn run_all(&self, ctx: &Context) -> Result<(), DirectiveError> {
        for (key, value) in self.entries.iter().flat_map(|m| m.iter()) {
            let Some(key) = key_str(key) else {
                continue;
            };
            let value = match value {
                Node::String(s) => Node::String(ctx.render(s)?),
                other => other.clone(),
            };
            ctx.log.debug(&format!("set {key}"));
            ctx.vars.set(key, value);
        }
        Ok(())
    }

    fn describe(&self) -> Option<String> {
        let keys: Vec<String> = self
            .entries
            .iter()
            .flat_map(|m| m.keys().filter_map(key_str))
            .collect();
        summarize(keys.iter().map(String::as_str))
    }

    fn to_node(&self) -> Result<Node, ConfigError> {
        encode(Self::NAME, self)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::directives::test_helpers::{test_context, yaml};

    fn decode_vars(src: &str) -> Vars {
        Vars::decode(&Registry::standard(), VARS.canonicalize(yaml(src)).unwrap()).unwrap()
    }

    #[test]
    fn mapping_becomes_ordered_pairs() {
        let v = decode_vars("{B: 1, A: two}");
        assert_eq!(v.to_node().unwrap(), yaml("[{B: 1}, {A: two}]"));
        assert_eq!(v.describe().as_deref(), Some("B, A"));
    }

    #[test]
    fn later_keys_see_earlier_ones() {
        let (ctx, _log, _dir) = test_context();
        decode_vars("{Name: bat, Asset: '{{ .Name }}-linux', Count: 3, Flags: [a, b]}")
            .run_all(&ctx)
            .unwrap();
        assert_eq!(ctx.vars.get("Asset"), Some("bat-linux".into()));
        assert_eq!(ctx.vars.get("Count"), Some(yaml("3")));
        assert_eq!(ctx.vars.get("Flags"), Some(yaml("[a, b]")));
    }

    #[test]
    fn render_error_fails_the_directive() {
        let (ctx, _log, _dir) = test_context();
        let err = decode_vars("{X: '{{ nope }}'}").run_all(&ctx).unwrap_err();
        assert!(matches!(err, DirectiveError::Template(_)));
        assert_eq!(ctx.vars.get("X"), None);
    }
}
