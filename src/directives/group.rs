//! `group`: named directive lists that can be selected with `--group` or a
//! profile.
use std::collections::HashSet;

use serde::Deserialize;

use super::{Context, Decode, Directive, DirectiveList, Registry, summarize};
use crate::config::canonical::{Shape, Transform};
use crate::config::{Mapping, Node, decode};
use crate::error::{ConfigError, DirectiveError};

/// Canonical form of `group`: `{base: [...], desktop: [...]}` or
/// `[{name: base, config: [...]}]`.
pub const GROUP: Shape = Shape {
    name: "group",
    key: Some("name"),
    fields: &["name", "config"],
    list: &[Transform::MapToSliceMap, Transform::EnsureList],
    entry: &[Transform::MapSplitKeyVal("name", "config")],
    nested: &[],
};

#[derive(Deserialize)]
struct RawGroup {
    name: String,
    #[serde(default)]
    config: Node,
}

/// One named group.
#[derive(Debug)]
pub struct GroupEntry {
    /// Name matched against the group filter.
    pub name: String,
    /// Directives of the group.
    pub config: DirectiveList,
}

/// The `group` directive.
#[derive(Debug)]
pub struct Group {
    /// Groups in document order.
    pub entries: Vec<GroupEntry>,
}

impl Decode for Group {
    const NAME: &'static str = "group";
    const SHAPE: &'static Shape = &GROUP;
    const LISTS: &'static [&'static str] = &["config"];

    fn decode(registry: &Registry, node: Node) -> Result<Self, ConfigError> {
        let raw: Vec<RawGroup> = decode(Self::NAME, node)?;
        let entries = raw
            .into_iter()
            .map(|g| {
                Ok(GroupEntry {
                    config: registry.decode_list(g.config)?,
                    name: g.name,
                })
            })
            .collect::<Result<_, ConfigError>>()?;
        Ok(Self { entries })
    }
}

impl Group {
    /// Groups to run: those named by the filter in filter order, or all of
    /// them in document order. A name repeated in the filter runs once.
    fn selected<'a>(&'a self, filter: Option<&'a [String]>) -> Vec<&'a GroupEntry> {
        match filter {
            Some(names) => {
                let mut seen = HashSet::new();
                names
                    .iter()
                    .filter(|name| seen.insert(name.as_str()))
                    .flat_map(|name| self.entries.iter().filter(move |g| &g.name == name))
                    .collect()
            }
            None => self.entries.iter().collect(),
        }
    }
}

impl Directive for Group {
    fn run_all(&self, ctx: &Context) -> Result<(), DirectiveError> {
        let selected = self.selected(ctx.groups.as_deref());
        if selected.is_empty() {
            ctx.log.debug("group: no selected groups here");
        }
        for group in selected {
            ctx.log.stage(&group.name);
            group.config.run_all(ctx);
        }
        Ok(())
    }

    fn describe(&self) -> Option<String> {
        summarize(self.entries.iter().map(|g| g.name.as_str()))
    }

    fn to_node(&self) -> Result<Node, ConfigError> {
        self.entries
            .iter()
            .map(|g| {
                let mut map = Mapping::new();
                map.insert("name".into(), g.name.clone().into());
                map.insert("config".into(), g.config.to_node()?);
                Ok(Node::Mapping(map))
            })
            .collect::<Result<Vec<_>, ConfigError>>()
            .map(Node::Sequence)
    }
}
