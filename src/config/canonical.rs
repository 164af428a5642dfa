//! Declarative rewrite rules that bring author-facing shapes into the single
//! canonical form each decoder expects.
//!
//! A [`Shape`] lists the canonical field names of an entry together with the
//! [`Transform`]s applied at list level and at entry level. Each group of
//! transforms is applied repeatedly until the node stops changing.
//!
//! A mapping is already canonical when every key is one of the shape's field
//! names and the shape's key field, if it has one, holds a scalar. Anything
//! else is shorthand and gets split or folded, so a group named `config` or
//! a profile named `name` is still read as shorthand. Canonical mappings are
//! never rewritten, which is what makes
//! `canonicalize(canonicalize(n)) == canonicalize(n)` hold.
use super::node::{Mapping, Node, is_scalar, pair, single_pair};
use crate::error::ConfigError;

/// Upper bound on rewrite passes before a shape is reported as diverging.
const MAX_PASSES: usize = 16;

/// One structural rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// `s` becomes `{key: s}`.
    ScalarToMap(&'static str),
    /// Shorthand `{k: v}` becomes `{key: k, val: v}`.
    MapSplitKeyVal(&'static str, &'static str),
    /// Shorthand `{k: {..}}` (or `{k: null}`) becomes `{field: k, ..}`.
    MapKeyIntoValueMap(&'static str),
    /// Null becomes `[]`, any other non-sequence `x` becomes `[x]`.
    EnsureList,
    /// Null becomes `{}`.
    EnsureMap,
    /// Null mapping values become `{}`; a scalar `s` becomes `{s: {}}`.
    EnsureMapMap,
    /// Nested sequences are flattened into one sequence.
    EnsureFlatList,
    /// Every mapping value becomes a flat sequence.
    EnsureListValues,
    /// An N-key mapping becomes N one-key mappings in key order. Inside a
    /// sequence, multi-key elements are split in place.
    MapToSliceMap,
}

/// Canonical form of one directive type (or of a nested field).
#[derive(Debug)]
pub struct Shape {
    /// Name used in error messages.
    pub name: &'static str,
    /// Field that identifies a canonical entry and must hold a scalar.
    pub key: Option<&'static str>,
    /// Field names of a canonical entry.
    pub fields: &'static [&'static str],
    /// Transforms applied to the whole node.
    pub list: &'static [Transform],
    /// Transforms applied to every entry.
    pub entry: &'static [Transform],
    /// Shapes for individual fields of a canonical entry.
    pub nested: &'static [(&'static str, &'static Shape)],
}

/// A flat list of scalars, e.g. `os: [linux, darwin]` or `os: linux`.
pub const FLAT_LIST: Shape = Shape {
    name: "list",
    key: None,
    fields: &[],
    list: &[Transform::EnsureList, Transform::EnsureFlatList],
    entry: &[],
    nested: &[],
};

fn shorthand<'a>(map: &'a Mapping, shape: &Shape) -> Option<(&'a Node, &'a Node)> {
    if shape.is_canonical(map) {
        None
    } else {
        single_pair(map)
    }
}

fn flatten_into(items: Vec<Node>, out: &mut Vec<Node>) {
    for item in items {
        match item {
            Node::Sequence(inner) => flatten_into(inner, out),
            other => out.push(other),
        }
    }
}

fn flat(node: Node) -> Vec<Node> {
    let mut out = Vec::new();
    match node {
        Node::Null => {}
        Node::Sequence(items) => flatten_into(items, &mut out),
        other => out.push(other),
    }
    out
}

fn split_pairs(map: Mapping) -> impl Iterator<Item = Node> {
    map.into_iter().map(|(k, v)| pair(k, v))
}

impl Transform {
    /// Apply this transform once.
    #[must_use]
    pub fn apply(self, node: Node, shape: &Shape) -> Node {
        match self {
            Self::ScalarToMap(key) => {
                if is_scalar(&node) {
                    pair(key, node)
                } else {
                    node
                }
            }
            Self::MapSplitKeyVal(key_field, value_field) => {
                let split = if let Node::Mapping(map) = &node
                    && let Some((k, v)) = shorthand(map, shape)
                {
                    let mut out = Mapping::new();
                    out.insert(key_field.into(), k.clone());
                    out.insert(value_field.into(), v.clone());
                    Some(Node::Mapping(out))
                } else {
                    None
                };
                split.unwrap_or(node)
            }
            Self::MapKeyIntoValueMap(field) => {
                let folded = if let Node::Mapping(map) = &node
                    && let Some((k, v)) = shorthand(map, shape)
                    && matches!(v, Node::Mapping(_) | Node::Null)
                {
                    let mut out = Mapping::new();
                    out.insert(field.into(), k.clone());
                    if let Node::Mapping(inner) = v {
                        for (ik, iv) in inner {
                            out.insert(ik.clone(), iv.clone());
                        }
                    }
                    Some(Node::Mapping(out))
                } else {
                    None
                };
                folded.unwrap_or(node)
            }
            Self::EnsureList => match node {
                Node::Null => Node::Sequence(Vec::new()),
                Node::Sequence(_) => node,
                other => Node::Sequence(vec![other]),
            },
            Self::EnsureMap => match node {
                Node::Null => Node::Mapping(Mapping::new()),
                other => other,
            },
            Self::EnsureMapMap => match node {
                Node::Mapping(map) => Node::Mapping(
                    map.into_iter()
                        .map(|(k, v)| match v {
                            Node::Null => (k, Node::Mapping(Mapping::new())),
                            other => (k, other),
                        })
                        .collect(),
                ),
                scalar if is_scalar(&scalar) => pair(scalar, Node::Mapping(Mapping::new())),
                other => other,
            },
            Self::EnsureFlatList => match node {
                Node::Sequence(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    flatten_into(items, &mut out);
                    Node::Sequence(out)
                }
                other => other,
            },
            Self::EnsureListValues => match node {
                Node::Mapping(map) => Node::Mapping(
                    map.into_iter()
                        .map(|(k, v)| (k, Node::Sequence(flat(v))))
                        .collect(),
                ),
                other => other,
            },
            Self::MapToSliceMap => match node {
                Node::Mapping(map) if !shape.is_canonical(&map) => {
                    Node::Sequence(split_pairs(map).collect())
                }
                Node::Sequence(items) => Node::Sequence(
                    items
                        .into_iter()
                        .flat_map(|item| match item {
                            Node::Mapping(map) if map.len() > 1 && !shape.is_canonical(&map) => {
                                split_pairs(map).collect::<Vec<_>>()
                            }
                            other => vec![other],
                        })
                        .collect(),
                ),
                other => other,
            },
        }
    }
}

impl Shape {
    /// `true` if `map` is a canonical entry of this shape rather than
    /// shorthand.
    #[must_use]
    pub fn is_canonical(&self, map: &Mapping) -> bool {
        !map.is_empty()
            && map
                .keys()
                .all(|k| matches!(k, Node::String(s) if self.fields.contains(&s.as_str())))
            && self
                .key
                .is_none_or(|key| map.get(key).is_some_and(is_scalar))
    }

    /// Rewrite `node` into this shape's canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotConverging`] if a transform group keeps
    /// changing the node.
    pub fn canonicalize(&self, node: Node) -> Result<Node, ConfigError> {
        match self.settle(node, self.list)? {
            Node::Sequence(items) => items
                .into_iter()
                .map(|item| self.canonicalize_entry(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Node::Sequence),
            other => self.canonicalize_entry(other),
        }
    }

    fn canonicalize_entry(&self, node: Node) -> Result<Node, ConfigError> {
        let mut entry = self.settle(node, self.entry)?;
        if let Node::Mapping(map) = &mut entry {
            for (field, shape) in self.nested {
                if let Some(value) = map.get_mut(*field) {
                    *value = shape.canonicalize(std::mem::take(value))?;
                }
            }
        }
        Ok(entry)
    }

    fn settle(&self, node: Node, transforms: &[Transform]) -> Result<Node, ConfigError> {
        let mut current = node;
        for _ in 0..MAX_PASSES {
            let next = transforms
                .iter()
                .fold(current.clone(), |n, t| t.apply(n, self));
            if next == current {
                return Ok(current);
            }
            current = next;
        }
        Err(ConfigError::NotConverging {
            shape: self.name,
            passes: MAX_PASSES,
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn yaml(src: &str) -> Node {
        serde_yaml::from_str(src).unwrap()
    }

    const PAIR: Shape = Shape {
        name: "pair",
        key: Some("path"),
        fields: &["path", "source", "force"],
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

    const ANY: Shape = Shape {
        name: "any",
        key: None,
        fields: &[],
        list: &[],
        entry: &[],
        nested: &[],
    };

    #[test]
    fn scalar_to_map_wraps_scalars_only() {
        let t = Transform::ScalarToMap("path");
        assert_eq!(t.apply(yaml("a"), &ANY), yaml("{path: a}"));
        assert_eq!(t.apply(yaml("{x: y}"), &ANY), yaml("{x: y}"));
    }

    #[test]
    fn split_leaves_named_maps_alone() {
        let t = Transform::MapSplitKeyVal("path", "source");
        assert_eq!(t.apply(yaml("{a: b}"), &PAIR), yaml("{path: a, source: b}"));
        assert_eq!(t.apply(yaml("{path: a}"), &PAIR), yaml("{path: a}"));
        assert_eq!(t.apply(yaml("{a: b, c: d}"), &PAIR), yaml("{a: b, c: d}"));
    }

    #[test]
    fn fold_moves_key_into_value_map() {
        let t = Transform::MapKeyIntoValueMap("path");
        assert_eq!(
            t.apply(yaml("{a: {source: b}}"), &PAIR),
            yaml("{path: a, source: b}")
        );
        assert_eq!(t.apply(yaml("{a: ~}"), &PAIR), yaml("{path: a}"));
        assert_eq!(t.apply(yaml("{a: b}"), &PAIR), yaml("{a: b}"));
    }

    #[test]
    fn ensure_list_and_map() {
        assert_eq!(Transform::EnsureList.apply(yaml("~"), &ANY), yaml("[]"));
        assert_eq!(Transform::EnsureList.apply(yaml("a"), &ANY), yaml("[a]"));
        assert_eq!(Transform::EnsureList.apply(yaml("[a]"), &ANY), yaml("[a]"));
        assert_eq!(Transform::EnsureMap.apply(yaml("~"), &ANY), yaml("{}"));
    }

    #[test]
    fn ensure_map_map_fills_null_values() {
        let t = Transform::EnsureMapMap;
        assert_eq!(t.apply(yaml("{a: ~, b: {x: 1}}"), &ANY), yaml("{a: {}, b: {x: 1}}"));
        assert_eq!(t.apply(yaml("a"), &ANY), yaml("{a: {}}"));
    }

    #[test]
    fn flat_list_flattens_recursively() {
        let t = Transform::EnsureFlatList;
        assert_eq!(t.apply(yaml("[a, [b, [c, d]], e]"), &ANY), yaml("[a, b, c, d, e]"));
    }

    #[test]
    fn list_values_become_flat_lists() {
        let t = Transform::EnsureListValues;
        assert_eq!(
            t.apply(yaml("{apt: git, brew: [git, [jq]], pkg: ~}"), &ANY),
            yaml("{apt: [git], brew: [git, jq], pkg: []}")
        );
    }

    #[test]
    fn map_to_slice_map_preserves_key_order() {
        let t = Transform::MapToSliceMap;
        assert_eq!(
            t.apply(yaml("{k1: 1, k2: 2, k3: 3}"), &ANY),
            yaml("[{k1: 1}, {k2: 2}, {k3: 3}]")
        );
        assert_eq!(
            t.apply(yaml("[{a: 1, b: 2}, {c: 3}]"), &ANY),
            yaml("[{a: 1}, {b: 2}, {c: 3}]")
        );
    }

    #[test]
    fn map_to_slice_map_keeps_named_maps_whole() {
        let t = Transform::MapToSliceMap;
        assert_eq!(
            t.apply(yaml("{path: a, source: b}"), &PAIR),
            yaml("{path: a, source: b}")
        );
    }

    #[test]
    fn field_names_as_shorthand_keys_are_split() {
        let t = Transform::MapSplitKeyVal("path", "source");
        assert_eq!(
            t.apply(yaml("{source: [x]}"), &PAIR),
            yaml("{path: source, source: [x]}")
        );
        assert_eq!(
            t.apply(yaml("{path: {force: true}}"), &PAIR),
            yaml("{path: path, source: {force: true}}")
        );
        assert_eq!(
            Transform::MapToSliceMap.apply(yaml("{path: a, other: b}"), &PAIR),
            yaml("[{path: a}, {other: b}]")
        );
    }

    #[test]
    fn canonical_needs_known_fields_and_a_scalar_key() {
        let map = |src: &str| yaml(src).as_mapping().unwrap().clone();
        assert!(PAIR.is_canonical(&map("{path: a, source: b}")));
        assert!(!PAIR.is_canonical(&map("{source: b}")));
        assert!(!PAIR.is_canonical(&map("{path: [a]}")));
        assert!(!PAIR.is_canonical(&map("{path: a, extra: b}")));
        assert!(!PAIR.is_canonical(&map("{}")));
        assert!(!ANY.is_canonical(&map("{a: b}")));
    }

    #[test]
    fn equivalent_shapes_agree() {
        for src in [
            "{a: b}",
            "[{a: b}]",
            "{path: a, source: b}",
            "[{path: a, source: b}]",
            "{a: {source: b}}",
            "[[{a: b}]]",
        ] {
            let got = PAIR.canonicalize(yaml(src)).unwrap();
            let items = got.as_sequence().unwrap();
            assert_eq!(items.len(), 1, "{src}");
            let map = items[0].as_mapping().unwrap();
            assert_eq!(map.get("path"), Some(&yaml("a")), "{src}");
            assert_eq!(map.get("source"), Some(&yaml("b")), "{src}");
            assert_eq!(
                PAIR.canonicalize(got.clone()).unwrap(),
                got,
                "not idempotent for {src}"
            );
        }
    }

    #[test]
    fn multi_key_map_becomes_ordered_entries() {
        let got = PAIR.canonicalize(yaml("{x: 1, y: 2, z: 3}")).unwrap();
        assert_eq!(
            got,
            yaml("[{path: x, source: 1}, {path: y, source: 2}, {path: z, source: 3}]")
        );
    }

    #[test]
    fn nested_field_shapes_are_applied() {
        const OUTER: Shape = Shape {
            name: "outer",
            key: None,
            fields: &["name", "os"],
            list: &[Transform::EnsureList],
            entry: &[],
            nested: &[("os", &FLAT_LIST)],
        };
        let got = OUTER.canonicalize(yaml("{name: a, os: linux}")).unwrap();
        assert_eq!(got, yaml("[{name: a, os: [linux]}]"));
        assert_eq!(OUTER.canonicalize(got.clone()).unwrap(), got);
    }

    #[test]
    fn null_becomes_empty_list() {
        assert_eq!(PAIR.canonicalize(Node::Null).unwrap(), yaml("[]"));
    }
}
