//! Helpers over the generic document tree.
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ConfigError;

/// A loaded document tree. Mappings keep their insertion order.
pub type Node = serde_yaml::Value;

pub use serde_yaml::Mapping;

/// `true` for booleans, numbers and strings.
#[must_use]
pub const fn is_scalar(node: &Node) -> bool {
    matches!(node, Node::Bool(_) | Node::Number(_) | Node::String(_))
}

/// Return the key of a mapping pair as a string, if it is a scalar.
#[must_use]
pub fn key_str(key: &Node) -> Option<String> {
    match key {
        Node::String(s) => Some(s.clone()),
        Node::Bool(b) => Some(b.to_string()),
        Node::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Return the only pair of a one-entry mapping.
#[must_use]
pub fn single_pair(map: &Mapping) -> Option<(&Node, &Node)> {
    if map.len() == 1 { map.iter().next() } else { None }
}

/// Build a one-entry mapping `{key: value}`.
#[must_use]
pub fn pair(key: impl Into<Node>, value: Node) -> Node {
    let mut map = Mapping::new();
    map.insert(key.into(), value);
    Node::Mapping(map)
}

/// Decode a canonical node into `T`, tagging errors with `what`.
///
/// # Errors
///
/// Returns [`ConfigError::Decode`] if the node does not match `T`.
pub fn decode<T: DeserializeOwned>(what: &str, node: Node) -> Result<T, ConfigError> {
    serde_yaml::from_value(node).map_err(|e| ConfigError::decode(what, e))
}

/// Serialize `value` back into a node.
///
/// # Errors
///
/// Returns [`ConfigError::Decode`] if `value` cannot be represented.
pub fn encode<T: Serialize>(what: &str, value: &T) -> Result<Node, ConfigError> {
    serde_yaml::to_value(value).map_err(|e| ConfigError::decode(what, e))
}

/// Render a scalar node as text; containers and null yield `None`.
#[must_use]
pub fn scalar_text(node: &Node) -> Option<String> {
    key_str(node)
}
