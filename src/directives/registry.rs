//! Name-to-decoder table for directives.
use std::collections::BTreeMap;

use super::{Decode, Directive, DirectiveList};
use crate::config::canonical::{Shape, Transform};
use crate::config::{Mapping, Node, key_str, pair};
use crate::error::ConfigError;

/// Canonical form of any directive list: `[{name: body}, ...]`.
pub const ROOT: Shape = Shape {
    name: "config",
    key: None,
    fields: &[],
    list: &[Transform::EnsureList, Transform::MapToSliceMap],
    entry: &[],
    nested: &[],
};

type DecodeFn = fn(&Registry, Node) -> Result<Box<dyn Directive>, ConfigError>;

struct Entry {
    shape: &'static Shape,
    lists: &'static [&'static str],
    decode: DecodeFn,
}

fn decode_boxed<T: Decode>(registry: &Registry, node: Node) -> Result<Box<dyn Directive>, ConfigError> {
    Ok(Box::new(T::decode(registry, node)?))
}

/// Directive types known to a run, keyed by name.
pub struct Registry {
    entries: BTreeMap<&'static str, Entry>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.names())
            .finish()
    }
}

/// Builder for a [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    entries: BTreeMap<&'static str, Entry>,
}

impl std::fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RegistryBuilder {
    /// Register `T` under [`Decode::NAME`], replacing any earlier entry.
    #[must_use]
    pub fn register<T: Decode>(mut self) -> Self {
        self.entries.insert(
            T::NAME,
            Entry {
                shape: T::SHAPE,
                lists: T::LISTS,
                decode: decode_boxed::<T>,
            },
        );
        self
    }

    /// Finish the registry.
    #[must_use]
    pub fn build(self) -> Registry {
        Registry {
            entries: self.entries,
        }
    }
}

impl Registry {
    /// Start an empty registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Start from every built-in directive.
    #[must_use]
    pub fn standard_builder() -> RegistryBuilder {
        use super::{clean, conditional, create, download, extract, git, group, install, link, package, shell, vars};
        Self::builder()
            .register::<clean::Clean>()
            .register::<create::Create>()
            .register::<download::Download>()
            .register::<extract::Extract>()
            .register::<git::Git>()
            .register::<group::Group>()
            .register::<conditional::If>()
            .register::<install::Install>()
            .register::<link::Link>()
            .register::<package::Package>()
            .register::<shell::Shell>()
            .register::<conditional::System>()
            .register::<vars::Vars>()
    }

    /// Every built-in directive.
    #[must_use]
    pub fn standard() -> Self {
        Self::standard_builder().build()
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    /// `true` if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Canonicalize and decode a directive list. Unknown names are warned
    /// about and skipped.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if an element is not a one-key mapping or a
    /// known directive fails to decode.
    pub fn decode_list(&self, node: Node) -> Result<DirectiveList, ConfigError> {
        let mut list = DirectiveList::new();
        for (name, body) in split_root(node)? {
            let Some(entry) = self.entries.get(name.as_str()) else {
                tracing::warn!("skipping unknown directive '{name}'");
                continue;
            };
            let canonical = entry.shape.canonicalize(body)?;
            list.push(name, (entry.decode)(self, canonical)?);
        }
        Ok(list)
    }

    /// Decode a single directive body under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unknown name, or any decode
    /// error of the directive.
    pub fn decode_one(&self, name: &str, body: Node) -> Result<Box<dyn Directive>, ConfigError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown directive '{name}'")))?;
        (entry.decode)(self, entry.shape.canonicalize(body)?)
    }

    /// Rewrite a directive list into canonical form, including every nested
    /// list. Unknown directives are left as they are.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the list or a body cannot be
    /// canonicalized.
    pub fn canonicalize(&self, node: Node) -> Result<Node, ConfigError> {
        split_root(node)?
            .into_iter()
            .map(|(name, body)| {
                let body = match self.entries.get(name.as_str()) {
                    Some(entry) => self.canonicalize_body(entry, body)?,
                    None => body,
                };
                Ok(pair(name, body))
            })
            .collect::<Result<Vec<_>, ConfigError>>()
            .map(Node::Sequence)
    }

    fn canonicalize_body(&self, entry: &Entry, body: Node) -> Result<Node, ConfigError> {
        let mut body = entry.shape.canonicalize(body)?;
        if entry.lists.is_empty() {
            return Ok(body);
        }
        let items: Vec<&mut Node> = match &mut body {
            Node::Sequence(items) => items.iter_mut().collect(),
            single => vec![single],
        };
        for item in items {
            if let Node::Mapping(map) = item {
                for field in entry.lists {
                    if let Some(value) = map.get_mut(*field) {
                        *value = self.canonicalize(std::mem::take(value))?;
                    }
                }
            }
        }
        Ok(body)
    }
}

/// Split a directive list into `(name, body)` pairs in order.
fn split_root(node: Node) -> Result<Vec<(String, Node)>, ConfigError> {
    let Node::Sequence(items) = ROOT.canonicalize(node)? else {
        return Err(ConfigError::Invalid("directive list must be a sequence".into()));
    };
    items
        .into_iter()
        .map(|item| {
            let Node::Mapping(map) = item else {
                return Err(ConfigError::Invalid(format!(
                    "directive must be a one-key mapping, got {item:?}"
                )));
            };
            one_key(map)
        })
        .collect()
}

fn one_key(map: Mapping) -> Result<(String, Node), ConfigError> {
    if map.len() != 1 {
        return Err(ConfigError::Invalid(format!(
            "directive must be a one-key mapping, got {} keys",
            map.len()
        )));
    }
    let Some((key, body)) = map.into_iter().next() else {
        return Err(ConfigError::Invalid("empty directive".into()));
    };
    let name = key_str(&key)
        .ok_or_else(|| ConfigError::Invalid(format!("directive name must be a string, got {key:?}")))?;
    Ok((name, body))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::directives::test_helpers::{Mark, yaml};

    #[test]
    fn standard_names() {
        let reg = Registry::standard();
        assert_eq!(
            reg.names(),
            [
                "clean", "create", "download", "extract", "git", "group", "if", "install",
                "link", "package", "shell", "system", "vars"
            ]
        );
        assert!(!reg.contains("mark"));
    }

    #[test]
    fn custom_directive_can_be_registered() {
        let reg = Registry::builder().register::<Mark>().build();
        let list = reg.decode_list(yaml("[{mark: a}]")).unwrap();
        assert_eq!(list.names(), ["mark"]);
    }

    #[test]
    fn unknown_directives_are_skipped() {
        let reg = Registry::builder().register::<Mark>().build();
        let list = reg
            .decode_list(yaml("[{mark: a}, {bogus: 1}, {mark: b}]"))
            .unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn multi_key_element_is_split_in_order() {
        let reg = Registry::builder().register::<Mark>().build();
        let list = reg.decode_list(yaml("[{mark: a, other: 1}]")).unwrap();
        assert_eq!(list.names(), ["mark"]);
    }

    #[test]
    fn null_is_an_empty_list() {
        let reg = Registry::standard();
        assert!(reg.decode_list(Node::Null).unwrap().is_empty());
    }

    #[test]
    fn scalar_element_is_invalid() {
        let reg = Registry::standard();
        assert!(matches!(
            reg.decode_list(yaml("[link]")),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn canonicalize_recurses_into_nested_lists() {
        let reg = Registry::standard();
        let got = reg
            .canonicalize(yaml("{group: {base: {link: {~/.a: a}}}}"))
            .unwrap();
        assert_eq!(
            got,
            yaml("[{group: [{name: base, config: [{link: [{path: ~/.a, source: a}]}]}]}]")
        );
        assert_eq!(reg.canonicalize(got.clone()).unwrap(), got);
    }

    #[test]
    fn canonicalize_keeps_unknown_bodies() {
        let reg = Registry::standard();
        let got = reg.canonicalize(yaml("{custom: {x: 1}}")).unwrap();
        assert_eq!(got, yaml("[{custom: {x: 1}}]"));
    }

    #[test]
    fn decode_one_rejects_unknown_names() {
        let reg = Registry::standard();
        assert!(reg.decode_one("nope", Node::Null).is_err());
        assert!(reg.decode_one("create", yaml("/tmp/x")).is_ok());
    }
}
