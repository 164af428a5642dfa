//! Process-wide template variables with scoped overrides.
use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::config::{Mapping, Node};

/// Template variable store.
///
/// Values set by directives persist for the rest of the run. A
/// [`scope`](Self::scope) overrides keys for the lifetime of the returned
/// guard and restores the previous values (or absence) when the guard drops,
/// whether the covered code returns normally, returns an error, or unwinds.
#[derive(Debug, Default)]
pub struct TemplateVars {
    inner: RefCell<Stack>,
}

#[derive(Debug, Default)]
struct Stack {
    values: BTreeMap<String, Node>,
    /// One diff per open scope: the value each overridden key had before.
    frames: Vec<Vec<(String, Option<Node>)>>,
}

/// Guard returned by [`TemplateVars::scope`]; restores on drop.
#[derive(Debug)]
#[must_use = "the override is reverted as soon as the guard is dropped"]
pub struct VarsScope<'a> {
    vars: &'a TemplateVars,
}

impl Drop for VarsScope<'_> {
    fn drop(&mut self) {
        self.vars.pop();
    }
}

impl TemplateVars {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of the value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Node> {
        self.inner.borrow().values.get(key).cloned()
    }

    /// Set `key` to `value`.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Node>) {
        self.inner.borrow_mut().values.insert(key.into(), value.into());
    }

    /// Set every string-keyed pair of `map`.
    pub fn extend(&self, map: &Mapping) {
        let mut inner = self.inner.borrow_mut();
        for (k, v) in map {
            if let Some(key) = crate::config::key_str(k) {
                inner.values.insert(key, v.clone());
            }
        }
    }

    /// Copy every variable into a mapping, sorted by key.
    #[must_use]
    pub fn snapshot(&self) -> Mapping {
        self.inner
            .borrow()
            .values
            .iter()
            .map(|(k, v)| (Node::String(k.clone()), v.clone()))
            .collect()
    }

    /// Override `overrides` until the returned guard is dropped.
    pub fn scope<K, V>(&self, overrides: impl IntoIterator<Item = (K, V)>) -> VarsScope<'_>
    where
        K: Into<String>,
        V: Into<Node>,
    {
        let mut inner = self.inner.borrow_mut();
        let mut frame = Vec::new();
        for (key, value) in overrides {
            let key = key.into();
            let previous = inner.values.insert(key.clone(), value.into());
            frame.push((key, previous));
        }
        inner.frames.push(frame);
        VarsScope { vars: self }
    }

    /// Number of open scopes.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.inner.borrow().frames.len()
    }

    fn pop(&self) {
        let mut inner = self.inner.borrow_mut();
        let Some(frame) = inner.frames.pop() else {
            return;
        };
        // Undo in reverse so a key overridden twice in one frame ends at its oldest value.
        for (key, previous) in frame.into_iter().rev() {
            match previous {
                Some(value) => inner.values.insert(key, value),
                None => inner.values.remove(&key),
            };
        }
    }
}
