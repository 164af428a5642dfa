//! `!include` and `!include_dir_named` resolution.
//!
//! Includes are expanded before canonicalization so included fragments obey
//! the same shape rules as inline ones.
use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::value::TaggedValue;

use super::node::{Mapping, Node};
use crate::error::ConfigError;

const INCLUDE: &str = "include";
const INCLUDE_DIR_NAMED: &str = "include_dir_named";

/// Replace every include tag in `node`. Relative paths resolve against
/// `base`, the directory of the document being loaded.
///
/// # Errors
///
/// Returns an error if an included file cannot be read or parsed, or if a
/// file (directly or transitively) includes itself.
pub fn resolve(node: Node, base: &Path) -> Result<Node, ConfigError> {
    Resolver { stack: Vec::new() }.resolve(node, base)
}

/// Read and parse `path`, then resolve its includes.
///
/// # Errors
///
/// Same as [`resolve`].
pub fn load_file(path: &Path) -> Result<Node, ConfigError> {
    Resolver { stack: Vec::new() }.load(path)
}

/// Parse YAML (or JSON) text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if `text` is not a valid document.
pub fn parse(text: &str, origin: &str) -> Result<Node, ConfigError> {
    serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
        origin: origin.to_string(),
        source,
    })
}

struct Resolver {
    /// Files currently being expanded, outermost first.
    stack: Vec<PathBuf>,
}

impl Resolver {
    fn resolve(&mut self, node: Node, base: &Path) -> Result<Node, ConfigError> {
        match node {
            Node::Tagged(tagged) => self.resolve_tag(*tagged, base),
            Node::Sequence(items) => items
                .into_iter()
                .map(|item| self.resolve(item, base))
                .collect::<Result<Vec<_>, _>>()
                .map(Node::Sequence),
            Node::Mapping(map) => map
                .into_iter()
                .map(|(k, v)| Ok((k, self.resolve(v, base)?)))
                .collect::<Result<Mapping, ConfigError>>()
                .map(Node::Mapping),
            other => Ok(other),
        }
    }

    fn resolve_tag(&mut self, tagged: TaggedValue, base: &Path) -> Result<Node, ConfigError> {
        let target = || -> Result<PathBuf, ConfigError> {
            let Node::String(raw) = &tagged.value else {
                return Err(ConfigError::Invalid(format!(
                    "{} expects a path, got {:?}",
                    tagged.tag, tagged.value
                )));
            };
            Ok(base.join(raw))
        };
        if tagged.tag == INCLUDE {
            self.load(&target()?)
        } else if tagged.tag == INCLUDE_DIR_NAMED {
            self.load_dir(&target()?)
        } else {
            Ok(Node::Tagged(Box::new(tagged)))
        }
    }

    fn load(&mut self, path: &Path) -> Result<Node, ConfigError> {
        let canonical = dunce::canonicalize(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if self.stack.contains(&canonical) {
            return Err(ConfigError::IncludeCycle {
                path: canonical.display().to_string(),
            });
        }
        let text = fs::read_to_string(&canonical).map_err(|source| ConfigError::Io {
            path: canonical.display().to_string(),
            source,
        })?;
        let node = parse(&text, &canonical.display().to_string())?;
        let dir = canonical
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        self.stack.push(canonical);
        let resolved = self.resolve(node, &dir);
        self.stack.pop();
        resolved
    }

    fn load_dir(&mut self, dir: &Path) -> Result<Node, ConfigError> {
        let mut files = Vec::new();
        collect_files(dir, &mut files)?;
        files.sort();

        let mut out = Mapping::new();
        for file in files {
            let Some(stem) = file.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            let node = self.load(&file)?;
            out.insert(Node::String(stem), node);
        }
        Ok(Node::Mapping(out))
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: dir.display().to_string(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn yaml(src: &str) -> Node {
        serde_yaml::from_str(src).unwrap()
    }

    #[test]
    fn include_replaces_tag_with_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("links.yaml"), "{a: b}").unwrap();
        let node = yaml("config:\n  - link: !include links.yaml\n");
        let got = resolve(node, dir.path()).unwrap();
        assert_eq!(got, yaml("config: [{link: {a: b}}]"));
    }

    #[test]
    fn nested_includes_resolve_relative_to_their_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/outer.yaml"), "inner: !include inner.yaml").unwrap();
        fs::write(dir.path().join("sub/inner.yaml"), "[1, 2]").unwrap();
        let got = resolve(yaml("x: !include sub/outer.yaml"), dir.path()).unwrap();
        assert_eq!(got, yaml("x: {inner: [1, 2]}"));
    }

    #[test]
    fn include_dir_named_keys_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        let groups = dir.path().join("groups");
        fs::create_dir(&groups).unwrap();
        fs::write(groups.join("b.yaml"), "[{shell: echo b}]").unwrap();
        fs::write(groups.join("a.yaml"), "[{shell: echo a}]").unwrap();
        let got = resolve(yaml("group: !include_dir_named groups"), dir.path()).unwrap();
        assert_eq!(
            got,
            yaml("group: {a: [{shell: echo a}], b: [{shell: echo b}]}")
        );
    }

    #[test]
    fn self_include_is_a_cycle() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("loop.yaml"), "x: !include loop.yaml").unwrap();
        let err = load_file(&dir.path().join("loop.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::IncludeCycle { .. }), "{err}");
    }

    #[test]
    fn indirect_cycle_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.yaml"), "b: !include b.yaml").unwrap();
        fs::write(dir.path().join("b.yaml"), "a: !include a.yaml").unwrap();
        let err = load_file(&dir.path().join("a.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::IncludeCycle { .. }), "{err}");
    }

    #[test]
    fn same_file_twice_is_not_a_cycle() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("v.yaml"), "1").unwrap();
        let got = resolve(yaml("[!include v.yaml, !include v.yaml]"), dir.path()).unwrap();
        assert_eq!(got, yaml("[1, 1]"));
    }

    #[test]
    fn missing_include_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve(yaml("x: !include nope.yaml"), dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn unknown_tags_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let node = yaml("x: !custom 1");
        assert_eq!(resolve(node.clone(), dir.path()).unwrap(), node);
    }
}
