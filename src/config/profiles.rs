//! Named profiles and default-profile resolution.
//!
//! A profile names a list of groups. The active group filter comes from the
//! command line when given; otherwise the first `default_profile` entry with
//! no template, or whose template renders `true`, picks the profile.
use serde::{Deserialize, Serialize};

use super::canonical::{FLAT_LIST, Shape, Transform};
use super::node::{Node, decode};
use crate::error::ConfigError;
use crate::template::{self, Environment};

/// Canonical form of the `profiles` key.
pub const PROFILES: Shape = Shape {
    name: "profiles",
    key: Some("name"),
    fields: &["name", "groups"],
    list: &[Transform::MapToSliceMap, Transform::EnsureList],
    entry: &[Transform::MapSplitKeyVal("name", "groups")],
    nested: &[("groups", &FLAT_LIST)],
};

/// Canonical form of the `default_profile` key.
pub const DEFAULT_PROFILE: Shape = Shape {
    name: "default_profile",
    key: Some("profile"),
    fields: &["profile", "template"],
    list: &[Transform::EnsureList, Transform::MapToSliceMap],
    entry: &[
        Transform::ScalarToMap("profile"),
        Transform::MapSplitKeyVal("profile", "template"),
    ],
    nested: &[],
};

/// One named profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Profile name.
    pub name: String,
    /// Groups enabled by this profile.
    #[serde(default)]
    pub groups: Vec<String>,
}

/// One candidate of `default_profile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultProfile {
    /// Profile to select.
    pub profile: String,
    /// Predicate; `None` always matches.
    #[serde(default)]
    pub template: Option<String>,
}

/// The active group filter and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Profile that produced the filter, `None` for a command-line filter.
    pub profile: Option<String>,
    /// Group names, in the order they should run.
    pub groups: Vec<String>,
}

/// Decode the `profiles` key.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the node cannot be canonicalized or decoded.
pub fn decode_profiles(node: Node) -> Result<Vec<Profile>, ConfigError> {
    decode("profiles", PROFILES.canonicalize(node)?)
}

/// Decode the `default_profile` key.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the node cannot be canonicalized or decoded.
pub fn decode_default_profile(node: Node) -> Result<Vec<DefaultProfile>, ConfigError> {
    decode("default_profile", DEFAULT_PROFILE.canonicalize(node)?)
}

/// Pick the first default-profile candidate whose predicate holds.
///
/// # Errors
///
/// Returns [`ConfigError::Template`] if a predicate fails to render.
pub fn default_profile(
    candidates: &[DefaultProfile],
    env: &dyn Environment,
) -> Result<Option<String>, ConfigError> {
    for candidate in candidates {
        let chosen = match candidate.template.as_deref() {
            None | Some("") => true,
            Some(src) => template::render_true(env, src)?,
        };
        if chosen {
            return Ok(Some(candidate.profile.clone()));
        }
    }
    Ok(None)
}

/// Resolve the active group filter.
///
/// `cli_groups` always wins when non-empty. Returns `None` when neither the
/// command line nor `default_profile` selects anything, meaning every group
/// runs.
///
/// # Errors
///
/// Returns [`ConfigError::UnknownProfile`] if the chosen profile is not
/// defined, or [`ConfigError::Template`] if a predicate fails to render.
pub fn resolve(
    cli_groups: &[String],
    profiles: &[Profile],
    candidates: &[DefaultProfile],
    env: &dyn Environment,
) -> Result<Option<Selection>, ConfigError> {
    if !cli_groups.is_empty() {
        return Ok(Some(Selection {
            profile: None,
            groups: cli_groups.to_vec(),
        }));
    }
    let Some(name) = default_profile(candidates, env)? else {
        return Ok(None);
    };
    let profile = profiles
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| ConfigError::UnknownProfile(name.clone()))?;
    Ok(Some(Selection {
        profile: Some(name),
        groups: profile.groups.clone(),
    }))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::platform::Platform;

    struct Env(Platform);

    impl Environment for Env {
        fn lookup(&self, _name: &str) -> Option<Node> {
            None
        }
        fn platform(&self) -> &Platform {
            &self.0
        }
        fn can_sudo(&self) -> bool {
            false
        }
    }

    fn yaml(src: &str) -> Node {
        serde_yaml::from_str(src).unwrap()
    }

    fn linux() -> Env {
        Env(Platform::new("linux", "amd64"))
    }

    #[test]
    fn profiles_shorthand_forms_decode_alike() {
        let short = decode_profiles(yaml("{desktop: [base, gui], server: base}")).unwrap();
        let long = decode_profiles(yaml(
            "[{name: desktop, groups: [base, gui]}, {name: server, groups: [base]}]",
        ))
        .unwrap();
        assert_eq!(short, long);
        assert_eq!(short[1].groups, ["base"]);
    }

    #[test]
    fn profiles_may_be_named_after_fields() {
        let p = decode_profiles(yaml("{name: [a], groups: [b, c]}")).unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p[0].name, "name");
        assert_eq!(p[0].groups, ["a"]);
        assert_eq!(p[1].name, "groups");
        assert_eq!(p[1].groups, ["b", "c"]);
        let d = decode_default_profile(yaml("{template: '{{ IsRoot }}'}")).unwrap();
        assert_eq!(d[0].profile, "template");
    }

    #[test]
    fn nested_group_lists_are_flattened() {
        let p = decode_profiles(yaml("{all: [[a, b], c]}")).unwrap();
        assert_eq!(p[0].groups, ["a", "b", "c"]);
    }

    #[test]
    fn default_profile_forms() {
        let scalar = decode_default_profile(yaml("desktop")).unwrap();
        assert_eq!(
            scalar,
            [DefaultProfile {
                profile: "desktop".into(),
                template: None
            }]
        );
        let map = decode_default_profile(yaml("{server: '{{ IsRoot }}', desktop: ~}")).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[0].template.as_deref(), Some("{{ IsRoot }}"));
        assert_eq!(map[1].template, None);
    }

    #[test]
    fn first_true_template_wins() {
        let candidates = decode_default_profile(yaml(
            "- server: '{{ IsRoot }}'\n- desktop: '{{ eq OS \"linux\" }}'\n- fallback",
        ))
        .unwrap();
        assert_eq!(
            default_profile(&candidates, &linux()).unwrap(),
            Some("desktop".to_string())
        );
    }

    #[test]
    fn cli_groups_override_profile() {
        let profiles = decode_profiles(yaml("{desktop: [base, gui]}")).unwrap();
        let candidates = decode_default_profile(yaml("desktop")).unwrap();
        let cli = vec!["tools".to_string()];
        let selection = resolve(&cli, &profiles, &candidates, &linux()).unwrap().unwrap();
        assert_eq!(selection.profile, None);
        assert_eq!(selection.groups, ["tools"]);
    }

    #[test]
    fn default_profile_groups_become_filter() {
        let profiles = decode_profiles(yaml("{desktop: [base, gui]}")).unwrap();
        let candidates = decode_default_profile(yaml("desktop")).unwrap();
        let selection = resolve(&[], &profiles, &candidates, &linux()).unwrap().unwrap();
        assert_eq!(selection.profile.as_deref(), Some("desktop"));
        assert_eq!(selection.groups, ["base", "gui"]);
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let candidates = decode_default_profile(yaml("missing")).unwrap();
        let err = resolve(&[], &[], &candidates, &linux()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProfile(name) if name == "missing"));
    }

    #[test]
    fn no_candidates_means_no_filter() {
        assert_eq!(resolve(&[], &[], &[], &linux()).unwrap(), None);
    }
}
