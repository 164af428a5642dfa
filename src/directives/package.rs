//! `package`: install system packages with the first available manager.
//!
//! Each entry maps package managers to package lists, tried in order; the
//! first manager found on `PATH` installs its list and the rest are
//! ignored. The `os` manager stands for whichever of `brew`, `apt` and `apk`
//! is present.
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use super::{Context, Decode, Directive, Registry, run_entries, summarize};
use crate::config::canonical::{Shape, Transform};
use crate::config::{Mapping, Node, decode, encode, key_str, scalar_text};
use crate::error::{ConfigError, DirectiveError};
use crate::exec::{Attach, Invocation};

/// Canonical form of `package`: `jq`, `[jq, {apt: fd-find, brew: fd}]`.
pub const PACKAGE: Shape = Shape {
    name: "package",
    key: None,
    fields: &[],
    list: &[Transform::EnsureList],
    entry: &[Transform::ScalarToMap("os"), Transform::EnsureListValues],
    nested: &[],
};

/// Meta manager resolved to the host's manager.
const OS_MANAGER: &str = "os";

/// Supported package managers, in `os` lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Manager {
    /// Homebrew. Checked first since macOS ships an unrelated `apt`.
    Brew,
    /// Debian and derivatives.
    Apt,
    /// Alpine.
    Apk,
}

impl Manager {
    const ALL: [Self; 3] = [Self::Brew, Self::Apt, Self::Apk];

    /// Manager for a configuration key.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "brew" => Some(Self::Brew),
            "apt" | "apt-get" => Some(Self::Apt),
            "apk" => Some(Self::Apk),
            _ => None,
        }
    }

    /// Executable checked on `PATH`.
    #[must_use]
    pub const fn program(self) -> &'static str {
        match self {
            Self::Brew => "brew",
            Self::Apt => "apt",
            Self::Apk => "apk",
        }
    }

    fn query(self, package: &str) -> Invocation {
        match self {
            Self::Brew => Invocation::new("brew", ["info", "--json=v2", package]),
            Self::Apt => Invocation::new("apt-cache", ["policy", package]),
            Self::Apk => Invocation::new("apk", ["policy", package]),
        }
    }

    fn parse(self, package: &str, output: &str) -> Versions {
        match self {
            Self::Brew => parse_brew_info(package, output),
            Self::Apt => parse_apt_policy(output),
            Self::Apk => parse_apk_policy(output),
        }
    }

    fn install(self, package: &str, is_root: bool) -> Invocation {
        match self {
            Self::Brew => Invocation::new("brew", ["install", "-q", package]),
            Self::Apt => {
                Invocation::new("apt-get", ["install", "-qq", "-y", package]).sudo_if(!is_root)
            }
            Self::Apk => Invocation::new("apk", ["add", package]).sudo_if(!is_root),
        }
    }

    const fn attach(self) -> Attach {
        Attach {
            stdin: !matches!(self, Self::Brew),
            stdout: !matches!(self, Self::Apt),
            stderr: true,
        }
    }
}

/// Installed and candidate versions of one package; empty when unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Versions {
    /// Currently installed version.
    pub installed: String,
    /// Version the manager would install.
    pub latest: String,
}

/// Packages for one manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerPackages {
    /// Manager key as written (`os`, `apt`, ...).
    pub manager: String,
    /// Package names.
    pub packages: Vec<String>,
}

/// One entry: managers in preference order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Mapping", into = "Mapping")]
pub struct PackageEntry {
    /// Alternatives, first available wins.
    pub managers: Vec<ManagerPackages>,
}

impl TryFrom<Mapping> for PackageEntry {
    type Error = String;

    fn try_from(map: Mapping) -> Result<Self, Self::Error> {
        let managers = map
            .iter()
            .map(|(k, v)| -> Result<ManagerPackages, String> {
                let manager = key_str(k).ok_or("package manager must be a string")?;
                let packages = match v {
                    Node::Sequence(items) => items
                        .iter()
                        .map(|item| {
                            scalar_text(item).ok_or_else(|| format!("invalid package under '{manager}'"))
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    other => vec![
                        scalar_text(other).ok_or_else(|| format!("invalid package under '{manager}'"))?,
                    ],
                };
                Ok(ManagerPackages { manager, packages })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { managers })
    }
}

impl From<PackageEntry> for Mapping {
    fn from(entry: PackageEntry) -> Self {
        entry
            .managers
            .into_iter()
            .map(|m| {
                (
                    Node::String(m.manager),
                    Node::Sequence(m.packages.into_iter().map(Node::String).collect()),
                )
            })
            .collect()
    }
}

/// The `package` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Entries in document order.
    pub entries: Vec<PackageEntry>,
}

impl Decode for Package {
    const NAME: &'static str = "package";
    const SHAPE: &'static Shape = &PACKAGE;

    fn decode(_: &Registry, node: Node) -> Result<Self, ConfigError> {
        Ok(Self {
            entries: decode(Self::NAME, node)?,
        })
    }
}

impl Directive for Package {
    fn enabled(&self, ctx: &Context) -> bool {
        ctx.platform.is_root || ctx.can_sudo()
    }

    fn run_all(&self, ctx: &Context) -> Result<(), DirectiveError> {
        run_entries(ctx, Self::NAME, &self.entries, |entry| install_entry(ctx, entry))
    }

    fn describe(&self) -> Option<String> {
        summarize(
            self.entries
                .iter()
                .filter_map(|e| e.managers.first())
                .flat_map(|m| m.packages.iter().map(String::as_str)),
        )
    }

    fn to_node(&self) -> Result<Node, ConfigError> {
        encode(Self::NAME, &self.entries)
    }
}

/// The host's manager for `os`.
fn os_manager(ctx: &Context) -> Option<Manager> {
    Manager::ALL
        .into_iter()
        .find(|m| ctx.executor.which(m.program()))
}

fn install_entry(ctx: &Context, entry: &PackageEntry) -> Result<()> {
    for choice in &entry.managers {
        let manager = if choice.manager == OS_MANAGER {
            os_manager(ctx)
        } else {
            Manager::from_name(&choice.manager)
        };
        let Some(manager) = manager else {
            ctx.log
                .debug(&format!("package manager '{}' is not supported", choice.manager));
            continue;
        };
        if ctx.executor.which(manager.program()) {
            return install_all(ctx, manager, &choice.packages);
        }
    }
    ctx.log.debug("no listed package manager is available");
    Ok(())
}

fn install_all(ctx: &Context, manager: Manager, packages: &[String]) -> Result<()> {
    let mut failed = Vec::new();
    for package in packages {
        let package = ctx.render(package)?;
        if let Err(e) = install_one(ctx, manager, &package) {
            ctx.log.error(&format!("package {package}: {e:#}"));
            failed.push(package);
        }
    }
    if !failed.is_empty() {
        bail!("failed to install {}", failed.join(", "));
    }
    Ok(())
}

fn install_one(ctx: &Context, manager: Manager, package: &str) -> Result<()> {
    let query = manager.query(package);
    let output = ctx
        .executor
        .run_unchecked(&query.program, &query.arg_refs())?;
    let versions = manager.parse(package, &output.stdout);

    if versions.installed.is_empty() && versions.latest.is_empty() {
        bail!("no candidate version for {package}");
    }
    if versions.installed == versions.latest {
        ctx.log
            .debug(&format!("up-to-date {package} {}", versions.installed));
        return Ok(());
    }
    if versions.installed.is_empty() {
        ctx.report(&format!("installing {package} {}", versions.latest));
    } else {
        ctx.report(&format!(
            "updating {package} {} -> {}",
            versions.installed, versions.latest
        ));
    }
    if ctx.dry_run {
        return Ok(());
    }
    manager
        .install(package, ctx.platform.is_root)
        .run_attached(ctx.executor.as_ref(), manager.attach())?;
    Ok(())
}

fn none_to_empty(version: &str) -> String {
    if version == "(none)" {
        String::new()
    } else {
        version.to_string()
    }
}

/// Read `Installed:` and `Candidate:` from `apt-cache policy`.
#[must_use]
pub fn parse_apt_policy(output: &str) -> Versions {
    let mut versions = Versions::default();
    for line in output.lines().map(str::trim) {
        if let Some(v) = line.strip_prefix("Installed:") {
            versions.installed = none_to_empty(v.trim());
        } else if let Some(v) = line.strip_prefix("Candidate:") {
            versions.latest = none_to_empty(v.trim());
        }
    }
    versions
}

/// Read `apk policy`: versions are listed newest first, each followed by the
/// repositories providing it; `lib/apk/db/installed` marks the installed one.
#[must_use]
pub fn parse_apk_policy(output: &str) -> Versions {
    let mut versions = Versions::default();
    let mut current: Option<&str> = None;
    for line in output.lines() {
        let indent = line.len() - line.trim_start().len();
        let text = line.trim();
        match indent {
            2 => {
                let version = text.trim_end_matches(':');
                if versions.latest.is_empty() {
                    versions.latest = version.to_string();
                }
                current = Some(version);
            }
            n if n > 2 && text == "lib/apk/db/installed" => {
                if let Some(version) = current {
                    versions.installed = version.to_string();
                }
            }
            _ => {}
        }
    }
    versions
}

#[derive(Deserialize)]
struct BrewInfo {
    #[serde(default)]
    formulae: Vec<BrewFormula>,
    #[serde(default)]
    casks: Vec<BrewCask>,
}

#[derive(Deserialize)]
struct BrewFormula {
    full_name: String,
    #[serde(default)]
    outdated: bool,
    versions: BrewVersions,
    #[serde(default)]
    installed: Vec<BrewInstalled>,
}

#[derive(Deserialize)]
struct BrewVersions {
    #[serde(default)]
    stable: Option<String>,
}

#[derive(Deserialize)]
struct BrewInstalled {
    version: String,
}

#[derive(Deserialize)]
struct BrewCask {
    token: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    installed: Option<String>,
}

/// Read `brew info --json=v2`. A formula that is not outdated counts as
/// current even when its revision differs from the stable version.
#[must_use]
pub fn parse_brew_info(package: &str, output: &str) -> Versions {
    let Ok(info) = serde_json::from_str::<BrewInfo>(output) else {
        return Versions::default();
    };
    if let Some(formula) = info.formulae.iter().find(|f| f.full_name == package) {
        let stable = formula.versions.stable.clone().unwrap_or_default();
        return match formula.installed.first() {
            None => Versions {
                installed: String::new(),
                latest: stable,
            },
            Some(current) if !formula.outdated => Versions {
                installed: current.version.clone(),
                latest: current.version.clone(),
            },
            Some(current) => Versions {
                installed: current.version.clone(),
                latest: stable,
            },
        };
    }
    info.casks
        .into_iter()
        .find(|c| c.token == package)
        .map(|c| Versions {
            installed: c.installed.unwrap_or_default(),
            latest: c.version,
        })
        .unwrap_or_default()
}
