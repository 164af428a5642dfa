//! `install`: track a tool's latest upstream version and run its install
//! steps whenever the version changes.
use anyhow::{Context as _, Result, bail};
use regex::Regex;
use serde::Deserialize;

use super::download::{DOWNLOAD_ENTRY, Download, DownloadEntry};
use super::shell::{SHELL_ENTRY, Shell, ShellEntry};
use super::{Context, Decode, Directive, DirectiveList, Registry, summarize};
use crate::config::canonical::{Shape, Transform};
use crate::config::{Mapping, Node, decode, encode};
use crate::error::{ConfigError, DirectiveError};
use crate::escalation::Envelope;
use crate::http;
use crate::template;

/// Canonical form of `install`.
pub const INSTALL: Shape = Shape {
    name: "install",
    key: None,
    fields: &["name", "url", "version", "download", "shell", "sudo", "then"],
    list: &[Transform::EnsureList],
    entry: &[],
    nested: &[("download", &DOWNLOAD_ENTRY), ("shell", &SHELL_ENTRY)],
};

const GITHUB: &str = "https://github.com/";

#[derive(Deserialize)]
struct RawInstall {
    #[serde(default)]
    name: String,
    url: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    download: Option<DownloadEntry>,
    #[serde(default)]
    shell: Option<ShellEntry>,
    #[serde(default)]
    sudo: bool,
    #[serde(default)]
    then: Node,
}

/// One tracked tool.
#[derive(Debug)]
pub struct InstallEntry {
    /// Display name, defaults to the URL.
    pub name: String,
    /// Release page; also the state key.
    pub url: String,
    /// Template producing the version, or a regex applied to the page body.
    /// Empty for GitHub URLs.
    pub version: String,
    /// Download run before `then`.
    pub download: Option<DownloadEntry>,
    /// Command run before `then`, after `download`.
    pub shell: Option<ShellEntry>,
    /// Run the install steps in an elevated child.
    pub sudo: bool,
    /// Install steps.
    pub then: DirectiveList,
}

impl InstallEntry {
    fn title(&self) -> &str {
        if self.name.is_empty() {
            &self.url
        } else {
            &self.name
        }
    }
}

/// The `install` directive.
#[derive(Debug)]
pub struct Install {
    /// Tools in document order.
    pub entries: Vec<InstallEntry>,
}

impl Decode for Install {
    const NAME: &'static str = "install";
    const SHAPE: &'static Shape = &INSTALL;
    const LISTS: &'static [&'static str] = &["then"];

    fn decode(registry: &Registry, node: Node) -> Result<Self, ConfigError> {
        let raw: Vec<RawInstall> = decode(Self::NAME, node)?;
        let entries = raw
            .into_iter()
            .map(|e| {
                Ok(InstallEntry {
                    then: registry.decode_list(e.then)?,
                    name: e.name,
                    url: e.url,
                    version: e.version,
                    download: e.download,
                    shell: e.shell,
                    sudo: e.sudo,
                })
            })
            .collect::<Result<_, ConfigError>>()?;
        Ok(Self { entries })
    }
}

impl Directive for Install {
    fn run_all(&self, ctx: &Context) -> Result<(), DirectiveError> {
        let mut failed = 0;
        for entry in &self.entries {
            if let Err(e) = install(ctx, entry) {
                ctx.log.error(&format!("install: {}: {e:#}", entry.title()));
                failed += 1;
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
        summarize(self.entries.iter().map(InstallEntry::title))
    }

    fn to_node(&self) -> Result<Node, ConfigError> {
        self.entries
            .iter()
            .map(|e| {
                let mut map = Mapping::new();
                if !e.name.is_empty() {
                    map.insert("name".into(), e.name.clone().into());
                }
                map.insert("url".into(), e.url.clone().into());
                if !e.version.is_empty() {
                    map.insert("version".into(), e.version.clone().into());
                }
                if let Some(download) = &e.download {
                    map.insert("download".into(), encode(Self::NAME, download)?);
                }
                if let Some(shell) = &e.shell {
                    map.insert("shell".into(), encode(Self::NAME, shell)?);
                }
                map.insert("sudo".into(), e.sudo.into());
                if !e.then.is_empty() {
                    map.insert("then".into(), e.then.to_node()?);
                }
                Ok(Node::Mapping(map))
            })
            .collect::<Result<Vec<_>, ConfigError>>()
            .map(Node::Sequence)
    }
}

/// Capture group 1 of the first match, or the whole match when the pattern
/// has no groups.
#[must_use]
pub fn extract_version(pattern: &Regex, text: &str) -> Option<String> {
    let captures = pattern.captures(text)?;
    captures
        .get(1)
        .or_else(|| captures.get(0))
        .map(|m| m.as_str().to_string())
}

fn latest_version(ctx: &Context, url: &str, version: &str) -> Result<String> {
    if url.starts_with(GITHUB) && version.is_empty() {
        let repo = url.trim_end_matches('/');
        return http::latest_release(repo.strip_suffix("/releases/latest").unwrap_or(repo));
    }
    if template::has_template(version) {
        return Ok(ctx.render(version)?);
    }
    let pattern =
        Regex::new(version).with_context(|| format!("invalid version pattern {version:?}"))?;
    let body = http::get_string(url)?;
    Ok(extract_version(&pattern, &body).unwrap_or_default())
}

/// `download` and `shell` of `entry`, in that order.
fn prelude(entry: &InstallEntry) -> DirectiveList {
    let mut list = DirectiveList::new();
    if let Some(download) = &entry.download {
        list.push("download", Box::new(Download::single(download.clone())));
    }
    if let Some(shell) = &entry.shell {
        list.push(
            "shell",
            Box::new(Shell {
                entries: vec![shell.clone()],
            }),
        );
    }
    list
}

fn sequence(node: Node) -> Vec<Node> {
    match node {
        Node::Sequence(items) => items,
        _ => Vec::new(),
    }
}

fn install(ctx: &Context, entry: &InstallEntry) -> Result<()> {
    let url = ctx.render(&entry.url)?;
    let title = entry.title();
    let latest = latest_version(ctx, &url, &entry.version)?;
    if latest.is_empty() {
        bail!("latest version was empty");
    }

    let current = ctx.state.borrow().get(&url).unwrap_or_default().to_string();
    if current == latest {
        ctx.log.debug(&format!("up-to-date {title} {latest}"));
        return Ok(());
    }
    if current.is_empty() {
        ctx.report(&format!("installing {title} {latest}"));
    } else {
        ctx.report(&format!("updating {title} {current} -> {latest}"));
    }

    let _scope = ctx.vars.scope([
        ("Current", current.as_str()),
        ("Version", latest.as_str()),
        ("Url", url.as_str()),
    ]);
    let prelude = prelude(entry);

    if entry.sudo && ctx.would_sudo() {
        let mut steps = sequence(prelude.to_node()?);
        steps.extend(sequence(entry.then.to_node()?));
        let envelope = Envelope::list(Node::Sequence(steps), ctx.vars.snapshot());
        ctx.escalator
            .escalate(&ctx.platform, ctx.executor.as_ref(), &envelope)?;
    } else {
        let failed = prelude.run_all(ctx).failed + entry.then.run_all(ctx).failed;
        if failed > 0 {
            bail!("{failed} install step(s) failed, keeping version {current:?}");
        }
    }

    if !ctx.dry_run {
        ctx.state.borrow_mut().set_save(&url, &latest)?;
    }
    Ok(())
}
