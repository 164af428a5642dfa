//! `download`: fetch a URL to a file, optionally unpacking it afterwards.
use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use super::create::Mode;
use super::extract::{EXTRACT_ITEMS, ExtractItem, extract_archive};
use super::{Context, Decode, Directive, Registry, default_true, run_entries, summarize};
use crate::config::canonical::{Shape, Transform};
use crate::config::{Node, decode, encode, scalar_text};
use crate::error::{ConfigError, DirectiveError};
use crate::http;
use crate::resources::fs;

/// Canonical form of `download`: `{~/bin/tool: {url: ...}}` or full entries.
pub const DOWNLOAD: Shape = Shape {
    name: "download",
    key: None,
    fields: &["name", "url", "path", "mkdirs", "force", "mode", "extract"],
    list: &[Transform::MapToSliceMap, Transform::EnsureList],
    entry: &[Transform::MapKeyIntoValueMap("path")],
    nested: &[("extract", &EXTRACT_ITEMS)],
};

/// A lone download entry, as nested under `install`: `url`, or
/// `{~/bin/tool: {url: ...}}`.
pub const DOWNLOAD_ENTRY: Shape = Shape {
    name: "download",
    key: None,
    fields: DOWNLOAD.fields,
    list: &[],
    entry: &[
        Transform::ScalarToMap("url"),
        Transform::MapKeyIntoValueMap("path"),
    ],
    nested: DOWNLOAD.nested,
};

const fn default_file_mode() -> Mode {
    Mode(0o666)
}

/// One download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadEntry {
    /// Display name, defaults to the file name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Source URL; a leading `/` is appended to the `Url` variable.
    pub url: String,
    /// Destination file or directory; empty for a temporary file.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Create missing parent directories.
    #[serde(default = "default_true")]
    pub mkdirs: bool,
    /// Download even when the destination exists.
    #[serde(default)]
    pub force: bool,
    /// Mode of a newly created file, before the umask.
    #[serde(default = "default_file_mode")]
    pub mode: Mode,
    /// Members to extract from the downloaded archive.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extract: Vec<ExtractItem>,
}

/// The `download` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    /// Downloads in document order.
    pub entries: Vec<DownloadEntry>,
}

impl Download {
    /// A single download entry, as built by `install` and the `download`
    /// command.
    #[must_use]
    pub fn single(entry: DownloadEntry) -> Self {
        Self {
            entries: vec![entry],
        }
    }
}

impl DownloadEntry {
    /// Entry for `url` with every other field at its default.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            url: url.into(),
            path: String::new(),
            mkdirs: true,
            force: false,
            mode: default_file_mode(),
            extract: Vec::new(),
        }
    }
}

impl Decode for Download {
    const NAME: &'static str = "download";
    const SHAPE: &'static Shape = &DOWNLOAD;

    fn decode(_: &Registry, node: Node) -> Result<Self, ConfigError> {
        Ok(Self {
            entries: decode(Self::NAME, node)?,
        })
    }
}

impl Directive for Download {
    fn run_all(&self, ctx: &Context) -> Result<(), DirectiveError> {
        run_entries(ctx, Self::NAME, &self.entries, |entry| download(ctx, entry))
    }

    fn describe(&self) -> Option<String> {
        summarize(self.entries.iter().map(|e| {
            if e.name.is_empty() {
                http::url_basename(&e.url)
            } else {
                e.name.as_str()
            }
        }))
    }

    fn to_node(&self) -> Result<Node, ConfigError> {
        encode(Self::NAME, &self.entries)
    }
}

/// Prefix a `/`-rooted URL with the `Url` variable when one is set.
fn resolve_url(ctx: &Context, url: String) -> String {
    if url.starts_with('/')
        && let Some(base) = ctx.vars.get("Url").as_ref().and_then(scalar_text)
    {
        return format!("{}{url}", base.trim_end_matches('/'));
    }
    url
}

/// Where `url` is written, or `None` if an existing file is kept.
fn destination(ctx: &Context, entry: &DownloadEntry, file_name: &str) -> Result<Option<PathBuf>> {
    if entry.path.is_empty() {
        let path = std::env::temp_dir().join(format!("dotbot-{}-{file_name}", std::process::id()));
        ctx.track_temp(path.clone());
        return Ok(Some(path));
    }
    let mut path = ctx.path(&entry.path)?;
    if path.is_dir() {
        path.push(file_name);
    }
    if fs::occupied(&path) && !entry.force {
        ctx.vars.set("Path", path.display().to_string());
        ctx.log.debug(&format!("exists {}", path.display()));
        return Ok(None);
    }
    Ok(Some(path))
}

fn download(ctx: &Context, entry: &DownloadEntry) -> Result<()> {
    let url = resolve_url(ctx, ctx.render(&entry.url)?);
    let file_name = http::url_basename(&url).to_string();
    let Some(dest) = destination(ctx, entry, &file_name)? else {
        return Ok(());
    };
    ctx.vars.set("Path", dest.display().to_string());
    let label = if entry.name.is_empty() {
        file_name
    } else {
        ctx.render(&entry.name)?
    };

    if ctx.dry_run {
        ctx.report(&format!("downloaded {label} -> {}", dest.display()));
        if !entry.extract.is_empty() {
            ctx.report(&format!(
                "extracted {} items from {}",
                entry.extract.len(),
                dest.display()
            ));
        }
        return Ok(());
    }

    fs::require_writable_parent(&dest)?;
    if entry.mkdirs {
        fs::ensure_parent_dir(&dest)?;
    }
    let bytes = fetch(&url, &dest, entry.mode.0).inspect_err(|_| {
        std::fs::remove_file(&dest).ok();
    })?;
    ctx.report(&format!("downloaded {label} -> {} ({bytes} bytes)", dest.display()));

    if !entry.extract.is_empty() {
        extract_archive(ctx, &dest, &entry.extract)?;
    }
    Ok(())
}

fn fetch(url: &str, dest: &Path, mode: u32) -> Result<u64> {
    let file = create_file(dest, mode).with_context(|| format!("create {}", dest.display()))?;
    let mut out = BufWriter::new(file);
    let bytes = http::download_to(url, &mut out)?;
    out.flush()
        .with_context(|| format!("write {}", dest.display()))?;
    Ok(bytes)
}

#[cfg(unix)]
fn create_file(path: &Path, mode: u32) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt as _;
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
}

#[cfg(not(unix))]
fn create_file(path: &Path, _mode: u32) -> std::io::Result<File> {
    File::create(path)
}
