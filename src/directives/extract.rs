//! `extract`: unpack selected members of `.tar.gz`, `.tgz`, `.tar` and
//! `.zip` archives.
//!
//! Each item names a member (or a glob over members) and a destination. An
//! exact member lands in the destination directory under its own base name,
//! or under a new name written as `dir/#/new-name`. Glob matches keep their
//! path below the archive root after dropping `strip` leading components.
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use serde::{Deserialize, Serialize};

use super::{Context, Decode, Directive, Registry, run_entries, summarize};
use crate::config::canonical::{Shape, Transform};
use crate::config::{Node, decode, encode};
use crate::error::{ConfigError, DirectiveError};
use crate::resources::fs;

/// Marks a rename inside an item path: `~/bin/#/tool`.
const RENAME_MARKER: &str = "/#/";

/// Canonical form of an item list.
pub const EXTRACT_ITEMS: Shape = Shape {
    name: "extract items",
    key: Some("source"),
    fields: &["source", "path", "strip", "replace"],
    list: &[Transform::MapToSliceMap, Transform::EnsureList],
    entry: &[
        Transform::MapKeyIntoValueMap("source"),
        Transform::MapSplitKeyVal("source", "path"),
    ],
    nested: &[],
};

/// Canonical form of `extract`.
pub const EXTRACT: Shape = Shape {
    name: "extract",
    key: Some("archive"),
    fields: &["archive", "items"],
    list: &[Transform::MapToSliceMap, Transform::EnsureList],
    entry: &[Transform::MapSplitKeyVal("archive", "items")],
    nested: &[("items", &EXTRACT_ITEMS)],
};

/// One member selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractItem {
    /// Member path or glob inside the archive.
    pub source: String,
    /// Destination directory, optionally with a `/#/new-name` suffix.
    #[serde(default)]
    pub path: String,
    /// Leading components dropped from glob matches.
    #[serde(default)]
    pub strip: usize,
    /// Remove the destination directory first.
    #[serde(default)]
    pub replace: bool,
}

/// One archive and what to take from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractEntry {
    /// Archive file.
    pub archive: String,
    /// Members to extract.
    #[serde(default)]
    pub items: Vec<ExtractItem>,
}

/// The `extract` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extract {
    /// Archives in document order.
    pub entries: Vec<ExtractEntry>,
}

impl Decode for Extract {
    const NAME: &'static str = "extract";
    const SHAPE: &'static Shape = &EXTRACT;

    fn decode(_: &Registry, node: Node) -> Result<Self, ConfigError> {
        Ok(Self {
            entries: decode(Self::NAME, node)?,
        })
    }
}

impl Directive for Extract {
    fn run_all(&self, ctx: &Context) -> Result<(), DirectiveError> {
        run_entries(ctx, Self::NAME, &self.entries, |entry| {
            let archive = ctx.source_path(&entry.archive)?;
            extract_archive(ctx, &archive, &entry.items).map(|_| ())
        })
    }

    fn describe(&self) -> Option<String> {
        summarize(self.entries.iter().map(|e| e.archive.as_str()))
    }

    fn to_node(&self) -> Result<Node, ConfigError> {
        encode(Self::NAME, &self.entries)
    }
}

/// Supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// Gzip-compressed tarball.
    TarGz,
    /// Plain tarball.
    Tar,
    /// Zip file.
    Zip,
}

impl ArchiveKind {
    /// Pick the format from the file name.
    ///
    /// # Errors
    ///
    /// Returns an error for any other extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(Self::TarGz)
        } else if name.ends_with(".tar") {
            Ok(Self::Tar)
        } else if name.ends_with(".zip") {
            Ok(Self::Zip)
        } else {
            bail!("unsupported archive format: {}", path.display())
        }
    }
}

/// What an archive member is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// Regular file.
    File,
    /// Directory.
    Dir,
    /// Symlink, device or anything else that is not extracted.
    Other,
}

/// Callback for [`walk_archive`]: member name, kind, permission bits, data.
pub type Visit<'a> = dyn FnMut(&str, MemberKind, u32, &mut dyn Read) -> Result<()> + 'a;

/// Call `visit` for every member of the archive at `path`, in archive order.
///
/// # Errors
///
/// Returns an error if the archive cannot be read or `visit` fails.
pub fn walk_archive(path: &Path, visit: &mut Visit<'_>) -> Result<()> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = BufReader::new(file);
    match ArchiveKind::from_path(path)? {
        ArchiveKind::TarGz => walk_tar(tar::Archive::new(flate2::read::GzDecoder::new(reader)), visit),
        ArchiveKind::Tar => walk_tar(tar::Archive::new(reader), visit),
        ArchiveKind::Zip => walk_zip(reader, visit),
    }
    .with_context(|| format!("read archive {}", path.display()))
}

fn walk_tar<R: Read>(mut archive: tar::Archive<R>, visit: &mut Visit<'_>) -> Result<()> {
    for entry in archive.entries()? {
        let mut entry = entry?;
        let header = entry.header();
        let entry_type = header.entry_type();
        if entry_type == tar::EntryType::XGlobalHeader {
            continue;
        }
        let kind = if entry_type.is_dir() {
            MemberKind::Dir
        } else if entry_type.is_file() || entry_type.is_gnu_sparse() {
            MemberKind::File
        } else {
            MemberKind::Other
        };
        let mode = header.mode().unwrap_or(0o644);
        let name = entry.path()?.to_string_lossy().replace('\\', "/");
        let name = name.trim_end_matches('/').to_string();
        visit(&name, kind, mode, &mut entry)?;
    }
    Ok(())
}

fn walk_zip<R: Read + std::io::Seek>(reader: R, visit: &mut Visit<'_>) -> Result<()> {
    const S_IFMT: u32 = 0o170_000;
    const S_IFLNK: u32 = 0o120_000;

    let mut archive = zip::ZipArchive::new(reader)?;
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let mode = file.unix_mode();
        let kind = if file.is_dir() {
            MemberKind::Dir
        } else if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            MemberKind::Other
        } else {
            MemberKind::File
        };
        let name = file.name().trim_end_matches('/').to_string();
        visit(&name, kind, mode.unwrap_or(0o644) & 0o7777, &mut file)?;
    }
    Ok(())
}

/// An item with its templates rendered.
struct Target {
    matcher: Matcher,
    root: PathBuf,
    rename: Option<String>,
    strip: usize,
}

enum Matcher {
    Exact(String),
    Glob(glob::Pattern),
}

const MATCH_OPTIONS: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

fn is_pattern(source: &str) -> bool {
    let magic: &[char] = if cfg!(windows) { &['*', '?', '['] } else { &['*', '?', '[', '\\'] };
    source.contains(magic)
}

impl Target {
    fn new(ctx: &Context, item: &ExtractItem) -> Result<Self> {
        let source = ctx.render(&item.source)?;
        let path = ctx.render(&item.path)?;
        let (root, rename) = match path.split_once(RENAME_MARKER) {
            Some((root, name)) => (root.to_string(), Some(name.to_string())),
            None => (path, None),
        };
        let matcher = if is_pattern(&source) {
            Matcher::Glob(
                glob::Pattern::new(&source)
                    .with_context(|| format!("invalid pattern '{source}'"))?,
            )
        } else {
            Matcher::Exact(source.trim_end_matches('/').to_string())
        };
        Ok(Self {
            matcher,
            root: fs::expand_user(&root, &ctx.home),
            rename,
            strip: item.strip,
        })
    }

    /// Destination of `member`, or `None` if this item does not select it.
    fn destination(&self, member: &str) -> Option<PathBuf> {
        match &self.matcher {
            Matcher::Exact(source) if source == member => {
                let name = self.rename.clone().or_else(|| {
                    Path::new(source)
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                })?;
                Some(self.root.join(name))
            }
            Matcher::Exact(_) => None,
            Matcher::Glob(pattern) if pattern.matches_with(member, MATCH_OPTIONS) => {
                let stripped = strip_components(member, self.strip)?;
                Some(self.root.join(stripped))
            }
            Matcher::Glob(_) => None,
        }
    }
}

/// Drop `depth` leading `/`-separated components; `None` if nothing is left.
fn strip_components(path: &str, depth: usize) -> Option<&str> {
    let mut rest = path;
    for _ in 0..depth {
        rest = rest.split_once('/')?.1;
    }
    (!rest.is_empty()).then_some(rest)
}

/// Extract the members of `archive` selected by `items`. Returns the
/// number of members written (or that would be written in dry-run mode).
///
/// # Errors
///
/// Returns an error if a template fails, the archive cannot be read, or a
/// member cannot be written.
pub fn extract_archive(ctx: &Context, archive: &Path, items: &[ExtractItem]) -> Result<usize> {
    let targets = items
        .iter()
        .map(|item| Target::new(ctx, item))
        .collect::<Result<Vec<_>>>()?;

    if !ctx.dry_run {
        for (target, item) in targets.iter().zip(items) {
            if item.replace && target.root.exists() {
                std::fs::remove_dir_all(&target.root)
                    .with_context(|| format!("remove {}", target.root.display()))?;
            }
            std::fs::create_dir_all(&target.root)
                .with_context(|| format!("create directory: {}", target.root.display()))?;
        }
    }

    let mut written = 0;
    walk_archive(archive, &mut |member, kind, mode, data| {
        for target in &targets {
            let Some(dest) = target.destination(member) else {
                continue;
            };
            if !ctx.dry_run {
                write_member(&dest, kind, mode, data)?;
            }
            if kind == MemberKind::File {
                ctx.log.debug(&format!("[+] {}", dest.display()));
                written += 1;
            }
        }
        Ok(())
    })?;

    if written == 0 && !targets.is_empty() {
        ctx.log
            .warn(&format!("nothing matched in {}", archive.display()));
    } else {
        ctx.report(&format!("extracted {written} files from {}", archive.display()));
    }
    Ok(written)
}

fn write_member(dest: &Path, kind: MemberKind, mode: u32, data: &mut dyn Read) -> Result<()> {
    match kind {
        MemberKind::Dir => std::fs::create_dir_all(dest)
            .with_context(|| format!("create directory: {}", dest.display())),
        MemberKind::File => {
            fs::ensure_parent_dir(dest)?;
            let mut out =
                File::create(dest).with_context(|| format!("create {}", dest.display()))?;
            std::io::copy(data, &mut out).with_context(|| format!("write {}", dest.display()))?;
            fs::set_mode(dest, mode & 0o7777)
        }
        MemberKind::Other => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
pub(crate) mod tests {
    use super::*;
    use crate::directives::test_helpers::{test_context, yaml};
    use std::io::Write as _;

    /// Write a `.tar.gz` holding `files` to `path`.
    pub(crate) fn write_targz(path: &Path, files: &[(&str, &[u8], u32)]) {
        let file = File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data, mode) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn decode_extract(src: &str) -> Extract {
        Extract::decode(&Registry::standard(), EXTRACT.canonicalize(yaml(src)).unwrap()).unwrap()
    }

    fn sample(ctx: &Context) -> PathBuf {
        let archive = ctx.base_dir.join("tool.tar.gz");
        write_targz(
            &archive,
            &[
                ("tool-1.0/bin/tool", b"#!/bin/sh\n", 0o755),
                ("tool-1.0/README", b"readme", 0o644),
                ("tool-1.0/share/man/tool.1", b"man", 0o644),
                ("tool-1.0/share/doc/guide", b"doc", 0o644),
            ],
        );
        archive
    }

    #[test]
    fn shorthand_forms() {
        let e = decode_extract("{a.tar.gz: {x/bin/tool: ~/bin, 'x/*': {path: ~/x, strip: 1}}}");
        assert_eq!(e.entries[0].archive, "a.tar.gz");
        let items = &e.entries[0].items;
        assert_eq!(items[0].source, "x/bin/tool");
        assert_eq!(items[0].path, "~/bin");
        assert_eq!(items[1].strip, 1);
    }

    #[test]
    fn archive_kind_by_extension() {
        assert_eq!(ArchiveKind::from_path(Path::new("a.tar.gz")).unwrap(), ArchiveKind::TarGz);
        assert_eq!(ArchiveKind::from_path(Path::new("a.TGZ")).unwrap(), ArchiveKind::TarGz);
        assert_eq!(ArchiveKind::from_path(Path::new("a.tar")).unwrap(), ArchiveKind::Tar);
        assert_eq!(ArchiveKind::from_path(Path::new("a.zip")).unwrap(), ArchiveKind::Zip);
        assert!(ArchiveKind::from_path(Path::new("a.rar")).is_err());
    }

    #[test]
    fn strip_components_drops_leading_parts() {
        assert_eq!(strip_components("a/b/c", 1), Some("b/c"));
        assert_eq!(strip_components("a/b/c", 2), Some("c"));
        assert_eq!(strip_components("a/b/c", 3), None);
        assert_eq!(strip_components("a", 0), Some("a"));
    }

    #[test]
    fn exact_member_uses_base_name_or_rename() {
        let (ctx, _log, _dir) = test_context();
        sample(&ctx);
        decode_extract(
            "{tool.tar.gz: {tool-1.0/bin/tool: ~/bin, tool-1.0/README: ~/doc/#/README.txt}}",
        )
        .run_all(&ctx)
        .unwrap();
        assert_eq!(std::fs::read(ctx.home.join("bin/tool")).unwrap(), b"#!/bin/sh\n");
        assert_eq!(std::fs::read(ctx.home.join("doc/README.txt")).unwrap(), b"readme");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            let mode = std::fs::metadata(ctx.home.join("bin/tool")).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn glob_members_are_stripped() {
        let (ctx, log, _dir) = test_context();
        sample(&ctx);
        decode_extract("{tool.tar.gz: {'tool-1.0/share/*/*': {path: ~/share, strip: 2}}}")
            .run_all(&ctx)
            .unwrap();
        assert!(ctx.home.join("share/man/tool.1").is_file());
        assert!(ctx.home.join("share/doc/guide").is_file());
        assert!(!ctx.home.join("share/README").exists());
        assert!(log.contains("extracted 2 files"));
    }

    #[test]
    fn replace_clears_the_destination() {
        let (ctx, _log, _dir) = test_context();
        sample(&ctx);
        std::fs::create_dir_all(ctx.home.join("bin")).unwrap();
        std::fs::write(ctx.home.join("bin/stale"), "").unwrap();
        decode_extract("{tool.tar.gz: {tool-1.0/bin/tool: {path: ~/bin, replace: true}}}")
            .run_all(&ctx)
            .unwrap();
        assert!(!ctx.home.join("bin/stale").exists());
        assert!(ctx.home.join("bin/tool").exists());
    }

    #[test]
    fn zip_archives_are_supported() {
        let (ctx, _log, _dir) = test_context();
        write_zip(&ctx.base_dir.join("t.zip"), &[("t/tool.exe", b"exe"), ("t/other", b"x")]);
        decode_extract("{t.zip: {t/tool.exe: ~/bin}}").run_all(&ctx).unwrap();
        assert_eq!(std::fs::read(ctx.home.join("bin/tool.exe")).unwrap(), b"exe");
        assert!(!ctx.home.join("bin/other").exists());
    }

    #[test]
    fn dry_run_writes_nothing() {
        let (ctx, log, _dir) = test_context();
        sample(&ctx);
        let ctx = ctx.with_dry_run(true);
        decode_extract("{tool.tar.gz: {tool-1.0/bin/tool: ~/bin}}")
            .run_all(&ctx)
            .unwrap();
        assert!(!ctx.home.join("bin").exists());
        assert!(log.contains("dry_run: extracted 1 files"));
    }

    #[test]
    fn missing_archive_fails_the_entry() {
        let (ctx, _log, _dir) = test_context();
        let err = decode_extract("{nope.tar.gz: {a: ~/x}}").run_all(&ctx).unwrap_err();
        assert!(matches!(err, DirectiveError::Entries { failed: 1, .. }));
    }
}
