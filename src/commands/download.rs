//! `dotbot download`: fetch files with the built-in downloader, without a
//! document.
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};

use super::{CommandSetup, finish};
use crate::cli::{DownloadOpts, GlobalOpts};
use crate::directives::DirectiveList;
use crate::directives::create::Mode;
use crate::directives::download::{Download, DownloadEntry};
use crate::logging::{Log, Logger};

/// Run the `download` command. URLs are read from stdin when none are
/// given on the command line.
///
/// # Errors
///
/// Returns an error if any download fails.
pub fn run(global: &GlobalOpts, opts: &DownloadOpts, log: &Arc<Logger>) -> Result<()> {
    let urls = if opts.urls.is_empty() {
        read_urls(std::io::stdin().lock())?
    } else {
        opts.urls.clone()
    };
    if urls.is_empty() {
        anyhow::bail!("no URLs to download");
    }
    let cwd = std::env::current_dir().context("cannot determine the working directory")?;
    let ctx = CommandSetup::init()?.into_context(
        Arc::clone(log) as Arc<dyn Log>,
        cwd.clone(),
        global.dry_run,
    );
    let mut list = DirectiveList::new();
    list.push("download", Box::new(plan(&urls, opts, &cwd)));
    list.run_all(&ctx);
    ctx.remove_temp_files();
    finish(log)
}

/// Read URLs one per line until the first line that is not a URL.
///
/// # Errors
///
/// Returns an error if reading fails.
pub fn read_urls(reader: impl BufRead) -> Result<Vec<String>> {
    let mut urls = Vec::new();
    for line in reader.lines() {
        let line = line.context("failed reading URLs from stdin")?;
        let line = line.trim();
        if !line.starts_with("http") {
            break;
        }
        urls.push(line.to_string());
    }
    Ok(urls)
}

/// One download entry per URL. The n-th `--output` goes with the n-th URL;
/// URLs past the last output land in `cwd`.
#[must_use]
pub fn plan(urls: &[String], opts: &DownloadOpts, cwd: &Path) -> Download {
    let mode = if opts.executable { 0o777 } else { 0o666 };
    let entries = urls
        .iter()
        .enumerate()
        .map(|(i, url)| {
            let path = opts.outputs.get(i).map_or(cwd, PathBuf::as_path);
            DownloadEntry {
                path: path.display().to_string(),
                force: opts.force,
                mode: Mode(mode),
                ..DownloadEntry::new(url.as_str())
            }
        })
        .collect();
    Download { entries }
}
