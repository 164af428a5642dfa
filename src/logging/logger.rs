//! The run logger: console and file output through [`tracing`], plus the
//! per-directive outcomes behind the end-of-run summary.
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use super::subscriber::{DIRECTIVE, DRY_RUN, STAGE};
use super::types::{Log, RunEntry, RunStatus};
use super::utils::{format_duration, log_file_path};

/// Logger shared by every directive of one command.
///
/// Messages go through [`tracing`]; the subscriber installed by
/// [`init_subscriber`](super::init_subscriber) writes them to the console
/// and to `$XDG_CACHE_HOME/dotbot/<command>.log`.
#[derive(Debug)]
pub struct Logger {
    entries: Mutex<Vec<RunEntry>>,
    log_file: Option<PathBuf>,
}

impl Logger {
    /// Create the logger for `command`. The log file itself is opened by the
    /// subscriber; only its path is kept here for the summary.
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            log_file: log_file_path(command),
        }
    }

    /// Path of the log file, if there is one.
    #[must_use]
    pub const fn log_path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    /// Recorded directive outcomes, in recording order.
    #[must_use]
    pub fn entries(&self) -> Vec<RunEntry> {
        self.entries.lock().map_or_else(|_| vec![], |g| g.clone())
    }

    /// Log an error message.
    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    /// Log a warning message.
    pub fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    /// Log a stage header, e.g. a group name.
    pub fn stage(&self, msg: &str) {
        tracing::info!(target: STAGE, "{msg}");
    }

    /// Log an informational message.
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    /// Log a debug message. Always written to the log file.
    pub fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    /// Log something a directive would have done outside dry-run mode.
    pub fn dry_run(&self, msg: &str) {
        tracing::info!(target: DRY_RUN, "{msg}");
    }

    /// Record a directive outcome for the summary and note it in the log.
    pub fn record(&self, name: &str, status: RunStatus, message: Option<&str>) {
        match message {
            Some(m) => tracing::debug!(target: DIRECTIVE, "{name}: {} ({m})", status.label()),
            None => tracing::debug!(target: DIRECTIVE, "{name}: {}", status.label()),
        }
        if let Ok(mut guard) = self.entries.lock() {
            guard.push(RunEntry {
                name: name.to_string(),
                status,
                message: message.map(String::from),
            });
        }
    }

    /// `true` if any directive failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }

    /// Number of failed directives. Escalated ones are not failures.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.entries.lock().map_or(0, |guard| {
            guard
                .iter()
                .filter(|e| e.status == RunStatus::Failed)
                .count()
        })
    }

    /// Print one line per recorded directive, then the totals of each
    /// status that occurred.
    pub fn print_summary(&self) {
        let entries = self.entries();
        if entries.is_empty() {
            return;
        }
        self.stage("Summary");

        for entry in &entries {
            let (icon, color) = entry.status.marker();
            let suffix = entry
                .message
                .as_ref()
                .map_or_else(String::new, |msg| format!(" ({msg})"));
            self.info(&format!("{color}{icon} {}{suffix}\x1b[0m", entry.name));
        }

        let totals: Vec<String> = RunStatus::ALL
            .iter()
            .filter_map(|&status| {
                let n = entries.iter().filter(|e| e.status == status).count();
                (n > 0).then(|| {
                    let (_, color) = status.marker();
                    format!("{color}{n} {}\x1b[0m", status.label())
                })
            })
            .collect();
        self.info(&format!("{} directives: {}", entries.len(), totals.join(", ")));

        if let Some(path) = &self.log_file {
            self.info(&format!("\x1b[2mlog: {}\x1b[0m", path.display()));
        }
    }

    /// Log the total run time.
    pub fn print_elapsed(&self, elapsed: Duration) {
        self.info(&format!("finished in {}", format_duration(elapsed)));
    }
}

impl Log for Logger {
    fn stage(&self, msg: &str) {
        Self::stage(self, msg);
    }

    fn info(&self, msg: &str) {
        Self::info(self, msg);
    }

    fn debug(&self, msg: &str) {
        Self::debug(self, msg);
    }

    fn warn(&self, msg: &str) {
        Self::warn(self, msg);
    }

    fn error(&self, msg: &str) {
        Self::error(self, msg);
    }

    fn dry_run(&self, msg: &str) {
        Self::dry_run(self, msg);
    }

    fn record(&self, name: &str, status: RunStatus, message: Option<&str>) {
        Self::record(self, name, status, message);
    }
}
