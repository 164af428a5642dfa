//! Core logging types: run entries, status, and the [`Log`] trait.

/// Outcome of one directive for summary reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEntry {
    /// Directive keyword (`link`, `shell`, ...).
    pub name: String,
    /// Final status of the directive.
    pub status: RunStatus,
    /// Short description of what the directive covers, or the error.
    pub message: Option<String>,
}

/// Status of a finished directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Directive completed successfully.
    Ok,
    /// Directive is disabled on this host (`enabled()` returned false).
    NotApplicable,
    /// Directive reported its intended actions without applying them.
    DryRun,
    /// Directive hit a permission error and an elevated child completed it.
    Escalated,
    /// Directive failed.
    Failed,
}

impl RunStatus {
    /// Every status, in summary order.
    pub const ALL: [Self; 5] = [
        Self::Ok,
        Self::NotApplicable,
        Self::DryRun,
        Self::Escalated,
        Self::Failed,
    ];

    /// Word used in the summary totals.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::NotApplicable => "n/a",
            Self::DryRun => "dry-run",
            Self::Escalated => "escalated",
            Self::Failed => "failed",
        }
    }

    /// Summary icon and its colour.
    #[must_use]
    pub const fn marker(self) -> (&'static str, &'static str) {
        match self {
            Self::Ok => ("✓", "\x1b[32m"),
            Self::NotApplicable => ("·", "\x1b[2m"),
            Self::DryRun => ("~", "\x1b[37m"),
            Self::Escalated => ("↑", "\x1b[36m"),
            Self::Failed => ("✗", "\x1b[31m"),
        }
    }
}

/// Abstraction over logging backends.
///
/// Directive code logs through this trait so tests can capture output and
/// recorded entries without a global subscriber.
pub trait Log: Send + Sync {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (shown on the console only with `--debug`).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Log an action that would have been taken outside dry-run mode.
    fn dry_run(&self, msg: &str);
    /// Record a directive result for the summary.
    fn record(&self, name: &str, status: RunStatus, message: Option<&str>);
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn every_status_has_a_distinct_label() {
        let labels: std::collections::HashSet<_> =
            RunStatus::ALL.iter().map(|s| s.label()).collect();
        assert_eq!(labels.len(), RunStatus::ALL.len());
        assert_eq!(RunStatus::Failed.marker().0, "✗");
    }

    #[test]
    fn run_entry_clone() {
        let entry = RunEntry {
            name: "link".to_string(),
            status: RunStatus::Ok,
            message: Some("~/.bashrc -> bashrc".to_string()),
        };
        assert_eq!(entry.clone(), entry);
    }
}
