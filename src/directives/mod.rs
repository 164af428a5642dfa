//! Directive trait, ordered directive lists and every built-in directive.
//!
//! A directive is decoded from the canonical form of its document node (see
//! [`crate::config::canonical`]) and run once per run. Failures are recorded
//! per directive and never stop the directives after it.
pub mod clean;
pub mod conditional;
pub mod context;
pub mod create;
pub mod download;
pub mod extract;
pub mod git;
pub mod group;
pub mod install;
pub mod link;
pub mod package;
pub mod registry;
pub mod shell;
pub mod vars;

use serde::Serialize;

pub use context::Context;
pub use registry::Registry;

use crate::config::canonical::Shape;
use crate::config::{Node, encode, pair};
use crate::error::{ConfigError, DirectiveError, is_permission_denied};
use crate::escalation::Envelope;
use crate::logging::RunStatus;

/// A decoded, runnable directive.
pub trait Directive: std::fmt::Debug {
    /// Whether the directive applies on this host.
    fn enabled(&self, _ctx: &Context) -> bool {
        true
    }

    /// Run every entry of the directive.
    ///
    /// # Errors
    ///
    /// Returns a [`DirectiveError`]; [`DirectiveError::PermissionDenied`]
    /// makes the list retry the denied entries elevated.
    fn run_all(&self, ctx: &Context) -> Result<(), DirectiveError>;

    /// Short summary for the run report.
    fn describe(&self) -> Option<String> {
        None
    }

    /// Re-serialize to canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Decode`] if a value cannot be represented.
    fn to_node(&self) -> Result<Node, ConfigError>;
}

/// A directive type that can be registered by name.
pub trait Decode: Directive + Sized + 'static {
    /// Keyword in the document.
    const NAME: &'static str;
    /// Canonical shape of the directive body.
    const SHAPE: &'static Shape;
    /// Entry fields that hold nested directive lists.
    const LISTS: &'static [&'static str] = &[];

    /// Build the directive from its canonical body.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the body does not match the directive.
    fn decode(registry: &Registry, node: Node) -> Result<Self, ConfigError>;
}

/// Totals of one [`DirectiveList::run_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Directives in the list.
    pub total: usize,
    /// Directives that failed.
    pub failed: usize,
}

/// Ordered `(name, directive)` pairs in document order.
#[derive(Debug, Default)]
pub struct DirectiveList {
    entries: Vec<(String, Box<dyn Directive>)>,
}

impl DirectiveList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a directive.
    pub fn push(&mut self, name: impl Into<String>, directive: Box<dyn Directive>) {
        self.entries.push((name.into(), directive));
    }

    /// Number of directives.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if the list holds no directives.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Directive names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Run every directive in order, recording each result.
    pub fn run_all(&self, ctx: &Context) -> RunOutcome {
        let mut outcome = RunOutcome {
            total: self.entries.len(),
            failed: 0,
        };

        for (name, directive) in &self.entries {
            let summary = directive.describe();
            if !directive.enabled(ctx) {
                ctx.log.debug(&format!("{name}: not applicable"));
                ctx.log
                    .record(name, RunStatus::NotApplicable, summary.as_deref());
                continue;
            }

            let result = match directive.run_all(ctx) {
                Ok(()) => Finished::Done,
                Err(DirectiveError::PermissionDenied {
                    batch,
                    denied,
                    failed,
                }) => escalate(ctx, name, batch, denied, failed),
                Err(e) => {
                    let message = format!("{e:#}");
                    ctx.log.error(&format!("{name}: {message}"));
                    Finished::Failed(message)
                }
            };

            match result {
                Finished::Done if ctx.dry_run => {
                    ctx.log.record(name, RunStatus::DryRun, summary.as_deref());
                }
                Finished::Done => ctx.log.record(name, RunStatus::Ok, summary.as_deref()),
                Finished::Escalated => {
                    ctx.log.record(name, RunStatus::Escalated, summary.as_deref());
                }
                Finished::Failed(message) => {
                    outcome.failed += 1;
                    ctx.log.record(name, RunStatus::Failed, Some(&message));
                }
            }
        }

        if outcome.failed > 0 {
            ctx.log.error(&format!(
                "{} of {} directives failed",
                outcome.failed, outcome.total
            ));
        }
        outcome
    }

    /// Re-serialize the list as `[{name: body}, ...]`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Decode`] if a directive cannot be represented.
    pub fn to_node(&self) -> Result<Node, ConfigError> {
        self.entries
            .iter()
            .map(|(name, d)| Ok(pair(name.as_str(), d.to_node()?)))
            .collect::<Result<Vec<_>, ConfigError>>()
            .map(Node::Sequence)
    }
}

/// How one directive ended.
enum Finished {
    Done,
    Escalated,
    Failed(String),
}

/// Retry the denied entries in an elevated child.
fn escalate(
    ctx: &Context,
    name: &str,
    batch: Node,
    denied: usize,
    failed: usize,
) -> Finished {
    let noun = if denied == 1 { "entry" } else { "entries" };
    let envelope = Envelope::single(name, batch, ctx.vars.snapshot());
    ctx.log
        .info(&format!("{name}: permission denied, retrying {denied} {noun} with sudo"));
    match ctx
        .escalator
        .escalate(&ctx.platform, ctx.executor.as_ref(), &envelope)
    {
        Ok(()) if failed == 0 => Finished::Escalated,
        Ok(()) => {
            let message = format!("{failed} entries failed");
            ctx.log.error(&format!("{name}: {message}"));
            Finished::Failed(message)
        }
        Err(e) => {
            let message = format!("permission denied for {denied} {noun}: {e}");
            ctx.log.error(&format!("{name}: {message}"));
            Finished::Failed(message)
        }
    }
}

/// Default for boolean fields that are on unless disabled.
pub(crate) const fn default_true() -> bool {
    true
}

/// Run `run` on every entry. Entries failing with a permission error are
/// collected into a [`DirectiveError::PermissionDenied`] batch; other
/// failures are logged and counted.
///
/// # Errors
///
/// [`DirectiveError::PermissionDenied`] if any entry was denied, otherwise
/// [`DirectiveError::Entries`] if any entry failed.
pub fn run_entries<E: Serialize>(
    ctx: &Context,
    name: &str,
    entries: &[E],
    mut run: impl FnMut(&E) -> anyhow::Result<()>,
) -> Result<(), DirectiveError> {
    let mut denied = Vec::new();
    let mut failed = 0;
    for entry in entries {
        let Err(e) = run(entry) else { continue };
        if is_permission_denied(&e) {
            ctx.log.debug(&format!("{name}: {e:#}"));
            denied.push(encode(name, entry).map_err(anyhow::Error::from)?);
        } else {
            ctx.log.error(&format!("{name}: {e:#}"));
            failed += 1;
        }
    }
    if !denied.is_empty() {
        return Err(DirectiveError::PermissionDenied {
            denied: denied.len(),
            batch: Node::Sequence(denied),
            failed,
        });
    }
    if failed > 0 {
        return Err(DirectiveError::Entries {
            failed,
            total: entries.len(),
        });
    }
    Ok(())
}

/// Join `items` for a summary, eliding after a few.
pub(crate) fn summarize<'a>(items: impl IntoIterator<Item = &'a str>) -> Option<String> {
    const SHOWN: usize = 3;
    let items: Vec<&str> = items.into_iter().collect();
    match items.len() {
        0 => None,
        n if n <= SHOWN => Some(items.join(", ")),
        n => Some(format!(
            "{}, +{} more",
            items.iter().take(SHOWN).copied().collect::<Vec<_>>().join(", "),
            n - SHOWN
        )),
    }
}
