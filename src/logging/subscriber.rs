//! Tracing subscriber setup: one event classification shared by the console
//! formatter and the persistent log file.
use std::fs;
use std::io::Write as _;
use std::sync::Mutex;

use tracing::Level;

use super::utils::{format_utc_datetime, format_utc_time, log_file_path, strip_ansi};

/// Target of stage headers.
pub(super) const STAGE: &str = "dotbot::stage";
/// Target of dry-run reports.
pub(super) const DRY_RUN: &str = "dotbot::dry_run";
/// Target of per-directive outcomes recorded for the summary.
pub(super) const DIRECTIVE: &str = "dotbot::directive";

/// What an event means to a reader of dotbot's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Stage,
    DryRun,
    Directive,
    Info,
    Debug,
    Warn,
    Error,
}

impl Kind {
    fn of(level: Level, target: &str) -> Self {
        match (level, target) {
            (Level::ERROR, _) => Self::Error,
            (Level::WARN, _) => Self::Warn,
            (_, STAGE) => Self::Stage,
            (_, DRY_RUN) => Self::DryRun,
            (_, DIRECTIVE) => Self::Directive,
            (Level::INFO, _) => Self::Info,
            _ => Self::Debug,
        }
    }

    fn console(self, msg: &str) -> String {
        match self {
            Self::Error => format!("\x1b[31mERROR\x1b[0m {msg}"),
            Self::Warn => format!("\x1b[33mWARN\x1b[0m  {msg}"),
            Self::Stage => format!("\x1b[1;34m==>\x1b[0m \x1b[1m{msg}\x1b[0m"),
            Self::DryRun => format!("  \x1b[33m[DRY RUN]\x1b[0m {msg}"),
            Self::Info => format!("  {msg}"),
            Self::Directive | Self::Debug => format!("  \x1b[2m{msg}\x1b[0m"),
        }
    }

    fn file(self, ts: &str, msg: &str) -> String {
        let tag = match self {
            Self::Stage => return format!("[{ts}] ==> {msg}"),
            Self::Info => return format!("[{ts}]     {msg}"),
            Self::DryRun => "dry run",
            Self::Directive => "directive",
            Self::Debug => "debug",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        format!("[{ts}]     [{tag}] {msg}")
    }
}

/// Pulls the `message` field out of an event.
#[derive(Default)]
struct Message(String);

impl tracing::field::Visit for Message {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.0 = value.to_string();
        }
    }
}

fn classify(event: &tracing::Event<'_>) -> (Kind, String) {
    let metadata = event.metadata();
    let mut message = Message::default();
    event.record(&mut message);
    (Kind::of(*metadata.level(), metadata.target()), message.0)
}

/// Appends every event, without colour, to `$XDG_CACHE_HOME/dotbot/<command>.log`.
#[derive(Debug)]
pub(super) struct FileLayer {
    file: Mutex<fs::File>,
}

impl FileLayer {
    /// Truncate the log for `command` and write the run header. `None` when
    /// the cache directory or file is unavailable.
    pub(super) fn new(command: &str) -> Option<Self> {
        let path = log_file_path(command)?;
        let header = format!("# dotbot {} {command} {}\n", crate::VERSION, format_utc_datetime());
        fs::write(&path, header).ok()?;
        let file = fs::OpenOptions::new().append(true).open(&path).ok()?;
        Some(Self {
            file: Mutex::new(file),
        })
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for FileLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let (kind, msg) = classify(event);
        let line = kind.file(&format_utc_time(), &strip_ansi(&msg));
        if let Ok(mut f) = self.file.lock() {
            writeln!(f, "{line}").ok();
        }
    }
}

/// Console formatter, with or without colour.
struct Console {
    color: bool,
}

impl Console {
    fn line(&self, kind: Kind, msg: &str) -> String {
        let line = kind.console(msg);
        if self.color { line } else { strip_ansi(&line) }
    }
}

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for Console
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let (kind, msg) = classify(event);
        writeln!(writer, "{}", self.line(kind, &msg))
    }
}

/// Install the global subscriber for `command`.
///
/// Warnings and errors go to stderr, everything else to stdout; debug lines
/// reach the console only with `debug`. The log file always gets debug.
pub fn init_subscriber(debug: bool, color: bool, command: &str) {
    use tracing_subscriber::fmt::writer::MakeWriterExt as _;
    use tracing_subscriber::{
        Layer as _, filter::LevelFilter, fmt, layer::SubscriberExt as _,
        util::SubscriberInitExt as _,
    };

    let console_level = if debug { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let make_writer = std::io::stderr
        .with_max_level(Level::WARN)
        .and(std::io::stdout.with_min_level(Level::INFO));

    let console = fmt::layer()
        .event_format(Console { color })
        .with_writer(make_writer)
        .with_filter(console_level);
    let file = FileLayer::new(command).map(|l| l.with_filter(LevelFilter::DEBUG));

    tracing_subscriber::registry().with(console).with(file).init();
}
