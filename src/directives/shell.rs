//! `shell`: run commands, optionally through `sudo`.
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use super::{Context, Decode, Directive, Registry, default_true, run_entries, summarize};
use crate::config::canonical::{Shape, Transform};
use crate::config::{Node, decode, encode};
use crate::error::{ConfigError, DirectiveError};
use crate::exec::{Attach, Invocation};

/// Canonical form of `shell`: a command string or a list of entries.
pub const SHELL: Shape = Shape {
    name: "shell",
    key: None,
    fields: &[
        "desc", "command", "shell", "stdin", "stdout", "stderr", "sudo", "try_sudo", "capture",
    ],
    list: &[Transform::EnsureList],
    entry: &[Transform::ScalarToMap("command")],
    nested: &[],
};

/// A lone shell entry, as nested under `install`.
pub const SHELL_ENTRY: Shape = Shape {
    name: "shell",
    key: None,
    fields: SHELL.fields,
    list: &[],
    entry: SHELL.entry,
    nested: &[],
};

/// A command line and how to run it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellEntry {
    /// Shown instead of the command; `"false"` hides the entry.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub desc: String,
    /// Command text.
    pub command: String,
    /// Run through the platform shell instead of splitting into words.
    #[serde(default = "default_true")]
    pub shell: bool,
    /// Share standard input.
    #[serde(default = "default_true")]
    pub stdin: bool,
    /// Share standard output.
    #[serde(default = "default_true")]
    pub stdout: bool,
    /// Share standard error.
    #[serde(default = "default_true")]
    pub stderr: bool,
    /// Run through `sudo`; fails when it is unavailable.
    #[serde(default)]
    pub sudo: bool,
    /// Run through `sudo` when available.
    #[serde(default)]
    pub try_sudo: bool,
    /// Store the output in `Stdout` and `Stderr`.
    #[serde(default)]
    pub capture: bool,
}

impl ShellEntry {
    /// Entry for `command` with every other field at its default.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            desc: String::new(),
            command: command.into(),
            shell: true,
            stdin: true,
            stdout: true,
            stderr: true,
            sudo: false,
            try_sudo: false,
            capture: false,
        }
    }
}

/// The `shell` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell {
    /// Commands in document order.
    pub entries: Vec<ShellEntry>,
}

impl Decode for Shell {
    const NAME: &'static str = "shell";
    const SHAPE: &'static Shape = &SHELL;

    fn decode(_: &Registry, node: Node) -> Result<Self, ConfigError> {
        Ok(Self {
            entries: decode(Self::NAME, node)?,
        })
    }
}

impl Directive for Shell {
    fn run_all(&self, ctx: &Context) -> Result<(), DirectiveError> {
        run_entries(ctx, Self::NAME, &self.entries, |entry| run_command(ctx, entry))
    }

    fn describe(&self) -> Option<String> {
        summarize(self.entries.iter().map(|e| {
            if e.desc.is_empty() || e.desc == "false" {
                first_line(&e.command)
            } else {
                e.desc.as_str()
            }
        }))
    }

    fn to_node(&self) -> Result<Node, ConfigError> {
        encode(Self::NAME, &self.entries)
    }
}

fn first_line(command: &str) -> &str {
    command.lines().next().unwrap_or_default().trim()
}

/// Elide everything after the first line.
fn short(command: &str) -> String {
    let line = first_line(command);
    if line == command.trim() {
        line.to_string()
    } else {
        format!("{line}...")
    }
}

fn wants_sudo(ctx: &Context, entry: &ShellEntry) -> Result<bool> {
    if ctx.platform.is_root || !(entry.sudo || entry.try_sudo) {
        return Ok(false);
    }
    if ctx.can_sudo() {
        Ok(true)
    } else if entry.try_sudo {
        Ok(false)
    } else {
        bail!("unable to sudo")
    }
}

fn run_command(ctx: &Context, entry: &ShellEntry) -> Result<()> {
    let command = ctx.render(&entry.command)?;
    let elevate = wants_sudo(ctx, entry)?;

    if entry.desc != "false" {
        let verb = if elevate { "running (sudo)" } else { "running" };
        if entry.desc.is_empty() {
            ctx.report(&format!("{verb} {}", short(&command)));
        } else {
            ctx.report(&format!("{verb} {} '{}'", ctx.render(&entry.desc)?, short(&command)));
        }
    }
    if ctx.dry_run {
        return Ok(());
    }

    let invocation = if entry.shell {
        Invocation::shell(&ctx.platform.default_shell(), &command)
    } else {
        Invocation::split(&command)?
    }
    .sudo_if(elevate);

    if entry.capture {
        let result = ctx
            .executor
            .run_unchecked(&invocation.program, &invocation.arg_refs())?;
        ctx.vars.set("Stdout", result.stdout.clone());
        ctx.vars.set("Stderr", result.stderr.clone());
        if entry.stdout && !result.stdout.trim().is_empty() {
            ctx.log.info(result.stdout.trim_end());
        }
        if entry.stderr && !result.stderr.trim().is_empty() {
            ctx.log.warn(result.stderr.trim_end());
        }
        invocation.check(result)?;
    } else {
        let attach = Attach {
            stdin: entry.stdin || elevate,
            stdout: entry.stdout,
            stderr: entry.stderr,
        };
        invocation.run_attached(ctx.executor.as_ref(), attach)?;
    }
    Ok(())
}
