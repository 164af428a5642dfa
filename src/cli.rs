use std::io::IsTerminal as _;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Top-level CLI entry point.
#[derive(Parser, Debug)]
#[command(
    name = "dotbot",
    about = "A bootstrapping utility for your dotfiles and system",
    version = crate::VERSION
)]
pub struct Cli {
    /// Defaults to `run` with no arguments.
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Flags accepted by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Run only these groups (repeatable, comma-separated)
    #[arg(short, long = "group", global = true, value_delimiter = ',')]
    pub groups: Vec<String>,

    /// Report what would change without changing anything
    #[arg(long, global = true, env = "DRY_RUN")]
    pub dry_run: bool,

    /// Show debug output on the console
    #[arg(long, global = true)]
    pub debug: bool,

    /// When to use colors
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Document to run instead of the one in the dotfiles directory
    #[arg(long, global = true, env = "DOTBOT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// `--color` values.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColorChoice {
    /// Color when stdout is a terminal and `NO_COLOR` is unset.
    #[default]
    Auto,
    /// Always color.
    Always,
    /// Never color.
    Never,
}

impl ColorChoice {
    /// Resolve `auto` against the current stdout.
    #[must_use]
    pub fn enabled(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal(),
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the document, a document from stdin, or a single directive
    Run(RunOpts),
    /// Clone a dotfiles repository and make it the dotfiles directory
    Init(InitOpts),
    /// Set a value in the state file
    Set(SetOpts),
    /// Run `git status` in the dotfiles directory
    Status,
    /// Run `git diff` in the dotfiles directory
    Diff,
    /// Update dotbot and the dotfiles repository
    Update,
    /// Download files, optionally making them executable
    Download(DownloadOpts),
}

impl Command {
    /// Name used for the log file.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Run(_) => "run",
            Self::Init(_) => "init",
            Self::Set(_) => "set",
            Self::Status => "status",
            Self::Diff => "diff",
            Self::Update => "update",
            Self::Download(_) => "download",
        }
    }
}

/// Options for the `run` subcommand.
#[derive(Parser, Debug, Clone, Default)]
pub struct RunOpts {
    /// Read the document from standard input
    #[arg(long)]
    pub stdin: bool,

    /// Directive to run on its own, or `template` to render a template
    pub directive: Option<String>,

    /// `key=value` fields of the directive, or the template text
    pub args: Vec<String>,
}

/// Options for the `init` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct InitOpts {
    /// `owner` or `owner/repo` on GitHub; the repo defaults to `dotfiles`
    pub repo: String,

    /// Run the document right after cloning
    #[arg(long)]
    pub apply: bool,
}

/// Options for the `set` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct SetOpts {
    /// State key, e.g. `directory`
    pub key: String,

    /// New value
    pub value: String,
}

/// Options for the `download` subcommand.
#[derive(Parser, Debug, Clone, Default)]
pub struct DownloadOpts {
    /// URLs to fetch; read from stdin when none are given
    pub urls: Vec<String>,

    /// Make downloaded files executable
    #[arg(short = 'x', long)]
    pub executable: bool,

    /// Overwrite existing files
    #[arg(short, long)]
    pub force: bool,

    /// Destination per URL, in order; the rest go to the working directory
    #[arg(short, long = "output", value_delimiter = ',')]
    pub outputs: Vec<PathBuf>,
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_run() {
        let cli = Cli::parse_from(["dotbot"]);
        assert!(cli.command.is_none());
        assert!(cli.global.groups.is_empty());
    }

    #[test]
    fn groups_are_repeatable_and_comma_separated() {
        let cli = Cli::parse_from(["dotbot", "-g", "base,desktop", "--group", "work"]);
        assert_eq!(cli.global.groups, ["base", "desktop", "work"]);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["dotbot", "run", "--dry-run", "--debug", "--color", "never"]);
        assert!(cli.global.dry_run);
        assert!(cli.global.debug);
        assert_eq!(cli.global.color, ColorChoice::Never);
        assert!(!cli.global.color.enabled());
    }

    #[test]
    fn run_single_directive() {
        let cli = Cli::parse_from(["dotbot", "run", "link", "path=~/.vimrc", "source=vimrc"]);
        assert!(matches!(&cli.command, Some(Command::Run(_))), "Expected Run command");
        if let Some(Command::Run(opts)) = cli.command {
            assert_eq!(opts.directive.as_deref(), Some("link"));
            assert_eq!(opts.args, ["path=~/.vimrc", "source=vimrc"]);
            assert!(!opts.stdin);
        }
    }

    #[test]
    fn run_stdin() {
        let cli = Cli::parse_from(["dotbot", "run", "--stdin"]);
        assert!(matches!(cli.command, Some(Command::Run(RunOpts { stdin: true, .. }))));
    }

    #[test]
    fn init_with_apply() {
        let cli = Cli::parse_from(["dotbot", "init", "someone", "--apply"]);
        assert!(matches!(&cli.command, Some(Command::Init(_))), "Expected Init command");
        if let Some(Command::Init(opts)) = cli.command {
            assert_eq!(opts.repo, "someone");
            assert!(opts.apply);
        }
    }

    #[test]
    fn download_flags() {
        let cli = Cli::parse_from([
            "dotbot", "download", "-x", "-f", "-o", "/tmp/a,/tmp/b", "https://x.io/a",
        ]);
        assert!(
            matches!(&cli.command, Some(Command::Download(_))),
            "Expected Download command"
        );
        if let Some(Command::Download(opts)) = cli.command {
            assert!(opts.executable);
            assert!(opts.force);
            assert_eq!(opts.outputs, [PathBuf::from("/tmp/a"), PathBuf::from("/tmp/b")]);
            assert_eq!(opts.urls, ["https://x.io/a"]);
        }
    }

    #[test]
    fn simple_subcommands() {
        assert!(matches!(Cli::parse_from(["dotbot", "status"]).command, Some(Command::Status)));
        assert!(matches!(Cli::parse_from(["dotbot", "diff"]).command, Some(Command::Diff)));
        assert!(matches!(Cli::parse_from(["dotbot", "update"]).command, Some(Command::Update)));
        let cli = Cli::parse_from(["dotbot", "set", "directory", "/home/me/dots"]);
        assert!(matches!(cli.command, Some(Command::Set(SetOpts { ref key, .. })) if key == "directory"));
    }
}
