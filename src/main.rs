use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use dotbot::cli::{Cli, Command, RunOpts};
use dotbot::commands;
use dotbot::commands::git::View;
use dotbot::logging::{self, Logger};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = Cli::parse();
    let command = args.command.unwrap_or_else(|| Command::Run(RunOpts::default()));
    logging::init_subscriber(args.global.debug, args.global.color.enabled(), command.name());
    let log = Arc::new(Logger::new(command.name()));

    match command {
        Command::Run(opts) => commands::run::run(&args.global, &opts, &log),
        Command::Init(opts) => commands::init::run(&args.global, &opts, &log),
        Command::Set(opts) => commands::set::run(&opts, &log),
        Command::Status => commands::git::run(View::Status),
        Command::Diff => commands::git::run(View::Diff),
        Command::Update => commands::update::run(&log),
        Command::Download(opts) => commands::download::run(&args.global, &opts, &log),
    }
}
