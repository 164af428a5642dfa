//! Declarative dotfiles and system bootstrapper.
//!
//! A YAML document lists directives (links, packages, shell commands,
//! downloads, git clones, conditionals) that are canonicalized, decoded and
//! run in order. Work that hits a permission error is replayed in an
//! elevated child started with `sudo`.
//!
//! The public API is organised into these layers:
//!
//! - **[`config`]**: load documents, resolve includes, canonicalize shorthand
//! - **[`template`]**: the small template language used in fields and predicates
//! - **[`directives`]**: the directive registry and every built-in directive
//! - **[`resources`]**: idempotent filesystem primitives used by directives
//! - **[`escalation`]**: the `sudo` round trip to an elevated child
//! - **[`update`]**: self-update and dotfiles repository pulls
//! - **[`commands`]**: top-level subcommand orchestration
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod directives;
pub mod error;
pub mod escalation;
pub mod exec;
pub mod http;
pub mod logging;
pub mod platform;
pub mod resources;
pub mod template;
pub mod update;

/// Version reported by `--version` and compared by self-update. Release
/// builds set `DOTBOT_VERSION`; anything else is a development build.
pub const VERSION: &str = match option_env!("DOTBOT_VERSION") {
    Some(version) => version,
    None => concat!("dev-", env!("CARGO_PKG_VERSION")),
};
