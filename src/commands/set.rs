//! `dotbot set`: write one key of the state file.
use std::sync::Arc;

use anyhow::Result;

use super::CommandSetup;
use crate::cli::SetOpts;
use crate::config::State;
use crate::config::state::DIRECTORY_KEY;
use crate::logging::Logger;

/// Run the `set` command.
///
/// # Errors
///
/// Returns an error if the state file cannot be read or written.
pub fn run(opts: &SetOpts, log: &Arc<Logger>) -> Result<()> {
    let mut setup = CommandSetup::init()?;
    set(&mut setup.state, &opts.key, &opts.value)?;
    log.info(&format!("{} = {}", opts.key, opts.value));
    Ok(())
}

/// Store `value` under `key` and save. The dotfiles directory is stored as
/// an absolute path.
///
/// # Errors
///
/// Returns an error if the state cannot be saved.
pub fn set(state: &mut State, key: &str, value: &str) -> Result<()> {
    if key == DIRECTORY_KEY && !value.is_empty() {
        let dir = std::path::absolute(value)?;
        state.set_save(key, &dir.display().to_string())?;
    } else {
        state.set_save(key, value)?;
    }
    Ok(())
}
