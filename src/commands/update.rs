//! `dotbot update`: update the executable, then the dotfiles repository.
use std::sync::Arc;

use anyhow::Result;

use super::CommandSetup;
use crate::logging::Logger;
use crate::update::{self, Update, repo};

/// Run the `update` command.
///
/// # Errors
///
/// Returns an error if the executable update fails. A failed repository
/// pull is logged and does not fail the command.
pub fn run(log: &Arc<Logger>) -> Result<()> {
    let setup = CommandSetup::init()?;
    match update::self_update(log.as_ref(), &setup.platform, &setup.escalator, false)? {
        Update::Skipped(reason) => log.info(&format!("not updating dotbot: {reason}")),
        Update::UpToDate => log.info(&format!("dotbot {} is up to date", crate::VERSION)),
        Update::Pending(version) => {
            log.info(&format!("dotbot {version} is not fully published yet"));
        }
        Update::NotWritable(path) => {
            log.warn(&format!("cannot replace {}", path.display()));
        }
        Update::Installed(version) => log.info(&format!("installed dotbot {version}")),
    }

    let Some(dir) = setup.state.base_dir() else {
        log.debug("no dotfiles directory set");
        return Ok(());
    };
    if let Err(e) = repo::pull(log.as_ref(), setup.executor.as_ref(), &dir) {
        log.warn(&format!("failed to update dotfiles repository: {e:#}"));
    }
    Ok(())
}
