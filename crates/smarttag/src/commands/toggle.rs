//! Enable / disable polling for a student.
//!
//! Only the config file changes; a running coordinator picks the flag
//! up at its next start.

use crate::cli::{GlobalOpts, ToggleArgs};
use crate::error::CliError;

use super::util;

pub fn handle(args: &ToggleArgs, enabled: bool, global: &GlobalOpts) -> Result<(), CliError> {
    let (path, mut cfg) = util::load(global)?;
    let student = util::resolve_student(&cfg, &args.student)?;
    let (id, name) = (student.id.clone(), student.name.clone());

    cfg.set_enabled(&id, enabled);
    smarttag_config::save_config(&cfg, &path)?;

    if !global.quiet {
        let verb = if enabled { "resumed" } else { "paused" };
        eprintln!("Polling {verb} for {name} ({id})");
    }
    Ok(())
}
