//! Shared helpers for command handlers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use smarttag_config::{Config, StudentEntry};
use smarttag_core::{Coordinator, Credentials, CycleReport, FailureKind};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config file path: `--config` flag, else the platform default.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(smarttag_config::config_path)
}

/// Load the config file and environment overrides.
pub fn load(global: &GlobalOpts) -> Result<(PathBuf, Config), CliError> {
    let path = config_path(global);
    let cfg = smarttag_config::load_config(&path)?;
    Ok((path, cfg))
}

/// Build a coordinator for the configured account.
pub fn build_coordinator(cfg: &Config, global: &GlobalOpts) -> Result<Coordinator, CliError> {
    let credentials = smarttag_config::resolve_credentials(&cfg.account)?;
    coordinator_with(cfg, credentials, global)
}

/// Build a coordinator from `cfg` with explicit credentials.
pub fn coordinator_with(
    cfg: &Config,
    credentials: Credentials,
    global: &GlobalOpts,
) -> Result<Coordinator, CliError> {
    let mut config = smarttag_config::to_coordinator_config(cfg, credentials)?;
    if let Some(secs) = global.timeout {
        config.fetch_timeout = Duration::from_secs(secs);
    }
    let client = config.portal_client()?;
    Ok(Coordinator::new(config, Arc::new(client))?)
}

/// Find a tracked student by id, or by name (case-insensitive).
pub fn resolve_student<'a>(cfg: &'a Config, ident: &str) -> Result<&'a StudentEntry, CliError> {
    cfg.student(ident)
        .or_else(|| {
            cfg.students
                .iter()
                .find(|s| s.name.eq_ignore_ascii_case(ident))
        })
        .ok_or_else(|| CliError::NotFound {
            identifier: ident.into(),
        })
}

/// Turn an auth-halted cycle into an error.
pub fn ensure_authorized(report: &CycleReport) -> Result<(), CliError> {
    if !report.auth_failed {
        return Ok(());
    }
    let message = report
        .failed
        .iter()
        .find(|(_, e)| e.kind == FailureKind::Auth)
        .map_or_else(|| "credentials rejected".into(), |(_, e)| e.message.clone());
    Err(CliError::AuthFailed { message })
}

/// Spinner on stderr; hidden in quiet mode.
pub fn spinner(message: &'static str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
