//! Foreground polling loop that streams entity updates until Ctrl-C.
//!
//! The config file is re-read periodically, so `smarttag enable` and
//! `smarttag disable` reach a running loop at its next cycle.

use std::path::Path;
use std::time::Duration;

use chrono::Local;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use smarttag_config::Config;
use smarttag_core::{Coordinator, EntityUpdate, IntegrationState, StudentId, spawn_entity_bridge};

use crate::cli::{GlobalOpts, OutputFormat, RunArgs};
use crate::error::CliError;
use crate::output;

use super::util;

/// How often the config file is checked for polling flag changes.
const FLAG_RELOAD_INTERVAL: Duration = Duration::from_secs(15);

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (path, mut cfg) = util::load(global)?;
    if let Some(secs) = args.interval {
        cfg.polling.interval_secs = secs;
    }
    if cfg.polling.interval_secs == 0 {
        return Err(CliError::Validation {
            field: "interval".into(),
            reason: "must be at least 1 second for `run`".into(),
        });
    }

    let coordinator = util::build_coordinator(&cfg, global)?;
    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let bridge = spawn_entity_bridge(&coordinator, update_tx, cancel.clone());

    let result = match coordinator.start().await {
        Ok(report) => {
            info!(
                students = report.polled.len(),
                every = %humantime::format_duration(Duration::from_secs(cfg.polling.interval_secs)),
                "polling started"
            );
            match util::ensure_authorized(&report) {
                Ok(()) => event_loop(&coordinator, &cfg, &path, &mut update_rx, global).await,
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e.into()),
    };

    cancel.cancel();
    coordinator.shutdown().await;
    let _ = bridge.await;
    result
}

async fn event_loop(
    coordinator: &Coordinator,
    cfg: &Config,
    path: &Path,
    update_rx: &mut mpsc::UnboundedReceiver<EntityUpdate>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut state = coordinator.watch_state();
    let mut reload = tokio::time::interval(FLAG_RELOAD_INTERVAL);
    reload.set_missed_tick_behavior(MissedTickBehavior::Delay);
    reload.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                return Ok(());
            }
            update = update_rx.recv() => {
                let Some(update) = update else { return Ok(()) };
                output::print_output(&render_update(&update, global.output)?, global.quiet);
            }
            changed = state.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = *state.borrow_and_update();
                if current == IntegrationState::ReauthRequired {
                    warn!("portal rejected credentials; signing in again");
                    let credentials = smarttag_config::resolve_credentials(&cfg.account)?;
                    coordinator.reauthenticate(credentials).await?;
                }
            }
            _ = reload.tick() => match smarttag_config::load_config(path) {
                Ok(latest) => {
                    for (id, enabled) in apply_flags(coordinator, &latest) {
                        info!(student = %id, enabled, "polling flag changed in config");
                    }
                }
                Err(e) => warn!(error = %e, "config reload failed; keeping current flags"),
            },
        }
    }
}

/// Copy the config file's polling flags onto tracked students.
/// Returns the flags that changed; each takes effect next cycle.
fn apply_flags(coordinator: &Coordinator, cfg: &Config) -> Vec<(StudentId, bool)> {
    cfg.students
        .iter()
        .filter_map(|entry| {
            let id = StudentId::from(entry.id.as_str());
            match coordinator.set_enabled(&id, entry.enabled) {
                Ok(true) => Some((id, entry.enabled)),
                Ok(false) => None,
                Err(e) => {
                    debug!(student = %id, error = %e, "config lists an untracked student");
                    None
                }
            }
        })
        .collect()
}

fn render_update(update: &EntityUpdate, format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact => Ok(serde_json::to_string(update)?),
        OutputFormat::Yaml => Ok(format!("---\n{}", serde_yaml::to_string(update)?)),
        OutputFormat::Table | OutputFormat::Plain => {
            let at = Local::now().format("%H:%M:%S");
            Ok(match update {
                EntityUpdate::Added(d) => format!("{at} added    {} = {}", d.name, d.state.value),
                EntityUpdate::Changed(d) => format!("{at} changed  {} = {}", d.name, d.state.value),
                EntityUpdate::Removed { unique_id, .. } => format!("{at} removed  {unique_id}"),
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use secrecy::SecretString;
    use smarttag_config::StudentEntry;
    use smarttag_core::{Credentials, Student};

    use super::*;

    fn coordinator_for(cfg: &Config) -> Coordinator {
        let credentials =
            Credentials::new("parent@example.com", SecretString::from("hunter2".to_owned()));
        let config = smarttag_config::to_coordinator_config(cfg, credentials).unwrap();
        let client = config.portal_client().unwrap();
        Coordinator::new(config, Arc::new(client)).unwrap()
    }

    #[test]
    fn config_flags_reach_a_running_coordinator() {
        let mut cfg = Config::default();
        cfg.sync_students(&[Student::new("1001", "Sam"), Student::new("1002", "Alex")]);
        let coordinator = coordinator_for(&cfg);

        assert!(cfg.set_enabled("1002", false));
        cfg.students.push(StudentEntry::new("9999", "Unknown", false));

        assert_eq!(
            apply_flags(&coordinator, &cfg),
            vec![(StudentId::from("1002"), false)]
        );
        assert!(apply_flags(&coordinator, &cfg).is_empty());
        assert_eq!(coordinator.registry().enabled_ids(), vec![StudentId::from("1001")]);
    }

    #[test]
    fn removed_update_renders_as_json_line() {
        let update = EntityUpdate::Removed {
            unique_id: "1001_presence".into(),
            student_id: "1001".into(),
        };
        let line = render_update(&update, OutputFormat::JsonCompact).unwrap();
        assert_eq!(
            line,
            r#"{"event":"removed","unique_id":"1001_presence","student_id":"1001"}"#
        );
        assert!(
            render_update(&update, OutputFormat::Plain)
                .unwrap()
                .ends_with("removed  1001_presence")
        );
    }
}
