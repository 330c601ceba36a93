//! Student roster handlers.

use serde::Serialize;
use tabled::Tabled;

use smarttag_config::StudentEntry;
use smarttag_core::DiscoveredStudent;

use crate::cli::{GlobalOpts, StudentsArgs, StudentsCommand};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct TrackedRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Polling")]
    polling: &'static str,
}

impl From<&StudentEntry> for TrackedRow {
    fn from(s: &StudentEntry) -> Self {
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
            polling: if s.enabled { "on" } else { "paused" },
        }
    }
}

#[derive(Serialize)]
struct Discovered {
    #[serde(flatten)]
    student: DiscoveredStudent,
    tracked: bool,
}

#[derive(Tabled)]
struct DiscoveredRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Student")]
    label: String,
    #[tabled(rename = "Campus")]
    campus: String,
    #[tabled(rename = "Tracked")]
    tracked: &'static str,
}

impl From<&Discovered> for DiscoveredRow {
    fn from(d: &Discovered) -> Self {
        Self {
            id: d.student.id.to_string(),
            label: d.student.label(),
            campus: d.student.campus.clone(),
            tracked: if d.tracked { "yes" } else { "" },
        }
    }
}

pub async fn handle(args: StudentsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        StudentsCommand::List => {
            let (_, cfg) = util::load(global)?;
            let out = output::render_list(
                global.output,
                &cfg.students,
                |s| TrackedRow::from(s),
                |s| s.id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        StudentsCommand::Discover => {
            let (_, cfg) = util::load(global)?;
            let found = discover(&cfg, global).await?;
            let rows: Vec<Discovered> = found
                .into_iter()
                .map(|student| Discovered {
                    tracked: cfg.student(student.id.as_str()).is_some(),
                    student,
                })
                .collect();
            let out = output::render_list(global.output, &rows, |d| DiscoveredRow::from(d), |d| {
                d.student.label()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        StudentsCommand::Add { id, name, disabled } => {
            let (path, mut cfg) = util::load(global)?;
            let entry = match name {
                Some(name) => StudentEntry::new(id.clone(), name, !disabled),
                None => discover(&cfg, global)
                    .await?
                    .into_iter()
                    .find(|s| s.id.as_str() == id)
                    .map(|s| StudentEntry::from(&s.into_student().with_enabled(!disabled)))
                    .ok_or_else(|| CliError::NotFound {
                        identifier: id.clone(),
                    })?,
            };

            match cfg.students.iter_mut().find(|s| s.id == id) {
                Some(existing) => *existing = entry,
                None => cfg.students.push(entry),
            }
            smarttag_config::save_config(&cfg, &path)?;

            if !global.quiet {
                eprintln!("Tracking student {id}");
            }
            Ok(())
        }

        StudentsCommand::Remove { student } => {
            let (path, mut cfg) = util::load(global)?;
            let id = util::resolve_student(&cfg, &student)?.id.clone();
            cfg.students.retain(|s| s.id != id);
            smarttag_config::save_config(&cfg, &path)?;

            if !global.quiet {
                eprintln!("Stopped tracking student {id}");
            }
            Ok(())
        }
    }
}

async fn discover(
    cfg: &smarttag_config::Config,
    global: &GlobalOpts,
) -> Result<Vec<DiscoveredStudent>, CliError> {
    let coordinator = util::build_coordinator(cfg, global)?;
    let spinner = util::spinner("Looking up students...", global.quiet);
    let found = coordinator.discover_students().await;
    spinner.finish_and_clear();
    Ok(found?)
}
