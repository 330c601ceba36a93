//! Status command: one poll cycle, then a row per student.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tabled::Tabled;

use smarttag_core::{Availability, Student, StudentId, StudentRecord};

use crate::cli::{GlobalOpts, StatusArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Serialize)]
struct StudentStatus {
    id: StudentId,
    name: String,
    enabled: bool,
    availability: Availability,
    on_bus: Option<bool>,
    last_bus: Option<String>,
    route: Option<String>,
    driver: Option<String>,
    last_updated: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl StudentStatus {
    fn new(student: &Student, record: Option<&StudentRecord>) -> Self {
        let snapshot = record.and_then(|r| r.snapshot.as_deref());
        Self {
            id: student.id.clone(),
            name: student.name.clone(),
            enabled: student.enabled,
            availability: record.map(|r| r.availability).unwrap_or_default(),
            on_bus: snapshot.map(|s| s.on_bus),
            last_bus: snapshot.and_then(|s| s.last_bus.clone()),
            route: snapshot.and_then(|s| s.route.clone()),
            driver: snapshot.and_then(|s| s.driver.clone()),
            last_updated: snapshot.map(|s| s.fetched_at),
            last_error: record
                .and_then(|r| r.last_failure.as_ref())
                .map(ToString::to_string),
        }
    }
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Student")]
    name: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Polling")]
    polling: &'static str,
    #[tabled(rename = "On Bus")]
    on_bus: String,
    #[tabled(rename = "Bus")]
    bus: String,
    #[tabled(rename = "Route")]
    route: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

fn to_row(s: &StudentStatus, color: bool) -> StatusRow {
    StatusRow {
        name: s.name.clone(),
        id: s.id.to_string(),
        polling: if s.enabled { "on" } else { "paused" },
        on_bus: output::on_bus_cell(s.on_bus, color),
        bus: s.last_bus.clone().unwrap_or_else(|| "-".into()),
        route: s.route.clone().unwrap_or_else(|| "-".into()),
        status: s.availability.to_string(),
        updated: s.last_updated.map_or_else(
            || "-".into(),
            |t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
        ),
    }
}

fn to_line(s: &StudentStatus) -> String {
    let on_bus = match s.on_bus {
        Some(true) => "on",
        Some(false) => "off",
        None => "unknown",
    };
    format!(
        "{}\t{on_bus}\t{}\t{}",
        s.id,
        s.last_bus.as_deref().unwrap_or("-"),
        s.route.as_deref().unwrap_or("-"),
    )
}

pub async fn handle(args: StatusArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (_, mut cfg) = util::load(global)?;
    if let Some(ref ident) = args.student {
        let id = util::resolve_student(&cfg, ident)?.id.clone();
        cfg.students.retain(|s| s.id == id);
    }

    let coordinator = util::build_coordinator(&cfg, global)?;
    let spinner = util::spinner("Checking the portal...", global.quiet);
    let report = coordinator.refresh().await;
    spinner.finish_and_clear();
    util::ensure_authorized(&report?)?;

    let rows: Vec<StudentStatus> = coordinator
        .registry()
        .list()
        .iter()
        .map(|s| StudentStatus::new(s, coordinator.record(&s.id).as_deref()))
        .collect();

    let color = output::should_color();
    let out = output::render_list(global.output, &rows, |s| to_row(s, color), to_line)?;
    output::print_output(&out, global.quiet);
    Ok(())
}
