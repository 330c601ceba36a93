//! Route windows estimated from a student's recent rides.

use tabled::Tabled;

use smarttag_core::{RouteWindow, StudentId};

use crate::cli::{GlobalOpts, RoutesArgs};
use crate::error::CliError;
use crate::output;

use super::util;

const TIME_FORMAT: &str = "%I:%M %p";

#[derive(Tabled)]
struct RouteRow {
    #[tabled(rename = "Route")]
    name: String,
    #[tabled(rename = "Embark Start")]
    embark_start: String,
    #[tabled(rename = "Embark End")]
    embark_end: String,
    #[tabled(rename = "Ride (min)")]
    ride: String,
    #[tabled(rename = "Debark End")]
    debark_end: String,
    #[tabled(rename = "Rides")]
    samples: usize,
}

impl From<&RouteWindow> for RouteRow {
    fn from(w: &RouteWindow) -> Self {
        Self {
            name: w.name.clone(),
            embark_start: w.embark_start.format(TIME_FORMAT).to_string(),
            embark_end: w.embark_end.format(TIME_FORMAT).to_string(),
            ride: format!("{:.2}", w.ride_minutes),
            debark_end: w.debark_end.format(TIME_FORMAT).to_string(),
            samples: w.samples,
        }
    }
}

pub async fn handle(args: RoutesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (_, cfg) = util::load(global)?;
    let id = StudentId::from(util::resolve_student(&cfg, &args.student)?.id.as_str());

    let coordinator = util::build_coordinator(&cfg, global)?;
    let spinner = util::spinner("Fetching recent rides...", global.quiet);
    let windows = coordinator.routes(&id).await;
    spinner.finish_and_clear();
    let windows = windows?;

    if windows.is_empty() {
        if !global.quiet {
            eprintln!("No completed rides found for {id}");
        }
        return Ok(());
    }

    let out = output::render_list(global.output, &windows, |w| RouteRow::from(w), ToString::to_string)?;
    output::print_output(&out, global.quiet);
    Ok(())
}
