// ── Route polling windows ──
//
// Groups a student's recent rides by route and estimates when the bus
// is worth watching: the earliest pickup, the latest pickup plus a
// grace period, the mean ride length, and the latest drop-off plus a
// grace period. Times are portal-local wall-clock times.

use std::fmt;

use chrono::{NaiveTime, TimeDelta};
use indexmap::IndexMap;
use serde::Serialize;
use smarttag_api::Ride;

const EMBARK_GRACE_MINUTES: i64 = 5;
const DEBARK_GRACE_MINUTES: i64 = 10;
const TIME_FORMAT: &str = "%I:%M %p";

/// Estimated activity window for one route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteWindow {
    pub route_id: i64,
    pub name: String,
    pub embark_start: NaiveTime,
    pub embark_end: NaiveTime,
    /// Mean ride duration in minutes.
    pub ride_minutes: f64,
    pub debark_end: NaiveTime,
    /// Completed rides the estimate is based on.
    pub samples: usize,
}

impl fmt::Display for RouteWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "**{}** (Embark start: {} • Embark end: {} • Ride length: {:.2} min • Debark end: {})",
            self.name,
            self.embark_start.format(TIME_FORMAT),
            self.embark_end.format(TIME_FORMAT),
            self.ride_minutes,
            self.debark_end.format(TIME_FORMAT),
        )
    }
}

struct Accumulator {
    route_id: i64,
    name: String,
    embark_start: NaiveTime,
    embark_end: NaiveTime,
    debark_end: NaiveTime,
    mean_secs: f64,
    count: f64,
    samples: usize,
}

impl Accumulator {
    fn new(ride: &Ride) -> Self {
        Self {
            route_id: ride.route_id,
            name: ride.route_name.clone(),
            embark_start: NaiveTime::MIN,
            embark_end: NaiveTime::MIN,
            debark_end: NaiveTime::MIN,
            mean_secs: 0.0,
            count: 0.0,
            samples: 0,
        }
    }

    fn push(&mut self, ride: &Ride, disembarked: chrono::NaiveDateTime) {
        let start = ride.embarked_at.time();
        let embark_end = (ride.embarked_at + TimeDelta::minutes(EMBARK_GRACE_MINUTES)).time();
        let debark_end = (disembarked + TimeDelta::minutes(DEBARK_GRACE_MINUTES)).time();

        if self.samples == 0 {
            self.embark_start = start;
            self.embark_end = embark_end;
            self.debark_end = debark_end;
        } else {
            self.embark_start = self.embark_start.min(start);
            self.embark_end = self.embark_end.max(embark_end);
            self.debark_end = self.debark_end.max(debark_end);
        }

        // Incremental mean; avoids summing large totals.
        let secs = (disembarked - ride.embarked_at).num_seconds();
        let secs = i32::try_from(secs).map_or(0.0, f64::from);
        self.count += 1.0;
        self.mean_secs += (secs - self.mean_secs) / self.count;
        self.samples += 1;
    }

    fn finish(self) -> RouteWindow {
        RouteWindow {
            route_id: self.route_id,
            name: self.name,
            embark_start: self.embark_start,
            embark_end: self.embark_end,
            ride_minutes: self.mean_secs / 60.0,
            debark_end: self.debark_end,
            samples: self.samples,
        }
    }
}

/// Build one window per route, in order of first appearance.
///
/// Rides still in progress are skipped: they have no drop-off yet.
pub fn route_windows(rides: &[Ride]) -> Vec<RouteWindow> {
    let mut by_route: IndexMap<i64, Accumulator> = IndexMap::new();

    for ride in rides {
        let Some(disembarked) = ride.disembarked_at else {
            continue;
        };
        by_route
            .entry(ride.route_id)
            .or_insert_with(|| Accumulator::new(ride))
            .push(ride, disembarked);
    }

    by_route.into_values().map(Accumulator::finish).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ride(route: i64, name: &str, start: &str, end: Option<&str>) -> Ride {
        serde_json::from_value(json!({
            "activityId": 1,
            "busName": "12",
            "friendlyRouteDisplay": name,
            "routeId": route,
            "embarkationDate": start,
            "disembarkationDate": end,
        }))
        .unwrap()
    }

    #[test]
    fn windows_group_by_route() {
        let rides = vec![
            ride(1, "North AM", "09/02/2024 07:10:00", Some("09/02/2024 07:30:00")),
            ride(2, "North PM", "09/02/2024 15:05:00", Some("09/02/2024 15:35:00")),
            ride(1, "North AM", "09/03/2024 07:04:00", Some("09/03/2024 07:34:00")),
        ];

        let windows = route_windows(&rides);
        assert_eq!(windows.len(), 2);

        let am = &windows[0];
        assert_eq!(am.route_id, 1);
        assert_eq!(am.samples, 2);
        assert_eq!(am.embark_start, NaiveTime::from_hms_opt(7, 4, 0).unwrap());
        assert_eq!(am.embark_end, NaiveTime::from_hms_opt(7, 15, 0).unwrap());
        assert_eq!(am.debark_end, NaiveTime::from_hms_opt(7, 44, 0).unwrap());
        assert!((am.ride_minutes - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rides_in_progress_are_skipped() {
        let rides = vec![
            ride(1, "North", "09/02/2024 07:10:00", None),
            ride(2, "South", "09/02/2024 07:10:00", Some("09/02/2024 07:22:30")),
        ];
        let windows = route_windows(&rides);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].name, "South");
        assert!((windows[0].ride_minutes - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn display_matches_picker_text() {
        let rides = vec![ride(
            3,
            "East",
            "09/02/2024 07:05:00",
            Some("09/02/2024 07:17:30"),
        )];
        let text = route_windows(&rides)[0].to_string();
        assert_eq!(
            text,
            "**East** (Embark start: 07:05 AM • Embark end: 07:10 AM • \
             Ride length: 12.50 min • Debark end: 07:27 AM)"
        );
    }

    #[test]
    fn empty_history_has_no_windows() {
        assert!(route_windows(&[]).is_empty());
    }
}
