// ── Bus status, poll outcomes, and per-student records ──
//
// `BusStatus` is the immutable snapshot a successful fetch produces.
// `StudentRecord` is what the coordinator stores per student: the last
// snapshot plus the availability bookkeeping. Both are replaced whole,
// never mutated in place.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use smarttag_api::Ride;

use super::student::StudentId;

// ── BusStatus ───────────────────────────────────────────────────────

/// Point-in-time bus status for one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusStatus {
    pub on_bus: bool,
    pub last_bus: Option<String>,
    pub route: Option<String>,
    pub driver: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub last_embarked_at: Option<DateTime<Utc>>,
    pub last_disembarked_at: Option<DateTime<Utc>>,
}

impl BusStatus {
    /// Status for a student the portal has no rides for.
    pub fn no_rides(fetched_at: DateTime<Utc>) -> Self {
        Self {
            on_bus: false,
            last_bus: None,
            route: None,
            driver: None,
            fetched_at,
            last_embarked_at: None,
            last_disembarked_at: None,
        }
    }

    /// Derive a status from the student's most recent ride.
    pub fn from_latest_ride(ride: Option<&Ride>, fetched_at: DateTime<Utc>) -> Self {
        let Some(ride) = ride else {
            return Self::no_rides(fetched_at);
        };

        Self {
            on_bus: ride.in_progress(),
            last_bus: non_empty(&ride.bus),
            route: non_empty(&ride.route_name),
            driver: ride.driver.as_deref().and_then(non_empty),
            fetched_at,
            last_embarked_at: Some(portal_local_to_utc(ride.embarked_at)),
            last_disembarked_at: ride.disembarked_at.map(portal_local_to_utc),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// Portal dates are wall-clock times in the host's zone.
pub(crate) fn portal_local_to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    match Local.from_local_datetime(&naive).earliest() {
        Some(local) => local.with_timezone(&Utc),
        // Skipped by a DST jump; treat as UTC rather than dropping it.
        None => naive.and_utc(),
    }
}

// ── Failures ────────────────────────────────────────────────────────

/// The three ways a per-student fetch can fail.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// Credentials rejected. Halts the whole integration.
    Auth,
    /// Timeout, connection reset, 5xx. Retried next cycle.
    Network,
    /// Response could not be interpreted.
    Parse,
}

/// A classified fetch failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Auth, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Network, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Parse, message)
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

impl std::error::Error for FetchError {}

// ── PollResult ──────────────────────────────────────────────────────

/// Outcome of fetching one student in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum PollResult {
    Success(BusStatus),
    /// Retriable on the next cycle.
    Transient(FetchError),
    /// Not retriable by polling harder.
    Permanent(FetchError),
}

impl PollResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Permanent(e) if e.kind == FailureKind::Auth)
    }

    pub fn failure(&self) -> Option<&FetchError> {
        match self {
            Self::Success(_) => None,
            Self::Transient(e) | Self::Permanent(e) => Some(e),
        }
    }
}

impl From<Result<BusStatus, FetchError>> for PollResult {
    fn from(result: Result<BusStatus, FetchError>) -> Self {
        match result {
            Ok(status) => Self::Success(status),
            Err(e) if e.kind == FailureKind::Network => Self::Transient(e),
            Err(e) => Self::Permanent(e),
        }
    }
}

// ── Availability ────────────────────────────────────────────────────

/// Coordinator-observed state of one student.
///
/// `pending -> available <-> stale -> unavailable -> available`.
/// Whether polling is enabled is tracked on the [`Student`](super::Student)
/// and overlays every state here.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Availability {
    /// No successful poll yet.
    #[default]
    Pending,
    /// Last cycle succeeded.
    Available,
    /// Recent cycles failed transiently; the snapshot is kept.
    Stale,
    /// Threshold reached, or the portal sent something unreadable.
    Unavailable,
}

impl Availability {
    /// Entities should present their value as current.
    pub fn is_fresh(self) -> bool {
        self == Self::Available
    }
}

// ── StudentRecord ───────────────────────────────────────────────────

/// Everything the coordinator knows about one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub student_id: StudentId,
    pub snapshot: Option<Arc<BusStatus>>,
    pub availability: Availability,
    pub consecutive_failures: u32,
    pub last_failure: Option<FetchError>,
    pub last_success: Option<DateTime<Utc>>,
}

impl StudentRecord {
    pub fn pending(student_id: StudentId) -> Self {
        Self {
            student_id,
            snapshot: None,
            availability: Availability::Pending,
            consecutive_failures: 0,
            last_failure: None,
            last_success: None,
        }
    }

    /// Produce the next record from one cycle's result.
    ///
    /// `threshold` is the number of consecutive transient failures after
    /// which the student becomes unavailable.
    #[must_use]
    pub fn apply(&self, result: &PollResult, threshold: u32) -> Self {
        let mut next = self.clone();
        match result {
            PollResult::Success(status) => {
                next.snapshot = Some(Arc::new(status.clone()));
                next.availability = Availability::Available;
                next.consecutive_failures = 0;
                next.last_failure = None;
                next.last_success = Some(status.fetched_at);
            }
            PollResult::Transient(err) => {
                next.consecutive_failures = self.consecutive_failures.saturating_add(1);
                next.last_failure = Some(err.clone());
                next.availability = if next.consecutive_failures >= threshold.max(1) {
                    Availability::Unavailable
                } else if self.snapshot.is_some() {
                    Availability::Stale
                } else {
                    Availability::Pending
                };
            }
            // Auth halts the integration, not the student: keep what we have.
            PollResult::Permanent(err) if err.kind == FailureKind::Auth => {
                next.last_failure = Some(err.clone());
            }
            PollResult::Permanent(err) => {
                next.consecutive_failures = self.consecutive_failures.saturating_add(1);
                next.last_failure = Some(err.clone());
                next.availability = Availability::Unavailable;
            }
        }
        next
    }
}
