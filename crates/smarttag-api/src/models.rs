// Portal wire models
//
// Raw JSON shapes returned by the parent-app backend. Field names follow
// the portal's camelCase (including its `Longtitude` misspelling);
// `smarttag-core` converts these into domain types.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Timestamp format used for ride embark/disembark dates.
pub const PORTAL_DATE_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// A student linked to the parent account (`GET parent/all-students`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalStudent {
    pub id: i64,
    pub full_name: String,
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub campus: String,
    #[serde(default)]
    pub external_id: String,
}

/// A single bus ride (`GET parent/student-activity/{id}`).
///
/// Dates are portal-local wall-clock times. A ride that is still in
/// progress has no disembarkation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    #[serde(rename = "activityId")]
    pub id: i64,
    #[serde(rename = "busName")]
    pub bus: String,
    #[serde(rename = "driverName", default)]
    pub driver: Option<String>,
    #[serde(rename = "friendlyRouteDisplay")]
    pub route_name: String,
    pub route_id: i64,
    #[serde(default)]
    pub shift: Option<String>,

    #[serde(rename = "embarkationDate", with = "portal_date")]
    pub embarked_at: NaiveDateTime,
    #[serde(default)]
    pub embarkation_latitude: Option<f64>,
    #[serde(rename = "embarkationLongtitude", default)]
    pub embarkation_longitude: Option<f64>,

    #[serde(rename = "disembarkationDate", default, with = "portal_date::option")]
    pub disembarked_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub disembarkation_latitude: Option<f64>,
    #[serde(rename = "disembarkationLongtitude", default)]
    pub disembarkation_longitude: Option<f64>,
}

impl Ride {
    /// The student boarded and has not yet been scanned off.
    pub fn in_progress(&self) -> bool {
        self.disembarked_at.is_none()
    }
}

/// Serde adapter for `MM/DD/YYYY HH:MM:SS` timestamps.
pub(crate) mod portal_date {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::PORTAL_DATE_FORMAT;

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.format(PORTAL_DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, PORTAL_DATE_FORMAT).map_err(serde::de::Error::custom)
    }

    /// Nullable variant: `null`, a missing field, and `""` all read as `None`.
    pub mod option {
        use chrono::NaiveDateTime;
        use serde::{Deserialize, Deserializer, Serializer};

        use super::PORTAL_DATE_FORMAT;

        #[allow(clippy::ref_option)]
        pub fn serialize<S: Serializer>(
            value: &Option<NaiveDateTime>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => s.serialize_str(&v.format(PORTAL_DATE_FORMAT).to_string()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<NaiveDateTime>, D::Error> {
            let raw: Option<String> = Option::deserialize(d)?;
            match raw.as_deref().map(str::trim) {
                None | Some("") => Ok(None),
                Some(s) => NaiveDateTime::parse_from_str(s, PORTAL_DATE_FORMAT)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
            }
        }
    }
}
