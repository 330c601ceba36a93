// ── Student identity and roster types ──

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use smarttag_api::PortalStudent;

// ── StudentId ───────────────────────────────────────────────────────

/// Opaque student key issued by the portal.
///
/// The portal hands out integers today; stored as a string so config
/// files and entity ids never depend on that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(String);

impl StudentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StudentId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().to_owned()))
    }
}

impl From<&str> for StudentId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for StudentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<i64> for StudentId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

// ── Student ─────────────────────────────────────────────────────────

/// A tracked student, owned by the [`Registry`](crate::Registry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    /// Display name.
    pub name: String,
    /// Polling switch. Disabled students are never fetched.
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campus: Option<String>,
    /// District-issued id printed on the student's tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

impl Student {
    pub fn new(id: impl Into<StudentId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            grade: None,
            campus: None,
            external_id: None,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

// ── DiscoveredStudent ───────────────────────────────────────────────

/// A roster entry returned by discovery, before it is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredStudent {
    pub id: StudentId,
    pub name: String,
    pub grade: String,
    pub campus: String,
    pub external_id: String,
}

impl DiscoveredStudent {
    /// Picker label, e.g. `Sam Rider (4) #E-77`.
    pub fn label(&self) -> String {
        format!("{} ({}) #{}", self.name, self.grade, self.external_id)
    }

    /// Start tracking this student with polling enabled.
    pub fn into_student(self) -> Student {
        Student {
            grade: non_blank(self.grade),
            campus: non_blank(self.campus),
            external_id: non_blank(self.external_id),
            ..Student::new(self.id, self.name)
        }
    }
}

fn non_blank(s: String) -> Option<String> {
    if s.trim().is_empty() { None } else { Some(s) }
}

impl From<PortalStudent> for DiscoveredStudent {
    fn from(s: PortalStudent) -> Self {
        Self {
            id: StudentId::from(s.id),
            name: s.full_name,
            grade: s.grade,
            campus: s.campus,
            external_id: s.external_id,
        }
    }
}
