// ── Entity adapters ──
//
// Per-student views of coordinator and registry state, shaped for a
// host platform. Every adapter implements `Entity`; the bridge drives
// them without knowing which kind it holds.

mod bridge;
mod last_bus;
mod presence;
mod switch;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use strum::Display;

use crate::model::{Student, StudentId, StudentRecord};
use crate::registry::Registry;

pub use bridge::{EntityDescriptor, EntitySet, EntityUpdate, spawn_entity_bridge};
pub use last_bus::LastBusSensor;
pub use presence::PresenceSensor;
pub use switch::PollingSwitch;

/// Credit line attached to every entity.
pub const ATTRIBUTION: &str = "Data provided by https://smart-tag.net/";

// ── EntityKind ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    /// Binary sensor: is the student on a bus right now.
    Presence,
    /// Sensor: the bus last ridden.
    LastBus,
    /// Switch: polling enabled.
    #[strum(serialize = "polling")]
    #[serde(rename = "polling")]
    PollingSwitch,
}

// ── EntityState ─────────────────────────────────────────────────────

/// Rendered value of an entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntityValue {
    Bool(bool),
    Text(String),
    Unknown,
}

impl fmt::Display for EntityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => f.write_str("on"),
            Self::Bool(false) => f.write_str("off"),
            Self::Text(s) => f.write_str(s),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// What an entity shows the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    pub value: EntityValue,
    /// `false` while data is missing, stale, or unreadable.
    pub available: bool,
    pub attributes: BTreeMap<String, Value>,
}

impl EntityState {
    pub(crate) fn unknown() -> Self {
        Self {
            value: EntityValue::Unknown,
            available: false,
            attributes: base_attributes(),
        }
    }
}

pub(crate) fn base_attributes() -> BTreeMap<String, Value> {
    BTreeMap::from([("attribution".to_owned(), Value::from(ATTRIBUTION))])
}

/// Attribution plus the record's availability bookkeeping.
pub(crate) fn record_attributes(record: Option<&StudentRecord>) -> BTreeMap<String, Value> {
    let mut attrs = base_attributes();
    let Some(record) = record else {
        attrs.insert("status".into(), Value::from("pending"));
        return attrs;
    };
    attrs.insert("status".into(), Value::from(record.availability.to_string()));
    if let Some(at) = record.last_success {
        attrs.insert("last_updated".into(), Value::from(at.to_rfc3339()));
    }
    if let Some(failure) = &record.last_failure {
        attrs.insert("last_error".into(), Value::from(failure.to_string()));
    }
    attrs
}

// ── Entity trait ────────────────────────────────────────────────────

/// Inputs an adapter renders from.
#[derive(Debug, Clone, Copy)]
pub struct EntityContext<'a> {
    pub student: &'a Student,
    /// `None` until the coordinator has a record for the student.
    pub record: Option<&'a StudentRecord>,
}

pub trait Entity: Send + Sync {
    fn kind(&self) -> EntityKind;

    fn student_id(&self) -> &StudentId;

    fn name(&self) -> &str;

    /// Stable across restarts: `{student_id}_{kind}`.
    fn unique_id(&self) -> String {
        format!("{}_{}", self.student_id(), self.kind())
    }

    /// Current rendered state.
    fn render(&self) -> EntityState;

    /// Re-render from fresh state. Returns `true` if the result differs.
    fn on_snapshot_changed(&mut self, ctx: &EntityContext<'_>) -> bool;
}

/// The three adapters for one student.
pub fn entities_for(student: &Student, registry: &Arc<Registry>) -> Vec<Box<dyn Entity>> {
    vec![
        Box::new(PresenceSensor::new(student)),
        Box::new(LastBusSensor::new(student)),
        Box::new(PollingSwitch::new(student, Arc::clone(registry))),
    ]
}

/// Replace `slot` with `next`, reporting whether anything changed.
pub(crate) fn update_state(slot: &mut EntityState, next: EntityState) -> bool {
    if *slot == next {
        return false;
    }
    *slot = next;
    true
}
