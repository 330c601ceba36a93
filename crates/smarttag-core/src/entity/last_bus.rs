// Last-bus sensor

use serde_json::Value;

use crate::model::{Student, StudentId};

use super::{
    Entity, EntityContext, EntityKind, EntityState, EntityValue, record_attributes, update_state,
};

/// Renders the bus the student last rode, with route and driver
/// as attributes. Keeps showing the last observation through outages.
#[derive(Debug, Clone)]
pub struct LastBusSensor {
    student_id: StudentId,
    name: String,
    state: EntityState,
}

impl LastBusSensor {
    pub fn new(student: &Student) -> Self {
        Self {
            student_id: student.id.clone(),
            name: format!("{} Last Bus", student.name),
            state: EntityState::unknown(),
        }
    }
}

impl Entity for LastBusSensor {
    fn kind(&self) -> EntityKind {
        EntityKind::LastBus
    }

    fn student_id(&self) -> &StudentId {
        &self.student_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn render(&self) -> EntityState {
        self.state.clone()
    }

    fn on_snapshot_changed(&mut self, ctx: &EntityContext<'_>) -> bool {
        let mut attributes = record_attributes(ctx.record);
        let snapshot = ctx.record.and_then(|r| r.snapshot.as_deref());

        let value = match snapshot.and_then(|s| s.last_bus.clone()) {
            Some(bus) => EntityValue::Text(bus),
            None => EntityValue::Unknown,
        };

        if let Some(s) = snapshot {
            let optional = [
                ("route", s.route.clone()),
                ("driver", s.driver.clone()),
                ("last_embarked_at", s.last_embarked_at.map(|t| t.to_rfc3339())),
                ("last_disembarked_at", s.last_disembarked_at.map(|t| t.to_rfc3339())),
            ];
            for (key, v) in optional {
                if let Some(v) = v {
                    attributes.insert(key.into(), Value::from(v));
                }
            }
        }

        let available = value != EntityValue::Unknown
            && ctx.record.is_some_and(|r| r.availability.is_fresh());
        update_state(
            &mut self.state,
            EntityState {
                value,
                available,
                attributes,
            },
        )
    }
}
