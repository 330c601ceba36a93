// On-bus binary sensor

use crate::model::{Availability, Student, StudentId};

use super::{
    Entity, EntityContext, EntityKind, EntityState, EntityValue, record_attributes, update_state,
};

/// Renders whether the student is on a bus.
///
/// Unknown while the student is pending or unavailable: a stale
/// "on bus" is worse than no answer.
#[derive(Debug, Clone)]
pub struct PresenceSensor {
    student_id: StudentId,
    name: String,
    state: EntityState,
}

impl PresenceSensor {
    pub fn new(student: &Student) -> Self {
        Self {
            student_id: student.id.clone(),
            name: format!("{} On Bus", student.name),
            state: EntityState::unknown(),
        }
    }
}

impl Entity for PresenceSensor {
    fn kind(&self) -> EntityKind {
        EntityKind::Presence
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
        let attributes = record_attributes(ctx.record);
        let shown = ctx.record.and_then(|r| match r.availability {
            Availability::Pending | Availability::Unavailable => None,
            availability => r.snapshot.as_ref().map(|s| (s.on_bus, availability.is_fresh())),
        });
        let next = match shown {
            Some((on_bus, fresh)) => EntityState {
                value: EntityValue::Bool(on_bus),
                available: fresh,
                attributes,
            },
            None => EntityState {
                value: EntityValue::Unknown,
                available: false,
                attributes,
            },
        };
        update_state(&mut self.state, next)
    }
}
