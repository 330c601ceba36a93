// Polling-enable switch

use std::sync::Arc;

use serde_json::Value;

use crate::error::CoreError;
use crate::model::{Student, StudentId};
use crate::registry::Registry;

use super::{
    Entity, EntityContext, EntityKind, EntityState, EntityValue, base_attributes, update_state,
};

/// Renders and toggles a student's polling flag.
///
/// Toggling writes the registry and nothing else: the change shows up
/// at the next cycle boundary, never as an immediate fetch.
pub struct PollingSwitch {
    student_id: StudentId,
    name: String,
    registry: Arc<Registry>,
    state: EntityState,
}

impl PollingSwitch {
    pub fn new(student: &Student, registry: Arc<Registry>) -> Self {
        Self {
            student_id: student.id.clone(),
            name: format!("{} Polling", student.name),
            registry,
            state: Self::state_for(student.enabled),
        }
    }

    pub fn is_on(&self) -> bool {
        self.state.value == EntityValue::Bool(true)
    }

    pub fn turn_on(&mut self) -> Result<bool, CoreError> {
        self.set(true)
    }

    pub fn turn_off(&mut self) -> Result<bool, CoreError> {
        self.set(false)
    }

    /// Write the flag through to the registry. Returns `true` if it changed.
    pub fn set(&mut self, enabled: bool) -> Result<bool, CoreError> {
        let changed = self.registry.set_enabled(&self.student_id, enabled)?;
        self.state = Self::state_for(enabled);
        Ok(changed)
    }

    fn state_for(enabled: bool) -> EntityState {
        let mut attributes = base_attributes();
        attributes.insert("applies".into(), Value::from("next poll cycle"));
        EntityState {
            value: EntityValue::Bool(enabled),
            available: true,
            attributes,
        }
    }
}

impl Entity for PollingSwitch {
    fn kind(&self) -> EntityKind {
        EntityKind::PollingSwitch
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
        update_state(&mut self.state, Self::state_for(ctx.student.enabled))
    }
}
