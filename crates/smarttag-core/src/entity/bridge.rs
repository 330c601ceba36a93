//! Entity bridge: connects [`Coordinator`] updates to a host.
//!
//! Keeps the live set of entities in step with the registry and the
//! coordinator's published state, and turns every difference into an
//! [`EntityUpdate`]: added when a student appears, changed when a
//! rendered state moves, removed when a student is dropped.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::coordinator::Coordinator;
use crate::model::StudentId;
use crate::registry::Registry;
use crate::store::StateSnapshot;

use super::{Entity, EntityContext, EntityKind, EntityState, entities_for};

/// Host-facing description of one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityDescriptor {
    pub unique_id: String,
    pub student_id: StudentId,
    pub kind: EntityKind,
    pub name: String,
    pub state: EntityState,
}

impl EntityDescriptor {
    fn of(entity: &dyn Entity) -> Self {
        Self {
            unique_id: entity.unique_id(),
            student_id: entity.student_id().clone(),
            kind: entity.kind(),
            name: entity.name().to_owned(),
            state: entity.render(),
        }
    }
}

/// Entity lifecycle event for the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EntityUpdate {
    Added(EntityDescriptor),
    Changed(EntityDescriptor),
    Removed {
        unique_id: String,
        student_id: StudentId,
    },
}

// ── EntitySet ───────────────────────────────────────────────────────

/// The entities currently exposed, keyed by unique id.
pub struct EntitySet {
    registry: Arc<Registry>,
    entities: IndexMap<String, Box<dyn Entity>>,
}

impl EntitySet {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            entities: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, unique_id: &str) -> Option<&dyn Entity> {
        self.entities.get(unique_id).map(|e| &**e)
    }

    pub fn descriptors(&self) -> Vec<EntityDescriptor> {
        self.entities
            .values()
            .map(|e| EntityDescriptor::of(e.as_ref()))
            .collect()
    }

    /// Bring the set in line with the registry and `snapshot`.
    pub fn reconcile(&mut self, snapshot: &StateSnapshot) -> Vec<EntityUpdate> {
        let students = self.registry.list();
        let mut updates = Vec::new();

        for student in &students {
            let ctx = EntityContext {
                student,
                record: snapshot.record(&student.id).map(Arc::as_ref),
            };

            let first_id = format!("{}_{}", student.id, EntityKind::Presence);
            if !self.entities.contains_key(&first_id) {
                for mut entity in entities_for(student, &self.registry) {
                    entity.on_snapshot_changed(&ctx);
                    updates.push(EntityUpdate::Added(EntityDescriptor::of(entity.as_ref())));
                    self.entities.insert(entity.unique_id(), entity);
                }
                continue;
            }

            for entity in self
                .entities
                .values_mut()
                .filter(|e| e.student_id() == &student.id)
            {
                if entity.on_snapshot_changed(&ctx) {
                    updates.push(EntityUpdate::Changed(EntityDescriptor::of(entity.as_ref())));
                }
            }
        }

        let gone: Vec<String> = self
            .entities
            .iter()
            .filter(|(_, e)| !students.iter().any(|s| &s.id == e.student_id()))
            .map(|(k, _)| k.clone())
            .collect();
        for unique_id in gone {
            if let Some(entity) = self.entities.shift_remove(&unique_id) {
                updates.push(EntityUpdate::Removed {
                    unique_id,
                    student_id: entity.student_id().clone(),
                });
            }
        }

        updates
    }
}

// ── Bridge task ─────────────────────────────────────────────────────

/// Spawn the bridge forwarding entity updates from `coordinator`.
///
/// Sends the initial `Added` set immediately, then one batch per
/// coordinator publication or registry change. Ends on cancellation,
/// when the receiver is dropped, or when the coordinator goes away.
pub fn spawn_entity_bridge(
    coordinator: &Coordinator,
    update_tx: mpsc::UnboundedSender<EntityUpdate>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut set = EntitySet::new(Arc::clone(coordinator.registry()));
    let mut updates = coordinator.subscribe();
    let mut roster = coordinator.registry().subscribe();

    tokio::spawn(async move {
        let initial = updates.latest();
        if !forward(&update_tx, set.reconcile(&initial)) {
            return;
        }

        loop {
            let snapshot = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                snap = updates.changed() => {
                    let Some(snap) = snap else { break };
                    snap
                }
                changed = roster.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    updates.latest()
                }
            };

            if !forward(&update_tx, set.reconcile(&snapshot)) {
                break;
            }
        }
        debug!("entity bridge stopped");
    })
}

/// Send a batch; `false` once the host stopped listening.
fn forward(tx: &mpsc::UnboundedSender<EntityUpdate>, batch: Vec<EntityUpdate>) -> bool {
    batch.into_iter().all(|u| tx.send(u).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Availability, BusStatus, Student, StudentRecord};

    fn snapshot_with(record: StudentRecord) -> StateSnapshot {
        StateSnapshot {
            cycle: 1,
            completed_at: None,
            records: vec![Arc::new(record)],
        }
    }

    #[test]
    fn first_reconcile_adds_three_entities_per_student() {
        let registry = Arc::new(Registry::from_students([Student::new("s1", "Sam")]));
        let mut set = EntitySet::new(registry);
        let updates = set.reconcile(&StateSnapshot::default());
        assert_eq!(updates.len(), 3);
        assert!(updates.iter().all(|u| matches!(u, EntityUpdate::Added(_))));
        assert!(set.get("s1_presence").is_some());
        assert!(set.get("s1_last_bus").is_some());
        assert!(set.get("s1_polling").is_some());
    }

    #[test]
    fn reconcile_reports_only_changes() {
        let registry = Arc::new(Registry::from_students([Student::new("s1", "Sam")]));
        let mut set = EntitySet::new(Arc::clone(&registry));
        set.reconcile(&StateSnapshot::default());

        assert!(set.reconcile(&StateSnapshot::default()).is_empty());

        let record = StudentRecord {
            snapshot: Some(Arc::new(BusStatus {
                on_bus: true,
                last_bus: Some("12".into()),
                ..BusStatus::no_rides(chrono::Utc::now())
            })),
            availability: Availability::Available,
            ..StudentRecord::pending("s1".into())
        };
        let updates = set.reconcile(&snapshot_with(record));
        // presence and last-bus move, the switch does not
        assert_eq!(updates.len(), 2);
    }

    #[test]
    fn removed_student_removes_entities() {
        let registry = Arc::new(Registry::from_students([
            Student::new("s1", "Sam"),
            Student::new("s2", "Alex"),
        ]));
        let mut set = EntitySet::new(Arc::clone(&registry));
        set.reconcile(&StateSnapshot::default());
        assert_eq!(set.len(), 6);

        registry.remove(&"s1".into());
        let updates = set.reconcile(&StateSnapshot::default());
        assert_eq!(updates.len(), 3);
        assert!(updates.iter().all(|u| matches!(
            u,
            EntityUpdate::Removed { student_id, .. } if student_id.as_str() == "s1"
        )));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn removed_update_wire_shape() {
        let update = EntityUpdate::Removed {
            unique_id: "s1_presence".into(),
            student_id: "s1".into(),
        };
        insta::assert_json_snapshot!(update, @r#"
        {
          "event": "removed",
          "unique_id": "s1_presence",
          "student_id": "s1"
        }
        "#);
    }
}
