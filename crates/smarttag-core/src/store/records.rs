// ── Per-student record storage ──
//
// Concurrent map of `Arc<StudentRecord>`. A record is never mutated in
// place: every update builds a new record and swaps the `Arc`, so a
// reader holding the old one keeps a consistent view.

use std::sync::Arc;

use dashmap::DashMap;

use crate::model::{PollResult, StudentId, StudentRecord};
use crate::registry::StudentMap;

pub(crate) struct RecordStore {
    records: DashMap<StudentId, Arc<StudentRecord>>,
}

impl RecordStore {
    pub(crate) fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub(crate) fn get(&self, id: &StudentId) -> Option<Arc<StudentRecord>> {
        self.records.get(id).map(|r| Arc::clone(r.value()))
    }

    /// Seed a pending record if none exists yet.
    pub(crate) fn ensure(&self, id: &StudentId) {
        self.records
            .entry(id.clone())
            .or_insert_with(|| Arc::new(StudentRecord::pending(id.clone())));
    }

    /// Fold one poll result into the student's record.
    ///
    /// Returns the new record, or `None` if the student is not tracked.
    pub(crate) fn apply(
        &self,
        id: &StudentId,
        result: &PollResult,
        threshold: u32,
    ) -> Option<Arc<StudentRecord>> {
        let mut entry = self.records.get_mut(id)?;
        let next = Arc::new(entry.value().apply(result, threshold));
        *entry.value_mut() = Arc::clone(&next);
        Some(next)
    }

    pub(crate) fn remove(&self, id: &StudentId) -> Option<Arc<StudentRecord>> {
        self.records.remove(id).map(|(_, v)| v)
    }

    /// Records in registry order. Seeds any that are missing.
    pub(crate) fn ordered(&self, students: &StudentMap) -> Vec<Arc<StudentRecord>> {
        students
            .keys()
            .map(|id| {
                Arc::clone(
                    self.records
                        .entry(id.clone())
                        .or_insert_with(|| Arc::new(StudentRecord::pending(id.clone())))
                        .value(),
                )
            })
            .collect()
    }

    /// Drop records whose student is no longer registered.
    pub(crate) fn retain_registered(&self, students: &StudentMap) {
        self.records.retain(|id, _| students.contains_key(id));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}
