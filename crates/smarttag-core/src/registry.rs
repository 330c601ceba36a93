// ── Student registry ──
//
// Single source of truth for which students are tracked and which of
// them are eligible for polling. Insertion order is discovery order.
// The registry performs no I/O; hosts watch `subscribe()` to persist
// the enabled flags.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use tokio::sync::watch;
use tracing::debug;

use crate::error::CoreError;
use crate::model::{Student, StudentId};

pub(crate) type StudentMap = IndexMap<StudentId, Student>;

/// Ordered, concurrently readable set of tracked students.
pub struct Registry {
    students: RwLock<StudentMap>,
    /// Bumped on every membership or flag change.
    version: watch::Sender<u64>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::from_students(Vec::new())
    }

    /// Build a registry, keeping the first occurrence of duplicate ids.
    pub fn from_students(students: impl IntoIterator<Item = Student>) -> Self {
        let mut map = StudentMap::new();
        for student in students {
            map.entry(student.id.clone()).or_insert(student);
        }
        let (version, _) = watch::channel(0u64);
        Self {
            students: RwLock::new(map),
            version,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// All students in insertion order.
    pub fn list(&self) -> Vec<Student> {
        self.read().values().cloned().collect()
    }

    pub fn get(&self, id: &StudentId) -> Result<Student, CoreError> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(id))
    }

    pub fn contains(&self, id: &StudentId) -> bool {
        self.read().contains_key(id)
    }

    /// Ids eligible for polling, read in one consistent pass.
    pub fn enabled_ids(&self) -> Vec<StudentId> {
        self.read()
            .values()
            .filter(|s| s.enabled)
            .map(|s| s.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Set a student's polling flag. Idempotent: returns `Ok(false)`
    /// and does not notify when the flag already had that value.
    pub fn set_enabled(&self, id: &StudentId, enabled: bool) -> Result<bool, CoreError> {
        let changed = {
            let mut students = self.write();
            let student = students.get_mut(id).ok_or_else(|| CoreError::not_found(id))?;
            let changed = student.enabled != enabled;
            student.enabled = enabled;
            changed
        };

        if changed {
            debug!(student = %id, enabled, "polling flag changed");
            self.bump();
        }
        Ok(changed)
    }

    /// Watch channel carrying a change counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    // ── Crate-internal locking ───────────────────────────────────────
    //
    // Membership changes are only reachable through the coordinator, which
    // updates its record store inside `then` while the write guard is held.

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, StudentMap> {
        self.students.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StudentMap> {
        self.students.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a student, or update name/flag in place, then run `then` on
    /// the updated map under the same lock. Returns `true` if new.
    pub(crate) fn insert_then<R>(
        &self,
        student: Student,
        then: impl FnOnce(&StudentMap) -> R,
    ) -> (bool, R) {
        let result = {
            let mut students = self.write();
            let is_new = match students.get_mut(&student.id) {
                Some(existing) => {
                    *existing = student;
                    false
                }
                None => {
                    students.insert(student.id.clone(), student);
                    true
                }
            };
            (is_new, then(&students))
        };
        self.bump();
        result
    }

    /// Remove a student, then run `then` on the remaining map under the
    /// same lock. `None` if the id was not tracked.
    pub(crate) fn remove_then<R>(
        &self,
        id: &StudentId,
        then: impl FnOnce(&StudentMap) -> R,
    ) -> Option<(Student, R)> {
        let result = {
            let mut students = self.write();
            let removed = students.shift_remove(id)?;
            (removed, then(&students))
        };
        self.bump();
        Some(result)
    }

    #[cfg(test)]
    pub(crate) fn insert(&self, student: Student) -> bool {
        self.insert_then(student, |_| ()).0
    }

    #[cfg(test)]
    pub(crate) fn remove(&self, id: &StudentId) -> Option<Student> {
        self.remove_then(id, |_| ()).map(|(student, ())| student)
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}
