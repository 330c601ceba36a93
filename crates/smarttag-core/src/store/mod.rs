// ── Coordinator state ──
//
// Record storage plus the published state that subscribers watch.

mod records;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{StudentId, StudentRecord};

pub(crate) use records::RecordStore;

/// Whole-integration view published after every cycle and every
/// membership change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StateSnapshot {
    /// Number of completed cycles.
    pub cycle: u64,
    pub completed_at: Option<DateTime<Utc>>,
    /// One record per tracked student, in registry order.
    pub records: Vec<Arc<StudentRecord>>,
}

impl StateSnapshot {
    pub fn record(&self, id: &StudentId) -> Option<&Arc<StudentRecord>> {
        self.records.iter().find(|r| &r.student_id == id)
    }
}
