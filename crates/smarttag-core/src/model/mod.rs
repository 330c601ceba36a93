// ── Domain model ──

pub mod status;
pub mod student;

pub use status::{Availability, BusStatus, FailureKind, FetchError, PollResult, StudentRecord};
pub use student::{DiscoveredStudent, Student, StudentId};
