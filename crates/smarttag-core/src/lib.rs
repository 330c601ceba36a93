//! Polling and fan-out layer between `smarttag-api` and a host.
//!
//! This crate owns the coordinator pattern for the SMART Tag workspace:
//!
//! - **[`Coordinator`]**: One shared poll loop. [`start()`](Coordinator::start)
//!   authenticates, runs a first cycle and spawns the refresh timer;
//!   [`refresh()`](Coordinator::refresh) runs a cycle on demand. Failures
//!   are isolated per student; rejected credentials halt the integration
//!   until [`reauthenticate()`](Coordinator::reauthenticate).
//!
//! - **[`Registry`]**: Ordered set of tracked students and their
//!   polling flags. The only input the coordinator reads at cycle start.
//!
//! - **[`Portal`]**: Request/response contract against the portal,
//!   implemented for [`smarttag_api::PortalClient`]. Session renewal is
//!   owned by the coordinator, not the client.
//!
//! - **Entities** ([`entity`]): Presence sensor, last-bus sensor and
//!   polling switch per student, plus a bridge task that turns
//!   coordinator updates into [`EntityUpdate`]s.
//!
//! - **[`UpdateStream`]**: Subscription to the batch state published
//!   after every cycle.

pub mod config;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod model;
pub mod portal;
pub mod registry;
pub mod routes;
pub mod store;
pub mod stream;

mod session;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, CycleReport, IntegrationState};
pub use entity::{
    ATTRIBUTION, Entity, EntityContext, EntityDescriptor, EntityKind, EntitySet, EntityState,
    EntityUpdate, EntityValue, LastBusSensor, PollingSwitch, PresenceSensor, spawn_entity_bridge,
};
pub use error::CoreError;
pub use portal::{Portal, PortalError};
pub use registry::Registry;
pub use routes::{RouteWindow, route_windows};
pub use store::StateSnapshot;
pub use stream::UpdateStream;

pub use model::{
    Availability, BusStatus, DiscoveredStudent, FailureKind, FetchError, PollResult, Student,
    StudentId, StudentRecord,
};

// Session and credential types callers need to implement `Portal`.
pub use smarttag_api::{Credentials, Ride, Session};
