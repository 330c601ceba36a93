// smarttag-api: Async Rust client for the SMART Tag parent portal

pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod transport;

mod students;
mod activity;

pub use auth::{Credentials, Session};
pub use client::{DEFAULT_API_ORIGIN, PortalClient};
pub use error::Error;
pub use models::{PortalStudent, Ride};
pub use transport::TransportConfig;
