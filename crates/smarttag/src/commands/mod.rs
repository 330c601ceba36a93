//! Command handlers: bridge CLI args -> coordinator calls -> output formatting.

pub mod config_cmd;
pub mod routes;
pub mod run;
pub mod setup;
pub mod status;
pub mod students;
pub mod toggle;
pub mod util;
