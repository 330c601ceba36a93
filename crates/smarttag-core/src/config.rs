// ── Runtime coordinator configuration ──
//
// Describes how to poll: credentials, cadence, limits, and the initial
// roster. Never touches disk; the CLI builds one from its TOML config
// and hands it in.

use std::time::Duration;

use smarttag_api::{Credentials, PortalClient, TransportConfig};
use url::Url;

use crate::error::CoreError;
use crate::model::Student;

pub use smarttag_api::DEFAULT_API_ORIGIN;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 4;

/// Configuration for one coordinator instance.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Portal origin, e.g. `https://api-parentapp-prod.azurewebsites.net/`.
    pub origin: Url,
    pub credentials: Credentials,
    /// Students to track at startup, in display order.
    pub students: Vec<Student>,
    /// Time between cycles. `Duration::ZERO` disables the timer.
    pub refresh_interval: Duration,
    /// Upper bound on a single fetch, renewal included.
    pub fetch_timeout: Duration,
    /// Consecutive transient failures before a student is unavailable.
    pub failure_threshold: u32,
    pub max_concurrent_fetches: usize,
}

impl CoordinatorConfig {
    pub fn new(credentials: Credentials) -> Result<Self, CoreError> {
        let origin = Url::parse(DEFAULT_API_ORIGIN).map_err(|e| CoreError::Config {
            message: format!("Invalid URL: {e}"),
        })?;
        Ok(Self {
            origin,
            credentials,
            students: Vec::new(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
        })
    }

    pub fn with_students(mut self, students: Vec<Student>) -> Self {
        self.students = students;
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.failure_threshold == 0 {
            return Err(CoreError::Config {
                message: "failure_threshold must be at least 1".into(),
            });
        }
        if self.max_concurrent_fetches == 0 {
            return Err(CoreError::Config {
                message: "max_concurrent_fetches must be at least 1".into(),
            });
        }
        if self.fetch_timeout.is_zero() {
            return Err(CoreError::Config {
                message: "fetch timeout must be non-zero".into(),
            });
        }
        Ok(())
    }

    /// Transport settings for the production client.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig::default().with_timeout(self.fetch_timeout)
    }

    /// Build the HTTP portal client this config points at.
    pub fn portal_client(&self) -> Result<PortalClient, CoreError> {
        Ok(PortalClient::new(self.origin.clone(), &self.transport())?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn config() -> CoordinatorConfig {
        CoordinatorConfig::new(Credentials::new(
            "p@example.com",
            SecretString::from("pw".to_owned()),
        ))
        .unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = config();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.refresh_interval, Duration::from_secs(3600));
        assert_eq!(cfg.failure_threshold, 3);
        assert_eq!(cfg.origin.as_str(), DEFAULT_API_ORIGIN);
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let cfg = CoordinatorConfig {
            failure_threshold: 0,
            ..config()
        };
        assert!(matches!(cfg.validate(), Err(CoreError::Config { .. })));
    }
}
