// ── Portal contract ──
//
// The coordinator talks to the portal only through `Portal`. The
// production implementation wraps `smarttag_api::PortalClient`; tests
// substitute a scripted fake.

use async_trait::async_trait;
use chrono::Utc;
use smarttag_api::{Credentials, PortalClient, Ride, Session};
use thiserror::Error;
use tracing::debug;

use crate::error::CoreError;
use crate::model::{BusStatus, DiscoveredStudent, FetchError, StudentId};

// ── PortalError ─────────────────────────────────────────────────────

/// Portal failures, already sorted into the coordinator's taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortalError {
    /// Credentials rejected.
    #[error("credentials rejected: {0}")]
    Auth(String),

    /// The session token went stale. Renewing may fix it.
    #[error("session expired")]
    SessionExpired,

    #[error("network error: {0}")]
    Network(String),

    #[error("unreadable portal response: {0}")]
    Parse(String),
}

impl PortalError {
    /// Collapse into a per-student fetch failure. A session that is
    /// still stale at this point counts as rejected credentials.
    pub fn into_fetch_error(self) -> FetchError {
        match self {
            Self::Auth(msg) => FetchError::auth(msg),
            Self::SessionExpired => FetchError::auth("session rejected after renewal"),
            Self::Network(msg) => FetchError::network(msg),
            Self::Parse(msg) => FetchError::parse(msg),
        }
    }
}

impl From<smarttag_api::Error> for PortalError {
    fn from(err: smarttag_api::Error) -> Self {
        if err.is_auth_expired() {
            return Self::SessionExpired;
        }
        if err.is_auth() {
            return Self::Auth(err.to_string());
        }
        if err.is_parse() || !err.is_transient() {
            // Includes a 4xx the portal will keep sending.
            return Self::Parse(err.to_string());
        }
        Self::Network(err.to_string())
    }
}

impl From<PortalError> for CoreError {
    fn from(err: PortalError) -> Self {
        match err {
            PortalError::Auth(message) => CoreError::AuthenticationFailed { message },
            PortalError::SessionExpired => CoreError::AuthenticationFailed {
                message: "Session expired -- re-authentication required".into(),
            },
            PortalError::Network(reason) => CoreError::ConnectionFailed { reason },
            PortalError::Parse(message) => CoreError::Parse { message },
        }
    }
}

// ── Portal trait ────────────────────────────────────────────────────

/// Request/response contract against the bus-tracking portal.
///
/// Implementations hold no session state: sessions are passed in and
/// returned explicitly, and the coordinator owns renewal.
#[async_trait]
pub trait Portal: Send + Sync + 'static {
    /// Log in and open a session.
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, PortalError>;

    /// Replace a stale session. Defaults to logging in again.
    async fn renew(
        &self,
        _stale: &Session,
        credentials: &Credentials,
    ) -> Result<Session, PortalError> {
        self.authenticate(credentials).await
    }

    /// Current bus status for one student.
    async fn fetch_status(
        &self,
        session: &Session,
        student: &StudentId,
    ) -> Result<BusStatus, PortalError>;

    /// Students linked to the account.
    async fn list_students(&self, session: &Session)
    -> Result<Vec<DiscoveredStudent>, PortalError>;

    /// Up to `count` recent rides, used for route analysis.
    async fn list_rides(
        &self,
        session: &Session,
        student: &StudentId,
        count: u32,
    ) -> Result<Vec<Ride>, PortalError>;
}

#[async_trait]
impl Portal for PortalClient {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, PortalError> {
        Ok(self.login(credentials).await?)
    }

    async fn renew(&self, stale: &Session, credentials: &Credentials) -> Result<Session, PortalError> {
        if stale.can_refresh() {
            match self.refresh(stale).await {
                Ok(session) => return Ok(session),
                Err(e) if e.is_auth() => {
                    debug!(error = %e, "refresh token rejected, logging in again");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(self.login(credentials).await?)
    }

    async fn fetch_status(
        &self,
        session: &Session,
        student: &StudentId,
    ) -> Result<BusStatus, PortalError> {
        let latest = self.latest_ride(session, student.as_str()).await?;
        Ok(BusStatus::from_latest_ride(latest.as_ref(), Utc::now()))
    }

    async fn list_students(
        &self,
        session: &Session,
    ) -> Result<Vec<DiscoveredStudent>, PortalError> {
        let students = PortalClient::list_students(self, session).await?;
        Ok(students.into_iter().map(DiscoveredStudent::from).collect())
    }

    async fn list_rides(
        &self,
        session: &Session,
        student: &StudentId,
        count: u32,
    ) -> Result<Vec<Ride>, PortalError> {
        Ok(PortalClient::list_rides(self, session, student.as_str(), count).await?)
    }
}
