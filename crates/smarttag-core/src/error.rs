// ── Core error types ──
//
// User-facing errors from smarttag-core. Consumers never see HTTP
// status codes or JSON bodies directly; `From<smarttag_api::Error>`
// folds transport failures into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Cannot reach the SMART Tag portal: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Portal request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Student not found: {identifier}")]
    StudentNotFound { identifier: String },

    #[error("Unreadable portal response: {message}")]
    Parse { message: String },

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Coordinator is stopped")]
    CoordinatorStopped,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    pub(crate) fn not_found(id: impl std::fmt::Display) -> Self {
        Self::StudentNotFound {
            identifier: id.to_string(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<smarttag_api::Error> for CoreError {
    fn from(err: smarttag_api::Error) -> Self {
        match err {
            smarttag_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            smarttag_api::Error::SessionExpired => CoreError::AuthenticationFailed {
                message: "Session expired -- re-authentication required".into(),
            },
            smarttag_api::Error::Transport(ref e) => {
                if e.is_decode() {
                    CoreError::Parse {
                        message: e.to_string(),
                    }
                } else {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                }
            }
            smarttag_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            smarttag_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            smarttag_api::Error::Api { status, message } => CoreError::ConnectionFailed {
                reason: format!("HTTP {status}: {message}"),
            },
            smarttag_api::Error::Deserialization { message, body: _ } => {
                CoreError::Parse { message }
            }
        }
    }
}
