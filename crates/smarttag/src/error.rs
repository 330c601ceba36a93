//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use smarttag_config::ConfigError;
use smarttag_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the SMART Tag portal")]
    #[diagnostic(
        code(smarttag::connection_failed),
        help(
            "Check your network connection and try again.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { reason: String },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(smarttag::timeout),
        help("Increase the timeout with --timeout or polling.timeout_secs.")
    )]
    Timeout { seconds: u64 },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(smarttag::auth_failed),
        help(
            "Verify your portal email and password.\n\
             Run: smarttag config set-password"
        )
    )]
    AuthFailed { message: String },

    #[error("No portal account configured")]
    #[diagnostic(
        code(smarttag::no_account),
        help(
            "Run: smarttag setup\n\
             Expected config at: {path}"
        )
    )]
    NoAccount { path: String },

    #[error("No password found for '{email}'")]
    #[diagnostic(
        code(smarttag::no_password),
        help(
            "Store one with: smarttag config set-password\n\
             Or set the SMARTTAG_PASSWORD environment variable."
        )
    )]
    NoPassword { email: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("Student '{identifier}' not found")]
    #[diagnostic(
        code(smarttag::not_found),
        help("Run: smarttag students list (or students discover) to see available students")
    )]
    NotFound { identifier: String },

    #[error("Unreadable portal response: {message}")]
    #[diagnostic(
        code(smarttag::parse),
        help("The portal may have changed its response format. Re-run with -vv for details.")
    )]
    Parse { message: String },

    #[error("The coordinator has stopped")]
    #[diagnostic(code(smarttag::stopped))]
    Stopped,

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(smarttag::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(smarttag::config))]
    Config(ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize output: {0}")]
    #[diagnostic(code(smarttag::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to serialize output: {0}")]
    #[diagnostic(code(smarttag::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoAccount { .. } | Self::NoPassword { .. } => {
                exit_code::AUTH
            }
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

/// Map a dialoguer / interactive I/O failure into CliError.
pub fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::ConnectionFailed { reason } => CliError::ConnectionFailed { reason },
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::StudentNotFound { identifier } => CliError::NotFound { identifier },
            CoreError::Parse { message } => CliError::Parse { message },
            CoreError::CoordinatorStopped => CliError::Stopped,
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoAccount => CliError::NoAccount {
                path: smarttag_config::config_path().display().to_string(),
            },
            ConfigError::NoPassword { email } => CliError::NoPassword { email },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(other),
        }
    }
}
