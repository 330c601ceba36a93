//! Shared configuration for the SMART Tag CLI.
//!
//! One TOML file holds the portal account, polling settings and the
//! tracked roster. Loading layers serialized defaults, the file and
//! `SMARTTAG_*` environment variables; the result translates into a
//! `smarttag_core::CoordinatorConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use smarttag_core::config::{
    DEFAULT_API_ORIGIN, DEFAULT_FAILURE_THRESHOLD, DEFAULT_FETCH_TIMEOUT,
    DEFAULT_MAX_CONCURRENT_FETCHES, DEFAULT_REFRESH_INTERVAL,
};
use smarttag_core::{CoordinatorConfig, Credentials, Student};

/// Keyring service name for stored passwords.
pub const KEYRING_SERVICE: &str = "smarttag";

/// Fallback env var consulted for the portal password.
pub const PASSWORD_ENV: &str = "SMARTTAG_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no portal account configured")]
    NoAccount,

    #[error("no password found for '{email}'")]
    NoPassword { email: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub account: Account,

    #[serde(default)]
    pub polling: Polling,

    /// Tracked students, in display order.
    #[serde(default)]
    pub students: Vec<StudentEntry>,
}

/// Portal login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Account {
    pub email: Option<String>,

    /// Plaintext password (prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Polling {
    /// Seconds between cycles. `0` disables the timer.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_fetches: usize,

    #[serde(default = "default_api_origin")]
    pub api_origin: String,
}

impl Default for Polling {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            timeout_secs: default_timeout(),
            failure_threshold: default_failure_threshold(),
            max_concurrent_fetches: default_max_concurrent(),
            api_origin: default_api_origin(),
        }
    }
}

fn default_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL.as_secs()
}
fn default_timeout() -> u64 {
    DEFAULT_FETCH_TIMEOUT.as_secs()
}
fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}
fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT_FETCHES
}
fn default_api_origin() -> String {
    DEFAULT_API_ORIGIN.into()
}

/// A tracked student.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StudentEntry {
    pub id: String,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

impl StudentEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>, enabled: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled,
            grade: None,
            campus: None,
            external_id: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

impl From<&Student> for StudentEntry {
    fn from(s: &Student) -> Self {
        Self {
            id: s.id.to_string(),
            name: s.name.clone(),
            enabled: s.enabled,
            grade: s.grade.clone(),
            campus: s.campus.clone(),
            external_id: s.external_id.clone(),
        }
    }
}

impl From<&StudentEntry> for Student {
    fn from(e: &StudentEntry) -> Self {
        Student {
            grade: e.grade.clone(),
            campus: e.campus.clone(),
            external_id: e.external_id.clone(),
            ..Student::new(e.id.as_str(), e.name.clone()).with_enabled(e.enabled)
        }
    }
}

impl Config {
    pub fn student(&self, id: &str) -> Option<&StudentEntry> {
        self.students.iter().find(|s| s.id == id)
    }

    /// Set a student's polling flag. Returns `false` if the id is unknown.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.students.iter_mut().find(|s| s.id == id) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Replace the roster with the registry's current contents.
    pub fn sync_students(&mut self, students: &[Student]) {
        self.students = students.iter().map(StudentEntry::from).collect();
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("net", "smarttag", "smarttag").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("smarttag");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from `path` + environment.
///
/// Nested keys use a double underscore, e.g.
/// `SMARTTAG_POLLING__INTERVAL_SECS=600`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SMARTTAG_").split("__").ignore(&["password", "config"]));

    let config: Config = figment.extract()?;
    debug!(path = %path.display(), students = config.students.len(), "config loaded");
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default(path: &Path) -> Config {
    load_config(path).unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    debug!(path = %path.display(), "config saved");
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_user(email: &str) -> String {
    format!("{email}/password")
}

/// Resolve the portal password from the credential chain.
pub fn resolve_password(account: &Account) -> Result<SecretString, ConfigError> {
    resolve_password_with(account, |name| std::env::var(name).ok())
}

/// [`resolve_password`] with an injectable environment lookup.
///
/// Order: `password_env`, then `SMARTTAG_PASSWORD`, then the system
/// keyring, then plaintext in the config.
pub fn resolve_password_with(
    account: &Account,
    env: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    let email = account.email.as_deref().ok_or(ConfigError::NoAccount)?;

    // 1. Account's password_env → env var lookup
    if let Some(val) = account.password_env.as_deref().and_then(&env) {
        return Ok(SecretString::from(val));
    }

    // 2. Well-known env var
    if let Some(val) = env(PASSWORD_ENV) {
        return Ok(SecretString::from(val));
    }

    // 3. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(email)) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 4. Plaintext in config
    if let Some(ref pw) = account.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoPassword {
        email: email.into(),
    })
}

/// Store the portal password in the system keyring.
pub fn store_password_keyring(email: &str, password: &SecretString) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(email))?;
    entry.set_password(password.expose_secret())?;
    Ok(())
}

/// Resolve full portal credentials for the configured account.
pub fn resolve_credentials(account: &Account) -> Result<Credentials, ConfigError> {
    let email = account.email.clone().ok_or(ConfigError::NoAccount)?;
    let password = resolve_password(account)?;
    Ok(Credentials::new(email, password))
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `CoordinatorConfig` from a loaded config and credentials.
pub fn to_coordinator_config(
    cfg: &Config,
    credentials: Credentials,
) -> Result<CoordinatorConfig, ConfigError> {
    let origin: url::Url =
        cfg.polling
            .api_origin
            .parse()
            .map_err(|_| ConfigError::Validation {
                field: "polling.api_origin".into(),
                reason: format!("invalid URL: {}", cfg.polling.api_origin),
            })?;

    if cfg.polling.timeout_secs == 0 {
        return Err(ConfigError::Validation {
            field: "polling.timeout_secs".into(),
            reason: "must be at least 1".into(),
        });
    }
    if cfg.polling.failure_threshold == 0 {
        return Err(ConfigError::Validation {
            field: "polling.failure_threshold".into(),
            reason: "must be at least 1".into(),
        });
    }
    if cfg.polling.max_concurrent_fetches == 0 {
        return Err(ConfigError::Validation {
            field: "polling.max_concurrent_fetches".into(),
            reason: "must be at least 1".into(),
        });
    }

    Ok(CoordinatorConfig {
        origin,
        credentials,
        students: cfg.students.iter().map(Student::from).collect(),
        refresh_interval: Duration::from_secs(cfg.polling.interval_secs),
        fetch_timeout: Duration::from_secs(cfg.polling.timeout_secs),
        failure_threshold: cfg.polling.failure_threshold,
        max_concurrent_fetches: cfg.polling.max_concurrent_fetches,
    })
}
