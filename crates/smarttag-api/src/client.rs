// Portal HTTP client
//
// Wraps `reqwest::Client` with origin-relative URL construction, bearer
// auth, and status/body mapping into `Error`. Endpoint modules (auth,
// students, activity) are inherent methods in separate files so this
// module stays focused on transport mechanics.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::auth::Session;
use crate::error::Error;
use crate::transport::TransportConfig;

/// Production origin of the parent-app backend.
pub const DEFAULT_API_ORIGIN: &str = "https://api-parentapp-prod.azurewebsites.net/";

/// Raw HTTP client for the SMART Tag parent portal.
///
/// Holds no credentials: every authenticated call takes a [`Session`].
/// Cheap to clone (the inner `reqwest::Client` is reference counted).
#[derive(Debug, Clone)]
pub struct PortalClient {
    http: reqwest::Client,
    origin: Url,
    /// Reported in [`Error::Timeout`]; enforced by `http` itself.
    timeout: Duration,
}

impl PortalClient {
    /// Create a client for `origin` using the given transport settings.
    pub fn new(origin: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, origin).with_reported_timeout(transport.timeout))
    }

    /// Create a client against the production portal.
    pub fn production(transport: &TransportConfig) -> Result<Self, Error> {
        let origin = Url::parse(DEFAULT_API_ORIGIN)?;
        Self::new(origin, transport)
    }

    /// Create a client with a pre-built `reqwest::Client`.
    ///
    /// Timeouts are reported with the default transport timeout unless
    /// [`with_reported_timeout`](Self::with_reported_timeout) says otherwise.
    pub fn with_client(http: reqwest::Client, origin: Url) -> Self {
        Self {
            http,
            origin: normalize_origin(origin),
            timeout: TransportConfig::default().timeout,
        }
    }

    /// Set the timeout named in [`Error::Timeout`] to match `http`.
    pub fn with_reported_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Resolve an endpoint path relative to the origin.
    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.origin.join(path.trim_start_matches('/'))?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a request, reporting an elapsed deadline as [`Error::Timeout`].
    pub(crate) async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, Error> {
        request.send().await.map_err(|e| self.transport_error(e))
    }

    fn transport_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            Error::Transport(err)
        }
    }

    /// Send an authenticated GET and decode the JSON body.
    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        session: &Session,
        url: Url,
    ) -> Result<T, Error> {
        debug!("GET {}", url);

        let resp = self
            .send(
                self.http
                    .get(url)
                    .header(reqwest::header::AUTHORIZATION, session.bearer()),
            )
            .await?;

        self.read_json(resp, true).await
    }

    /// Map the response status, then decode the body.
    ///
    /// `authenticated` controls how a 401 is reported: on a bearer call it
    /// means the session went stale, on login/refresh it means rejection.
    pub(crate) async fn read_json<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
        authenticated: bool,
    ) -> Result<T, Error> {
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(if authenticated {
                Error::SessionExpired
            } else {
                Error::Authentication {
                    message: "invalid or expired credentials".into(),
                }
            });
        }

        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Authentication {
                message: "access denied (HTTP 403)".into(),
            });
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: preview(&body).to_owned(),
            });
        }

        let body = resp.text().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(&body)),
            body: body.clone(),
        })
    }
}

/// First 200 bytes of a body, cut on a char boundary.
fn preview(body: &str) -> &str {
    let mut end = body.len().min(200);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

/// `Url::join` drops the last path segment unless the base ends in `/`.
fn normalize_origin(mut origin: Url) -> Url {
    if !origin.path().ends_with('/') {
        let path = format!("{}/", origin.path());
        origin.set_path(&path);
    }
    origin
}
