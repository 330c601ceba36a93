// Portal authentication
//
// Bearer-token login with a cookie-borne refresh token. The session is
// an explicit value handed into every call; nothing here is global.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::client::PortalClient;
use crate::error::Error;

/// Name of the cookie that carries the refresh token.
pub(crate) const REFRESH_COOKIE: &str = "refreshToken";

/// Email/password pair for the parent portal.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: SecretString) -> Self {
        Self {
            email: email.into(),
            password,
        }
    }
}

/// An authenticated portal session.
///
/// Owned by the caller and passed by reference into each request.
/// Renewal produces a new `Session` rather than mutating this one.
#[derive(Debug, Clone)]
pub struct Session {
    access_token: SecretString,
    refresh_token: Option<SecretString>,
    issued_at: DateTime<Utc>,
}

impl Session {
    pub fn new(access_token: SecretString, refresh_token: Option<SecretString>) -> Self {
        Self {
            access_token,
            refresh_token,
            issued_at: Utc::now(),
        }
    }

    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token.expose_secret())
    }

    pub fn refresh_token(&self) -> Option<&SecretString> {
        self.refresh_token.as_ref()
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

impl PortalClient {
    /// Log in with email and password.
    ///
    /// `POST user/login`. The portal answers 400 for bad credentials,
    /// returns the access token in the JSON body and the refresh token
    /// in a `refreshToken` cookie.
    pub async fn login(&self, credentials: &Credentials) -> Result<Session, Error> {
        let url = self.url("user/login")?;
        debug!(email = %credentials.email, "logging in at {}", url);

        let body = json!({
            "username": credentials.email,
            "password": credentials.password.expose_secret(),
        });

        let resp = self.send(self.http().post(url).json(&body)).await?;

        if resp.status() == reqwest::StatusCode::BAD_REQUEST {
            return Err(Error::Authentication {
                message: "invalid email or password".into(),
            });
        }

        let session = self.session_from_response(resp, None).await?;
        debug!("login successful");
        Ok(session)
    }

    /// Exchange the session's refresh token for a new access token.
    ///
    /// `POST user/refresh-token` with the refresh cookie. Returns
    /// [`Error::SessionExpired`] if the session has no refresh token.
    pub async fn refresh(&self, session: &Session) -> Result<Session, Error> {
        let Some(refresh) = session.refresh_token() else {
            return Err(Error::SessionExpired);
        };

        let url = self.url("user/refresh-token")?;
        debug!("refreshing session at {}", url);

        let request = self.http().post(url).header(
            reqwest::header::COOKIE,
            format!("{REFRESH_COOKIE}={}", refresh.expose_secret()),
        );
        let resp = self.send(request).await?;

        if resp.status() == reqwest::StatusCode::BAD_REQUEST {
            return Err(Error::Authentication {
                message: "refresh token rejected".into(),
            });
        }

        // The portal may not rotate the refresh cookie; keep the old one then.
        self.session_from_response(resp, Some(refresh.clone())).await
    }

    async fn session_from_response(
        &self,
        resp: reqwest::Response,
        fallback_refresh: Option<SecretString>,
    ) -> Result<Session, Error> {
        let refresh_token = resp
            .cookies()
            .find(|c| c.name() == REFRESH_COOKIE)
            .map(|c| SecretString::from(c.value().to_owned()))
            .or(fallback_refresh);

        let token: TokenResponse = self.read_json(resp, false).await?;
        Ok(Session::new(SecretString::from(token.token), refresh_token))
    }
}
