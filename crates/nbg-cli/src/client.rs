//! HTTP client for the hub's API
//!
//! Talks to the hub through its public (edge) URL, so requests carry the
//! forwarded headers the hub requires. The session token is sent as
//! `Authorization: token <t>`.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{AUTHORIZATION, SET_COOKIE};
use reqwest::{redirect, Response, StatusCode};

use nbg_core::api::{ErrorBody, HubStatus, SessionInfo, SessionList, UserInfo, SESSION_COOKIE, TOKEN_SCHEME};

/// Request timeout for hub calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the hub HTTP API
pub struct HubClient {
    base_url: String,
    http: reqwest::Client,
    token: Option<String>,
}

impl HubClient {
    /// Create a client for the hub at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("nbgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            token: None,
        })
    }

    /// Attach a session token to subsequent requests
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Not logged in. Run 'nbgate login' first"))?;
        Ok(request.header(AUTHORIZATION, format!("{} {}", TOKEN_SCHEME, token)))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        request
            .send()
            .await
            .with_context(|| format!("Failed to reach hub at {}", self.base_url))
    }

    /// Check the hub's health endpoint
    pub async fn health(&self) -> Result<bool> {
        let response = self.send(self.http.get(self.url("/hub/health"))).await?;
        Ok(response.status().is_success())
    }

    /// Log in and return the issued session token
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let request = self
            .http
            .post(self.url("/hub/login"))
            .form(&[("username", username), ("password", password)]);
        let response = self.send(request).await?;

        if response.status() != StatusCode::SEE_OTHER {
            return Err(error_from(response).await);
        }

        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(token_from_set_cookie)
            .ok_or_else(|| anyhow::anyhow!("Hub accepted the login but returned no session cookie"))
    }

    /// Revoke the current session
    pub async fn logout(&self) -> Result<()> {
        let request = self.authorized(self.http.post(self.url("/hub/logout")))?;
        let response = self.send(request).await?;
        if response.status() != StatusCode::SEE_OTHER && !response.status().is_success() {
            return Err(error_from(response).await);
        }
        Ok(())
    }

    /// Identity behind the current token
    pub async fn whoami(&self) -> Result<UserInfo> {
        let request = self.authorized(self.http.get(self.url("/hub/api/user")))?;
        json(self.send(request).await?).await
    }

    /// All live sessions (admin)
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        let request = self.authorized(self.http.get(self.url("/hub/api/sessions")))?;
        let list: SessionList = json(self.send(request).await?).await?;
        Ok(list.sessions)
    }

    /// Force-terminate a user's session (admin). Returns `false` if the
    /// user had no session.
    pub async fn kill_session(&self, username: &str) -> Result<bool> {
        let path = format!("/hub/api/sessions/{}", username);
        let request = self.authorized(self.http.delete(self.url(&path)))?;
        let response = self.send(request).await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(error_from(response).await),
        }
    }

    /// Hub status (admin)
    pub async fn status(&self) -> Result<HubStatus> {
        let request = self.authorized(self.http.get(self.url("/hub/api/status")))?;
        json(self.send(request).await?).await
    }
}

/// Extract the session token from a `Set-Cookie` value
pub fn token_from_set_cookie(value: &str) -> Option<String> {
    let pair = value.split(';').next()?.trim();
    let (name, token) = pair.split_once('=')?;
    (name == SESSION_COOKIE && !token.is_empty()).then(|| token.to_string())
}

async fn json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    if !response.status().is_success() {
        return Err(error_from(response).await);
    }
    response
        .json()
        .await
        .context("Failed to parse hub response")
}

async fn error_from(response: Response) -> anyhow::Error {
    let status = response.status();
    let message = response
        .json::<ErrorBody>()
        .await
        .map(|body| body.error)
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown error").to_string());
    anyhow::anyhow!("Hub returned {}: {}", status.as_u16(), message)
}
