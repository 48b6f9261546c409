//! HTTP API payloads shared by the hub and the CLI
//!
//! JSON bodies of the `/hub/api/*` routes.

use serde::{Deserialize, Serialize};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "nbgate-session";

/// Authorization scheme accepted for API clients (`Authorization: token <t>`)
pub const TOKEN_SCHEME: &str = "token";

/// The authenticated caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub username: String,
    pub groups: Vec<String>,
    pub admin: bool,
    /// Unix milliseconds
    pub expires_at: u64,
}

/// One active session, as shown on the admin surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub username: String,
    pub admin: bool,
    /// Unix milliseconds
    pub issued_at: u64,
    /// Unix milliseconds
    pub expires_at: u64,
    /// Unix milliseconds, absent until the first activity report
    pub last_activity_at: Option<u64>,
    /// Runtime description, absent if no runtime is running
    pub runtime: Option<String>,
    pub terminals_enabled: bool,
}

/// Admin session listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionList {
    pub sessions: Vec<SessionInfo>,
}

/// Hub status (admin only)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStatus {
    pub version: String,
    pub uptime_secs: u64,
    pub session_count: usize,
    pub access_mode: String,
    pub idle_enabled: bool,
    pub idle_timeout_secs: u64,
    pub key_fingerprint: String,
}

/// Generic error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
