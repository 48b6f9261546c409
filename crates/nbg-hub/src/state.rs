//! Global hub state

use std::sync::Arc;
use std::time::Instant;

use nbg_core::api::HubStatus;
use nbg_core::config::HubConfig;
use nbg_core::error::KeyError;
use nbg_core::signing_key::SigningKey;
use nbg_core::traits::{CredentialVerifier, RuntimeSpawner};

use crate::session::SessionManager;

/// Global state for the hub daemon
pub struct HubState {
    /// Configuration (immutable after startup)
    pub config: HubConfig,
    /// Session manager
    pub sessions: Arc<SessionManager>,
    /// Identity backend
    pub verifier: Arc<dyn CredentialVerifier>,
    /// Runtime backend
    pub spawner: Arc<dyn RuntimeSpawner>,
    /// Fingerprint of the signing key in use
    pub key_fingerprint: String,
    started_at: Instant,
}

impl HubState {
    /// Create hub state signing sessions with `key`
    pub fn new(
        config: HubConfig,
        key: &SigningKey,
        verifier: Arc<dyn CredentialVerifier>,
        spawner: Arc<dyn RuntimeSpawner>,
    ) -> Result<Self, KeyError> {
        let sessions = Arc::new(SessionManager::new(key, config.session_lifetime)?);
        Ok(Self {
            config,
            sessions,
            verifier,
            spawner,
            key_fingerprint: key.fingerprint(),
            started_at: Instant::now(),
        })
    }

    /// Get the session manager
    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Snapshot for the admin status endpoint
    pub fn status(&self) -> HubStatus {
        HubStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            session_count: self.sessions.len(),
            access_mode: self.config.access.mode_name().to_string(),
            idle_enabled: self.config.idle.enabled,
            idle_timeout_secs: self.config.idle.timeout.as_secs(),
            key_fingerprint: self.key_fingerprint.clone(),
        }
    }
}
