//! Login, authentication and logout flows
//!
//! These tie the collaborators together:
//!
//! ```text
//! verifier -> access gate -> session manager -> capability flags -> spawner
//! ```
//!
//! Every failure is logged here with full detail. Callers only learn whether
//! the request was denied, the backend was unavailable, or something broke.

use std::future::Future;

use nbg_core::error::{AuthError, HubError, SessionError};
use nbg_core::headers::Transport;
use nbg_core::time::current_time_millis;
use nbg_core::{authorize, build_launch_args, Decision, Identity};

use crate::session::{LoginGuard, Session};
use crate::state::HubState;

/// A request whose token and policy checks passed
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub session: Session,
    /// Identity with group memberships as of this request
    pub identity: Identity,
    pub is_admin: bool,
}

impl HubState {
    /// Bound a verifier call by the configured timeout
    async fn with_backend_timeout<T>(
        &self,
        call: impl Future<Output = Result<T, AuthError>>,
    ) -> Result<T, AuthError> {
        let timeout = self.config.accounts.timeout;
        tokio::time::timeout(timeout, call).await.unwrap_or_else(|_| {
            Err(AuthError::UpstreamUnavailable(format!(
                "identity backend timed out after {:?}",
                timeout
            )))
        })
    }

    /// Log in with a username and password.
    ///
    /// On success the user has exactly one live session and a running
    /// runtime. A runtime left over from a previous session is reused.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        transport: &Transport,
    ) -> Result<Session, HubError> {
        if !transport.secure {
            tracing::warn!(
                "Refusing login for {} from {}: insecure transport",
                username,
                transport.client_addr
            );
            return Err(SessionError::InsecureTransport.into());
        }

        let identity = self
            .with_backend_timeout(self.verifier.verify(username, password))
            .await
            .map_err(|e| {
                tracing::warn!(
                    "Login failed for {} from {}: {}",
                    username,
                    transport.client_addr,
                    e
                );
                e
            })?;

        let is_admin = match authorize(&identity, &self.config.access) {
            Decision::Allowed { is_admin } => is_admin,
            Decision::Denied(reason) => {
                tracing::warn!(
                    "Login denied for {} from {}: {}",
                    identity.username,
                    transport.client_addr,
                    reason.reason()
                );
                return Err(reason.into());
            }
        };

        let guard = self.sessions.lock_user(&identity.username).await;
        let session = self.sessions.issue(
            &guard,
            identity,
            is_admin,
            self.config.capabilities.clone(),
        );
        if let Err(e) = self.ensure_runtime(&guard, &session).await {
            drop(guard);
            self.sessions.prune_login_lock(&session.identity.username);
            return Err(e);
        }

        tracing::info!(
            "Login succeeded for {} from {} (admin: {})",
            session.identity.username,
            transport.client_addr,
            session.is_admin
        );
        Ok(session)
    }

    /// Start a runtime for a freshly issued session unless one was carried over.
    async fn ensure_runtime(&self, _guard: &LoginGuard, session: &Session) -> Result<(), HubError> {
        if let Some(handle) = self.sessions.runtime_of(&session.id) {
            tracing::debug!("Reusing runtime {}", handle);
            return Ok(());
        }

        let launch_args = build_launch_args(&session.capabilities);
        let handle = match self.spawner.spawn(&session.identity, &launch_args).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(
                    "Failed to start runtime for {}: {}",
                    session.identity.username,
                    e
                );
                self.sessions.remove_if_current(&session.id);
                return Err(e.into());
            }
        };

        if let Err(orphan) = self.sessions.attach_runtime(&session.id, handle) {
            tracing::warn!("Session vanished while starting runtime {}", orphan);
            if let Err(e) = self.spawner.terminate(&orphan).await {
                tracing::warn!("Failed to stop orphaned runtime {}: {}", orphan, e);
            }
            return Err(SessionError::RevokedOrUnknown.into());
        }
        Ok(())
    }

    /// Validate a token and re-check the caller against the current policy
    /// with fresh group membership.
    pub async fn authenticate(
        &self,
        token: &str,
        transport: &Transport,
    ) -> Result<Authenticated, HubError> {
        let session = self.sessions.validate(token, transport).map_err(|e| {
            tracing::debug!("Rejected token from {}: {}", transport.client_addr, e);
            e
        })?;

        let username = session.identity.username.clone();
        let groups = self
            .with_backend_timeout(self.verifier.groups_of(&username))
            .await
            .map_err(|e| {
                tracing::warn!("Group lookup for {} failed: {}", username, e);
                e
            })?;
        let identity = Identity { username, groups };

        match authorize(&identity, &self.config.access) {
            Decision::Allowed { is_admin } => Ok(Authenticated {
                session,
                identity,
                is_admin,
            }),
            Decision::Denied(reason) => {
                tracing::warn!(
                    "Session of {} no longer satisfies access policy: {}",
                    identity.username,
                    reason.reason()
                );
                Err(reason.into())
            }
        }
    }

    /// Record activity for the session behind `token`
    pub fn record_activity(&self, token: &str, transport: &Transport) -> Result<(), HubError> {
        let session = self.sessions.validate(token, transport)?;
        if !self
            .sessions
            .record_activity(&session.id, current_time_millis())
        {
            return Err(SessionError::RevokedOrUnknown.into());
        }
        Ok(())
    }

    /// Revoke the session behind `token` and stop its runtime.
    ///
    /// Idempotent. Returns the username if a session was removed. Runtime
    /// shutdown is best effort; the token stops working either way. A token
    /// presented over an insecure transport is ignored.
    pub async fn logout(&self, token: &str, transport: &Transport) -> Option<String> {
        if !transport.secure {
            tracing::warn!(
                "Ignoring logout from {}: insecure transport",
                transport.client_addr
            );
            return None;
        }

        let record = self.sessions.revoke(token)?;
        let username = record.session.identity.username.clone();

        if let Some(handle) = record.runtime() {
            if let Err(e) = self.spawner.terminate(&handle).await {
                tracing::warn!("Failed to stop runtime {} on logout: {}", handle, e);
            }
        }

        tracing::info!("Logged out {}", username);
        Some(username)
    }

    /// Forcefully end a user's session (admin action).
    ///
    /// The runtime is stopped first; if that fails the session stays in place.
    /// Returns `false` if the user had no session.
    pub async fn terminate_user(&self, username: &str) -> Result<bool, HubError> {
        let Some(record) = self.sessions.get_by_user(username) else {
            return Ok(false);
        };

        let id = &record.session.id;
        if let Some(handle) = self.sessions.take_runtime(id) {
            if let Err(e) = self.spawner.terminate(&handle).await {
                if let Err(handle) = self.sessions.restore_runtime(id, handle) {
                    tracing::warn!(
                        "Session of {} replaced while stopping runtime {}, leaving it running",
                        username,
                        handle
                    );
                }
                return Err(e.into());
            }
        }

        let removed = self
            .sessions
            .remove_if_current(id)
            .is_some();
        if removed {
            tracing::info!("Terminated session of {}", username);
        }
        Ok(removed)
    }
}
