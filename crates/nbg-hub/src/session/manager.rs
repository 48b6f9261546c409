//! Session store and lifecycle
//!
//! Sessions are indexed by id and by username. The single-user-server model
//! allows one live session per username: issuing a new one replaces the old
//! one, and issuance is serialized per username through [`LoginGuard`].
//!
//! # Consistency model
//!
//! - Activity timestamps are last-writer-wins.
//! - Removal is compare-and-delete on the session id, so a record already
//!   removed by logout (or replaced by a newer login) is left alone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::OwnedMutexGuard;

use nbg_core::api::SessionInfo;
use nbg_core::error::{KeyError, SessionError};
use nbg_core::headers::Transport;
use nbg_core::signing_key::SigningKey;
use nbg_core::time::{current_time_millis, duration_millis};
use nbg_core::{CapabilitySet, Identity, RuntimeHandle, SessionId};

use super::token::{Claims, TokenCodec};

/// Sentinel for "no activity recorded yet"
const NO_ACTIVITY: u64 = 0;

/// An issued session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub identity: Identity,
    pub token: String,
    /// Unix milliseconds
    pub issued_at: u64,
    /// Unix milliseconds
    pub expires_at: u64,
    pub is_admin: bool,
    pub capabilities: CapabilitySet,
}

/// Stored state for a live session
#[derive(Debug)]
pub struct SessionRecord {
    pub session: Session,
    last_activity: AtomicU64,
    runtime: Mutex<Option<RuntimeHandle>>,
}

impl SessionRecord {
    fn new(session: Session, runtime: Option<RuntimeHandle>) -> Self {
        Self {
            session,
            last_activity: AtomicU64::new(NO_ACTIVITY),
            runtime: Mutex::new(runtime),
        }
    }

    /// Last reported activity, if any
    pub fn last_activity_at(&self) -> Option<u64> {
        match self.last_activity.load(Ordering::Acquire) {
            NO_ACTIVITY => None,
            at => Some(at),
        }
    }

    /// Handle of the runtime serving this session, if one is running
    pub fn runtime(&self) -> Option<RuntimeHandle> {
        self.runtime
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_runtime(&self, handle: Option<RuntimeHandle>) -> Option<RuntimeHandle> {
        let mut slot = self
            .runtime
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *slot, handle)
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            username: self.session.identity.username.clone(),
            admin: self.session.is_admin,
            issued_at: self.session.issued_at,
            expires_at: self.session.expires_at,
            last_activity_at: self.last_activity_at(),
            runtime: self.runtime().map(|h| h.to_string()),
            terminals_enabled: self.session.capabilities.terminals_enabled,
        }
    }
}

/// Point-in-time view of a session for the idle reclaimer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleRecord {
    pub session_id: SessionId,
    pub username: String,
    /// Session issue time (Unix milliseconds)
    pub created_at: u64,
    pub last_activity_at: Option<u64>,
    pub runtime: Option<RuntimeHandle>,
}

/// Proof that the caller holds the per-user issuance lock
pub struct LoginGuard {
    username: String,
    _guard: OwnedMutexGuard<()>,
}

impl LoginGuard {
    pub fn username(&self) -> &str {
        &self.username
    }
}

/// Issues, validates and revokes sessions
pub struct SessionManager {
    codec: TokenCodec,
    lifetime: Duration,
    /// Sessions indexed by session ID
    sessions: DashMap<SessionId, Arc<SessionRecord>>,
    /// Live session per username
    by_user: DashMap<String, SessionId>,
    /// Per-username issuance locks
    login_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl SessionManager {
    /// Create a session manager signing with `key`
    pub fn new(key: &SigningKey, lifetime: Duration) -> Result<Self, KeyError> {
        Ok(Self {
            codec: TokenCodec::new(key)?,
            lifetime,
            sessions: DashMap::new(),
            by_user: DashMap::new(),
            login_locks: DashMap::new(),
        })
    }

    /// Token lifetime
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Acquire the issuance lock for `username`.
    ///
    /// Concurrent logins for the same user queue here, so only one of them
    /// creates the session that survives.
    pub async fn lock_user(&self, username: &str) -> LoginGuard {
        let lock = self
            .login_locks
            .entry(username.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();

        LoginGuard {
            username: username.to_string(),
            _guard: lock.lock_owned().await,
        }
    }

    /// Issue a session for `identity`, replacing any previous session of the user.
    pub fn issue(
        &self,
        guard: &LoginGuard,
        identity: Identity,
        is_admin: bool,
        capabilities: CapabilitySet,
    ) -> Session {
        self.issue_at(guard, identity, is_admin, capabilities, current_time_millis())
    }

    /// [`issue`](Self::issue) with an explicit clock
    pub fn issue_at(
        &self,
        guard: &LoginGuard,
        identity: Identity,
        is_admin: bool,
        capabilities: CapabilitySet,
        now: u64,
    ) -> Session {
        debug_assert_eq!(guard.username(), identity.username);

        let id = SessionId::generate();
        let expires_at = now.saturating_add(duration_millis(self.lifetime));
        let token = self.codec.encode(&Claims {
            sid: id.to_string(),
            sub: identity.username.clone(),
            iat: now,
            exp: expires_at,
        });

        let session = Session {
            id: id.clone(),
            identity,
            token,
            issued_at: now,
            expires_at,
            is_admin,
            capabilities,
        };

        // The previous session's runtime keeps serving the user.
        let carried_runtime = self
            .by_user
            .insert(session.identity.username.clone(), id.clone())
            .and_then(|previous| self.sessions.remove(&previous))
            .and_then(|(previous_id, record)| {
                tracing::debug!(
                    "Replacing session {} of {}",
                    previous_id,
                    session.identity.username
                );
                record.set_runtime(None)
            });

        self.sessions.insert(
            id,
            Arc::new(SessionRecord::new(session.clone(), carried_runtime)),
        );

        session
    }

    /// Validate a token presented on a request.
    pub fn validate(&self, token: &str, transport: &Transport) -> Result<Session, SessionError> {
        self.validate_at(token, transport, current_time_millis())
    }

    /// [`validate`](Self::validate) with an explicit clock
    pub fn validate_at(
        &self,
        token: &str,
        transport: &Transport,
        now: u64,
    ) -> Result<Session, SessionError> {
        if !transport.secure {
            return Err(SessionError::InsecureTransport);
        }

        let claims = self.codec.decode(token)?;
        if now > claims.exp {
            return Err(SessionError::Expired);
        }

        let id = SessionId(claims.sid);
        match self.sessions.get(&id) {
            Some(record) if record.session.identity.username == claims.sub => {
                Ok(record.session.clone())
            }
            _ => Err(SessionError::RevokedOrUnknown),
        }
    }

    /// Revoke the session a token refers to.
    ///
    /// Revoking an unknown, already revoked or unverifiable token is a no-op.
    /// Returns the removed record so the caller can release its runtime.
    pub fn revoke(&self, token: &str) -> Option<Arc<SessionRecord>> {
        let claims = self.codec.decode(token).ok()?;
        self.remove_if_current(&SessionId(claims.sid))
    }

    /// Remove a session only if it is still present under `id`.
    pub fn remove_if_current(&self, id: &SessionId) -> Option<Arc<SessionRecord>> {
        let (_, record) = self.sessions.remove(id)?;
        let username = &record.session.identity.username;
        self.by_user.remove_if(username, |_, current| current == id);
        self.prune_login_lock(username);
        Some(record)
    }

    /// Drop the issuance lock of `username` if nobody holds or awaits it.
    ///
    /// Returns whether the entry was removed.
    pub fn prune_login_lock(&self, username: &str) -> bool {
        self.login_locks
            .remove_if(username, |_, lock| Arc::strong_count(lock) == 1)
            .is_some()
    }

    /// Remove the live session of `username`, if any
    pub fn remove_user(&self, username: &str) -> Option<Arc<SessionRecord>> {
        let id = self.by_user.get(username).map(|r| r.value().clone())?;
        self.remove_if_current(&id)
    }

    /// Record user activity on a session (last writer wins)
    pub fn record_activity(&self, id: &SessionId, at: u64) -> bool {
        match self.sessions.get(id) {
            Some(record) => {
                record.last_activity.store(at.max(1), Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Attach a spawned runtime to a session.
    ///
    /// Returns the handle back if the session no longer exists, so the
    /// caller can stop the orphaned runtime.
    pub fn attach_runtime(
        &self,
        id: &SessionId,
        handle: RuntimeHandle,
    ) -> Result<(), RuntimeHandle> {
        match self.sessions.get(id) {
            Some(record) => {
                record.set_runtime(Some(handle));
                Ok(())
            }
            None => Err(handle),
        }
    }

    /// Detach the runtime from a live session so it can be stopped.
    ///
    /// A login that replaces the session meanwhile carries nothing over and
    /// starts a fresh runtime.
    pub fn take_runtime(&self, id: &SessionId) -> Option<RuntimeHandle> {
        self.sessions.get(id).and_then(|record| record.set_runtime(None))
    }

    /// Put back a runtime whose termination failed.
    ///
    /// Only succeeds while the session is still live and has no other
    /// runtime; otherwise the handle is returned to the caller.
    pub fn restore_runtime(
        &self,
        id: &SessionId,
        handle: RuntimeHandle,
    ) -> Result<(), RuntimeHandle> {
        let Some(record) = self.sessions.get(id) else {
            return Err(handle);
        };
        let mut slot = record
            .runtime
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match *slot {
            Some(_) => Err(handle),
            None => {
                *slot = Some(handle);
                Ok(())
            }
        }
    }

    /// Runtime of a session
    pub fn runtime_of(&self, id: &SessionId) -> Option<RuntimeHandle> {
        self.sessions.get(id).and_then(|r| r.runtime())
    }

    /// Get a session record by ID
    pub fn get(&self, id: &SessionId) -> Option<Arc<SessionRecord>> {
        self.sessions.get(id).map(|r| Arc::clone(&r))
    }

    /// Get the live session record of a user
    pub fn get_by_user(&self, username: &str) -> Option<Arc<SessionRecord>> {
        let id = self.by_user.get(username).map(|r| r.value().clone())?;
        self.get(&id)
    }

    /// Snapshot of all sessions for an idle sweep
    pub fn idle_snapshot(&self) -> Vec<IdleRecord> {
        self.sessions
            .iter()
            .map(|r| IdleRecord {
                session_id: r.key().clone(),
                username: r.session.identity.username.clone(),
                created_at: r.session.issued_at,
                last_activity_at: r.last_activity_at(),
                runtime: r.runtime(),
            })
            .collect()
    }

    /// Admin listing, sorted by username
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self.sessions.iter().map(|r| r.info()).collect();
        infos.sort_by(|a, b| a.username.cmp(&b.username));
        infos
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    const HOUR: u64 = 3_600_000;

    fn manager() -> SessionManager {
        SessionManager::new(&SigningKey::generate(), Duration::from_secs(7 * 24 * 3600)).unwrap()
    }

    fn secure() -> Transport {
        Transport {
            secure: true,
            client_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            via_trusted_proxy: true,
        }
    }

    async fn issue(manager: &SessionManager, user: &str, now: u64) -> Session {
        let guard = manager.lock_user(user).await;
        manager.issue_at(&guard, Identity::new(user), false, CapabilitySet::default(), now)
    }

    #[tokio::test]
    async fn test_issue_then_validate() {
        let manager = manager();
        let session = issue(&manager, "alice", 1_000).await;

        let validated = manager.validate_at(&session.token, &secure(), 1_000).unwrap();
        assert_eq!(validated, session);
        assert_eq!(session.expires_at, 1_000 + 7 * 24 * HOUR);
    }

    #[tokio::test]
    async fn test_expired_after_expiry() {
        let manager = manager();
        let session = issue(&manager, "alice", 1_000).await;

        assert!(manager
            .validate_at(&session.token, &secure(), session.expires_at)
            .is_ok());
        assert_eq!(
            manager.validate_at(&session.token, &secure(), session.expires_at + 1),
            Err(SessionError::Expired)
        );
    }

    #[tokio::test]
    async fn test_insecure_transport_rejected() {
        let manager = manager();
        let session = issue(&manager, "alice", 1_000).await;
        let insecure = Transport {
            secure: false,
            ..secure()
        };
        assert_eq!(
            manager.validate_at(&session.token, &insecure, 1_000),
            Err(SessionError::InsecureTransport)
        );
    }

    #[tokio::test]
    async fn test_rotated_key_invalidates_tokens() {
        let old = manager();
        let session = issue(&old, "alice", 1_000).await;

        let rotated = manager();
        assert_eq!(
            rotated.validate_at(&session.token, &secure(), 1_000),
            Err(SessionError::BadSignature)
        );
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let manager = manager();
        let session = issue(&manager, "alice", 1_000).await;

        assert!(manager.revoke(&session.token).is_some());
        assert!(manager.revoke(&session.token).is_none());
        assert!(manager.revoke("garbage").is_none());
        assert_eq!(
            manager.validate_at(&session.token, &secure(), 1_000),
            Err(SessionError::RevokedOrUnknown)
        );
    }

    #[tokio::test]
    async fn test_new_login_replaces_session_and_keeps_runtime() {
        let manager = manager();
        let first = issue(&manager, "alice", 1_000).await;
        let handle = RuntimeHandle {
            id: "rt-1".into(),
            username: "alice".into(),
            pid: None,
        };
        manager.attach_runtime(&first.id, handle.clone()).unwrap();

        let second = issue(&manager, "alice", 2_000).await;
        assert_eq!(manager.len(), 1);
        assert_eq!(
            manager.validate_at(&first.token, &secure(), 2_000),
            Err(SessionError::RevokedOrUnknown)
        );
        assert_eq!(manager.runtime_of(&second.id), Some(handle));
    }

    #[tokio::test]
    async fn test_concurrent_logins_leave_one_session() {
        let manager = Arc::new(manager());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let manager = Arc::clone(&manager);
            tasks.push(tokio::spawn(async move {
                issue(&manager, "alice", 1_000 + i).await
            }));
        }
        let mut sessions = Vec::new();
        for task in tasks {
            sessions.push(task.await.unwrap());
        }

        assert_eq!(manager.len(), 1);
        let live: Vec<_> = sessions
            .iter()
            .filter(|s| manager.validate_at(&s.token, &secure(), 2_000).is_ok())
            .collect();
        assert_eq!(live.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_if_current_ignores_replaced_session() {
        let manager = manager();
        let first = issue(&manager, "alice", 1_000).await;
        let second = issue(&manager, "alice", 2_000).await;

        assert!(manager.remove_if_current(&first.id).is_none());
        assert!(manager.get_by_user("alice").is_some());
        assert!(manager.remove_if_current(&second.id).is_some());
        assert!(manager.get_by_user("alice").is_none());
    }

    #[tokio::test]
    async fn test_record_activity_last_writer_wins() {
        let manager = manager();
        let session = issue(&manager, "alice", 1_000).await;
        assert_eq!(manager.get(&session.id).unwrap().last_activity_at(), None);

        manager.record_activity(&session.id, 5_000);
        manager.record_activity(&session.id, 4_000);
        assert_eq!(
            manager.get(&session.id).unwrap().last_activity_at(),
            Some(4_000)
        );
        assert!(!manager.record_activity(&SessionId::from("missing"), 1));
    }

    #[tokio::test]
    async fn test_login_lock_dropped_with_session() {
        let manager = manager();
        let session = issue(&manager, "alice", 1_000).await;
        assert_eq!(manager.login_locks.len(), 1);

        manager.revoke(&session.token).unwrap();
        assert!(manager.login_locks.is_empty());

        let session = issue(&manager, "bob", 1_000).await;
        manager.remove_user("bob").unwrap();
        assert!(manager.login_locks.is_empty());
        assert!(manager.revoke(&session.token).is_none());
    }

    #[tokio::test]
    async fn test_held_login_lock_is_not_pruned() {
        let manager = manager();
        let session = issue(&manager, "alice", 1_000).await;

        let guard = manager.lock_user("alice").await;
        manager.remove_if_current(&session.id).unwrap();
        assert_eq!(manager.login_locks.len(), 1);

        drop(guard);
        assert!(manager.prune_login_lock("alice"));
        assert!(manager.login_locks.is_empty());
    }

    #[tokio::test]
    async fn test_taken_runtime_is_not_carried_over() {
        let manager = manager();
        let first = issue(&manager, "alice", 1_000).await;
        let handle = RuntimeHandle {
            id: "rt-1".into(),
            username: "alice".into(),
            pid: None,
        };
        manager.attach_runtime(&first.id, handle.clone()).unwrap();

        assert_eq!(manager.take_runtime(&first.id), Some(handle.clone()));
        let second = issue(&manager, "alice", 2_000).await;
        assert_eq!(manager.runtime_of(&second.id), None);

        // The replaced session cannot take the handle back
        assert_eq!(manager.restore_runtime(&first.id, handle.clone()), Err(handle));
    }

    #[tokio::test]
    async fn test_restore_runtime_into_empty_slot_only() {
        let manager = manager();
        let session = issue(&manager, "alice", 1_000).await;
        let old = RuntimeHandle {
            id: "rt-1".into(),
            username: "alice".into(),
            pid: None,
        };
        let fresh = RuntimeHandle {
            id: "rt-2".into(),
            ..old.clone()
        };

        assert_eq!(manager.restore_runtime(&session.id, old.clone()), Ok(()));
        assert_eq!(manager.runtime_of(&session.id), Some(old));

        manager.take_runtime(&session.id).unwrap();
        manager.attach_runtime(&session.id, fresh.clone()).unwrap();
        let stale = RuntimeHandle {
            id: "rt-1".into(),
            ..fresh.clone()
        };
        assert_eq!(manager.restore_runtime(&session.id, stale.clone()), Err(stale));
        assert_eq!(manager.runtime_of(&session.id), Some(fresh));
    }

    #[tokio::test]
    async fn test_attach_runtime_to_missing_session() {
        let manager = manager();
        let handle = RuntimeHandle {
            id: "rt-9".into(),
            username: "ghost".into(),
            pid: None,
        };
        assert_eq!(
            manager.attach_runtime(&SessionId::from("nope"), handle.clone()),
            Err(handle)
        );
    }
}
