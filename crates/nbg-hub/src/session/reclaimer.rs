//! Idle runtime reclaimer
//!
//! A background task that periodically stops the runtimes of sessions that
//! have been idle longer than the configured timeout, and destroys those
//! sessions.
//!
//! # Sweep model
//!
//! Each sweep works on a snapshot of the session store taken at its start.
//! Terminations run with bounded concurrency. A failed termination leaves
//! the session in place so the next sweep retries it; other records in the
//! same sweep are still processed. Removal is compare-and-delete, so a user
//! who logs out mid-sweep is not an error.
//!
//! # Grace period
//!
//! A session that has not reported any activity yet is left alone until one
//! sweep interval has passed since it was issued. After that its issue time
//! stands in for the missing activity timestamp.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use nbg_core::config::IdleConfig;
use nbg_core::error::ReclaimError;
use nbg_core::time::{current_time_millis, duration_millis, millis_between};
use nbg_core::traits::RuntimeSpawner;

use super::manager::{IdleRecord, SessionManager};

/// Outcome of a single sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Records in the snapshot
    pub examined: usize,
    /// Usernames whose sessions were reclaimed
    pub reclaimed: Vec<String>,
    /// Terminations that failed and will be retried
    pub failed: Vec<ReclaimError>,
    /// Records without activity still inside their grace period
    pub in_grace: usize,
}

/// Whether a record should be reclaimed at `now`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleVerdict {
    Active,
    InGrace,
    Idle { idle_for: u64 },
}

/// Classify a record against the idle timeout.
pub fn classify(record: &IdleRecord, now: u64, timeout: Duration, interval: Duration) -> IdleVerdict {
    let last = match record.last_activity_at {
        Some(at) => at,
        None if millis_between(record.created_at, now) < duration_millis(interval) => {
            return IdleVerdict::InGrace;
        }
        None => record.created_at,
    };

    let idle_for = millis_between(last, now);
    if idle_for > duration_millis(timeout) {
        IdleVerdict::Idle { idle_for }
    } else {
        IdleVerdict::Active
    }
}

/// Periodically reclaims idle sessions
pub struct IdleReclaimer {
    sessions: Arc<SessionManager>,
    spawner: Arc<dyn RuntimeSpawner>,
    config: IdleConfig,
}

impl IdleReclaimer {
    pub fn new(
        sessions: Arc<SessionManager>,
        spawner: Arc<dyn RuntimeSpawner>,
        config: IdleConfig,
    ) -> Self {
        Self {
            sessions,
            spawner,
            config,
        }
    }

    /// Run sweeps until `cancel` fires.
    ///
    /// A sweep in progress when shutdown is requested gets
    /// `shutdown_timeout` to finish its terminations.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            "Starting idle reclaimer (timeout: {:?}, interval: {:?}, concurrency: {})",
            self.config.timeout,
            self.config.interval,
            self.config.concurrency
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let sweep = self.sweep();
                    tokio::pin!(sweep);

                    tokio::select! {
                        _ = &mut sweep => {}
                        _ = cancel.cancelled() => {
                            tracing::info!(
                                "Shutdown during idle sweep, allowing {:?} to finish",
                                self.config.shutdown_timeout
                            );
                            if tokio::time::timeout(self.config.shutdown_timeout, &mut sweep)
                                .await
                                .is_err()
                            {
                                tracing::warn!("Idle sweep did not finish before shutdown timeout");
                            }
                            break;
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    break;
                }
            }
        }

        tracing::info!("Idle reclaimer shutting down");
    }

    /// Sweep once using the current time
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(current_time_millis()).await
    }

    /// Sweep once as of `now` (Unix milliseconds)
    pub async fn sweep_at(&self, now: u64) -> SweepReport {
        let snapshot = self.sessions.idle_snapshot();
        let mut report = SweepReport {
            examined: snapshot.len(),
            ..Default::default()
        };

        let mut candidates = Vec::new();
        for record in snapshot {
            match classify(&record, now, self.config.timeout, self.config.interval) {
                IdleVerdict::Active => {}
                IdleVerdict::InGrace => report.in_grace += 1,
                IdleVerdict::Idle { idle_for } => candidates.push((record, idle_for)),
            }
        }

        let outcomes: Vec<Result<Option<String>, ReclaimError>> = stream::iter(candidates)
            .map(|(record, idle_for)| self.reclaim(record, idle_for, now))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Ok(Some(username)) => report.reclaimed.push(username),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("{} (will retry next sweep)", e);
                    report.failed.push(e);
                }
            }
        }

        if !report.reclaimed.is_empty() || !report.failed.is_empty() {
            tracing::info!(
                "Idle sweep: examined {}, reclaimed {}, failed {}",
                report.examined,
                report.reclaimed.len(),
                report.failed.len()
            );
        } else {
            tracing::debug!("Idle sweep: examined {}, nothing idle", report.examined);
        }

        report
    }

    /// Stop one idle session's runtime and destroy the session.
    ///
    /// Returns `Ok(None)` when the record vanished or became active again
    /// after the snapshot was taken.
    async fn reclaim(
        &self,
        record: IdleRecord,
        idle_for: u64,
        now: u64,
    ) -> Result<Option<String>, ReclaimError> {
        // Re-read the live record; activity may have arrived since the snapshot.
        let Some(live) = self.sessions.get(&record.session_id) else {
            tracing::debug!("Session of {} already gone, skipping", record.username);
            return Ok(None);
        };
        let current = IdleRecord {
            last_activity_at: live.last_activity_at(),
            ..record
        };
        drop(live);

        if !matches!(
            classify(&current, now, self.config.timeout, self.config.interval),
            IdleVerdict::Idle { .. }
        ) {
            return Ok(None);
        }

        // A login racing this termination must not inherit the runtime.
        if let Some(handle) = self.sessions.take_runtime(&current.session_id) {
            if let Err(e) = self.spawner.terminate(&handle).await {
                if let Err(handle) = self.sessions.restore_runtime(&current.session_id, handle) {
                    tracing::warn!(
                        "Session of {} replaced while stopping runtime {}, leaving it running",
                        current.username,
                        handle
                    );
                }
                return Err(ReclaimError::TerminationFailed {
                    username: current.username.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if self.sessions.remove_if_current(&current.session_id).is_some() {
            tracing::info!(
                "Reclaimed idle session of {} (idle {}s)",
                current.username,
                idle_for / 1000
            );
            Ok(Some(current.username))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dashmap::DashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use nbg_core::error::SpawnError;
    use nbg_core::signing_key::SigningKey;
    use nbg_core::{CapabilitySet, Identity, RuntimeHandle};

    const SEC: u64 = 1_000;

    /// Spawner that records terminations and fails for selected users
    #[derive(Default)]
    struct TestSpawner {
        failing: DashSet<String>,
        terminated: DashSet<String>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl RuntimeSpawner for TestSpawner {
        async fn spawn(
            &self,
            identity: &Identity,
            _launch_args: &[String],
        ) -> Result<RuntimeHandle, SpawnError> {
            Ok(RuntimeHandle {
                id: format!("rt-{}", identity.username),
                username: identity.username.clone(),
                pid: None,
            })
        }

        async fn terminate(&self, handle: &RuntimeHandle) -> Result<(), SpawnError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(&handle.username) {
                return Err(SpawnError::Terminate("backend refused".to_string()));
            }
            self.terminated.insert(handle.username.clone());
            Ok(())
        }
    }

    /// Spawner whose terminations wait until released
    #[derive(Default)]
    struct GatedSpawner {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
        spawned: AtomicUsize,
    }

    #[async_trait]
    impl RuntimeSpawner for GatedSpawner {
        async fn spawn(
            &self,
            identity: &Identity,
            _launch_args: &[String],
        ) -> Result<RuntimeHandle, SpawnError> {
            let n = self.spawned.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(RuntimeHandle {
                id: format!("rt-{}", n),
                username: identity.username.clone(),
                pid: None,
            })
        }

        async fn terminate(&self, _handle: &RuntimeHandle) -> Result<(), SpawnError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    fn idle_config() -> IdleConfig {
        IdleConfig {
            timeout: Duration::from_secs(3600),
            interval: Duration::from_secs(300),
            concurrency: 2,
            ..Default::default()
        }
    }

    fn setup() -> (Arc<SessionManager>, Arc<TestSpawner>, IdleReclaimer) {
        let sessions = Arc::new(
            SessionManager::new(&SigningKey::generate(), Duration::from_secs(86400)).unwrap(),
        );
        let spawner = Arc::new(TestSpawner::default());
        let reclaimer = IdleReclaimer::new(
            Arc::clone(&sessions),
            spawner.clone() as Arc<dyn RuntimeSpawner>,
            idle_config(),
        );
        (sessions, spawner, reclaimer)
    }

    async fn login(sessions: &SessionManager, user: &str, at: u64, active_at: Option<u64>) {
        let guard = sessions.lock_user(user).await;
        let session =
            sessions.issue_at(&guard, Identity::new(user), false, CapabilitySet::default(), at);
        sessions
            .attach_runtime(
                &session.id,
                RuntimeHandle {
                    id: format!("rt-{}", user),
                    username: user.to_string(),
                    pid: None,
                },
            )
            .unwrap();
        if let Some(active) = active_at {
            sessions.record_activity(&session.id, active);
        }
    }

    #[test]
    fn test_classify_threshold() {
        let record = IdleRecord {
            session_id: "s".into(),
            username: "alice".into(),
            created_at: 0,
            last_activity_at: Some(1),
            runtime: None,
        };
        let timeout = Duration::from_secs(3600);
        let interval = Duration::from_secs(300);

        assert_eq!(
            classify(&record, 1 + 3599 * SEC, timeout, interval),
            IdleVerdict::Active
        );
        assert_eq!(
            classify(&record, 1 + 3601 * SEC, timeout, interval),
            IdleVerdict::Idle {
                idle_for: 3601 * SEC
            }
        );
    }

    #[test]
    fn test_classify_grace_without_activity() {
        let record = IdleRecord {
            session_id: "s".into(),
            username: "alice".into(),
            created_at: 10 * SEC,
            last_activity_at: None,
            runtime: None,
        };
        let timeout = Duration::from_secs(60);
        let interval = Duration::from_secs(300);

        assert_eq!(
            classify(&record, 10 * SEC + 299 * SEC, timeout, interval),
            IdleVerdict::InGrace
        );
        assert!(matches!(
            classify(&record, 10 * SEC + 301 * SEC, timeout, interval),
            IdleVerdict::Idle { .. }
        ));
    }

    #[tokio::test]
    async fn test_idle_cull_scenario() {
        let (sessions, spawner, reclaimer) = setup();
        login(&sessions, "alice", 1, Some(1)).await;

        let report = reclaimer.sweep_at(1 + 3599 * SEC).await;
        assert!(report.reclaimed.is_empty());
        assert_eq!(sessions.len(), 1);

        let report = reclaimer.sweep_at(1 + 3601 * SEC).await;
        assert_eq!(report.reclaimed, vec!["alice".to_string()]);
        assert!(sessions.is_empty());
        assert!(spawner.terminated.contains("alice"));
    }

    #[tokio::test]
    async fn test_partial_failure_isolation_and_retry() {
        let (sessions, spawner, reclaimer) = setup();
        login(&sessions, "alice", 1, Some(1)).await;
        login(&sessions, "bob", 1, Some(1)).await;
        spawner.failing.insert("alice".to_string());

        let now = 2 * 3600 * SEC;
        let report = reclaimer.sweep_at(now).await;
        assert_eq!(report.reclaimed, vec!["bob".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert!(sessions.get_by_user("alice").is_some());
        assert!(sessions.get_by_user("bob").is_none());

        spawner.failing.remove("alice");
        let report = reclaimer.sweep_at(now + 300 * SEC).await;
        assert_eq!(report.reclaimed, vec!["alice".to_string()]);
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_active_and_grace_sessions_survive() {
        let (sessions, _spawner, reclaimer) = setup();
        let now = 10 * 3600 * SEC;
        login(&sessions, "active", 1, Some(now - 60 * SEC)).await;
        login(&sessions, "fresh", now - 10 * SEC, None).await;

        let report = reclaimer.sweep_at(now).await;
        assert!(report.reclaimed.is_empty());
        assert_eq!(report.in_grace, 1);
        assert_eq!(sessions.len(), 2);
    }

    #[tokio::test]
    async fn test_bounded_concurrency() {
        let (sessions, spawner, reclaimer) = setup();
        for i in 0..8 {
            login(&sessions, &format!("user{}", i), 1, Some(1)).await;
        }

        let report = reclaimer.sweep_at(2 * 3600 * SEC).await;
        assert_eq!(report.reclaimed.len(), 8);
        assert!(spawner.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_session_gone_mid_sweep_is_noop() {
        let (sessions, spawner, reclaimer) = setup();
        login(&sessions, "alice", 1, Some(1)).await;
        sessions.remove_user("alice");

        let report = reclaimer.sweep_at(2 * 3600 * SEC).await;
        assert!(report.failed.is_empty());
        assert!(report.reclaimed.is_empty());
        assert!(!spawner.terminated.contains("alice"));
    }

    #[tokio::test]
    async fn test_relogin_during_termination_gets_no_stale_runtime() {
        let sessions = Arc::new(
            SessionManager::new(&SigningKey::generate(), Duration::from_secs(86400)).unwrap(),
        );
        let spawner = Arc::new(GatedSpawner::default());
        let reclaimer = Arc::new(IdleReclaimer::new(
            Arc::clone(&sessions),
            spawner.clone() as Arc<dyn RuntimeSpawner>,
            idle_config(),
        ));
        login(&sessions, "alice", 1, Some(1)).await;

        let now = 2 * 3600 * SEC;
        let sweep = {
            let reclaimer = Arc::clone(&reclaimer);
            tokio::spawn(async move { reclaimer.sweep_at(now).await })
        };
        spawner.entered.notified().await;

        let guard = sessions.lock_user("alice").await;
        let fresh =
            sessions.issue_at(&guard, Identity::new("alice"), false, CapabilitySet::default(), now);
        assert_eq!(sessions.runtime_of(&fresh.id), None);
        drop(guard);

        spawner.release.notify_one();
        let report = sweep.await.unwrap();
        assert!(report.reclaimed.is_empty());
        assert!(report.failed.is_empty());

        let live = sessions.get_by_user("alice").unwrap();
        assert_eq!(live.session.id, fresh.id);
        assert_eq!(live.runtime(), None);
    }

    #[tokio::test]
    async fn test_failed_termination_keeps_runtime_attached() {
        let (sessions, spawner, reclaimer) = setup();
        login(&sessions, "alice", 1, Some(1)).await;
        spawner.failing.insert("alice".to_string());

        let report = reclaimer.sweep_at(2 * 3600 * SEC).await;
        assert_eq!(report.failed.len(), 1);
        let live = sessions.get_by_user("alice").unwrap();
        assert_eq!(live.runtime().map(|h| h.id), Some("rt-alice".to_string()));
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let (_sessions, _spawner, reclaimer) = setup();
        let cancel = CancellationToken::new();
        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { reclaimer.run(cancel).await })
        };

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("reclaimer did not stop")
            .unwrap();
    }
}
