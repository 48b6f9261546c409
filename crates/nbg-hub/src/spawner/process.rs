//! Process-backed runtime spawner
//!
//! Launches the configured single-user server as a child process of the hub.
//! Children are killed when the hub drops them, so a hub crash does not leave
//! orphaned runtimes behind.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::process::{Child, Command};

use nbg_core::config::SpawnerConfig;
use nbg_core::error::SpawnError;
use nbg_core::traits::RuntimeSpawner;
use nbg_core::{Identity, RuntimeHandle};

/// Environment variable carrying the runtime owner's username
pub const USER_ENV: &str = "NBGATE_USER";

/// Spawns runtimes as local child processes
pub struct ProcessSpawner {
    config: SpawnerConfig,
    /// Running children keyed by runtime ID
    children: DashMap<String, Child>,
    next_id: AtomicU64,
}

impl ProcessSpawner {
    pub fn new(config: SpawnerConfig) -> Self {
        Self {
            config,
            children: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of tracked children
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Kill every tracked child (hub shutdown)
    pub async fn terminate_all(&self) {
        let ids: Vec<String> = self.children.iter().map(|r| r.key().clone()).collect();
        for id in ids {
            if let Some((id, mut child)) = self.children.remove(&id) {
                if let Err(e) = kill_child(&mut child).await {
                    tracing::warn!("Failed to stop runtime {} during shutdown: {}", id, e);
                }
            }
        }
    }
}

/// Kill a child and reap it. A child that already exited counts as stopped.
async fn kill_child(child: &mut Child) -> std::io::Result<()> {
    if child.try_wait()?.is_some() {
        return Ok(());
    }
    child.kill().await
}

#[async_trait]
impl RuntimeSpawner for ProcessSpawner {
    async fn spawn(
        &self,
        identity: &Identity,
        launch_args: &[String],
    ) -> Result<RuntimeHandle, SpawnError> {
        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .args(launch_args)
            .envs(&self.config.env)
            .env(USER_ENV, &identity.username)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let child = command
            .spawn()
            .map_err(|e| SpawnError::Launch(format!("{}: {}", self.config.command, e)))?;

        let handle = RuntimeHandle {
            id: format!("rt-{}", self.next_id.fetch_add(1, Ordering::Relaxed)),
            username: identity.username.clone(),
            pid: child.id(),
        };

        tracing::info!("Spawned runtime {}", handle);
        self.children.insert(handle.id.clone(), child);
        Ok(handle)
    }

    async fn terminate(&self, handle: &RuntimeHandle) -> Result<(), SpawnError> {
        let Some((id, mut child)) = self.children.remove(&handle.id) else {
            tracing::debug!("Runtime {} not tracked, treating as stopped", handle);
            return Ok(());
        };

        match kill_child(&mut child).await {
            Ok(()) => {
                tracing::info!("Terminated runtime {}", handle);
                Ok(())
            }
            Err(e) => {
                // Keep tracking it so a later attempt can retry.
                self.children.insert(id, child);
                Err(SpawnError::Terminate(format!("{}: {}", handle, e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn shell_spawner(script: &str) -> ProcessSpawner {
        ProcessSpawner::new(SpawnerConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "sh".to_string()],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_spawn_and_terminate() {
        let spawner = shell_spawner("sleep 30");
        let handle = spawner
            .spawn(&Identity::new("alice"), &["--debug".to_string()])
            .await
            .unwrap();

        assert_eq!(handle.username, "alice");
        assert!(handle.id.starts_with("rt-"));
        assert!(handle.pid.is_some());
        assert_eq!(spawner.len(), 1);

        spawner.terminate(&handle).await.unwrap();
        assert!(spawner.is_empty());

        // Already gone
        spawner.terminate(&handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_terminate_exited_child_succeeds() {
        let spawner = shell_spawner("exit 0");
        let handle = spawner.spawn(&Identity::new("alice"), &[]).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        spawner.terminate(&handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_launch_args_and_user_env_passed() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let spawner = shell_spawner(&format!(
            "echo \"$NBGATE_USER $*\" > {}",
            out.display()
        ));

        spawner
            .spawn(
                &Identity::new("alice"),
                &["--ServerApp.terminals_enabled=False".to_string()],
            )
            .await
            .unwrap();

        let mut contents = String::new();
        for _ in 0..50 {
            contents = std::fs::read_to_string(&out).unwrap_or_default();
            if !contents.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(
            contents.trim(),
            "alice --ServerApp.terminals_enabled=False"
        );
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let spawner = ProcessSpawner::new(SpawnerConfig {
            command: "/nonexistent/nbgate-runtime".to_string(),
            ..Default::default()
        });
        let result = spawner.spawn(&Identity::new("alice"), &[]).await;
        assert!(matches!(result, Err(SpawnError::Launch(_))));
    }

    #[tokio::test]
    async fn test_terminate_all() {
        let spawner = shell_spawner("sleep 30");
        for user in ["alice", "bob"] {
            spawner.spawn(&Identity::new(user), &[]).await.unwrap();
        }
        spawner.terminate_all().await;
        assert!(spawner.is_empty());
    }
}
