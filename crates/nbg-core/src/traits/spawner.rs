//! Runtime spawn interface

use async_trait::async_trait;

use crate::error::SpawnError;
use crate::types::{Identity, RuntimeHandle};

/// Starts and stops per-user compute runtimes.
#[async_trait]
pub trait RuntimeSpawner: Send + Sync {
    /// Launch a runtime for `identity` with exactly `launch_args` appended
    async fn spawn(
        &self,
        identity: &Identity,
        launch_args: &[String],
    ) -> Result<RuntimeHandle, SpawnError>;

    /// Stop a runtime. Stopping one that already exited is not an error.
    async fn terminate(&self, handle: &RuntimeHandle) -> Result<(), SpawnError>;
}
