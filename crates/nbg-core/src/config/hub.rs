//! Hub configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;
use crate::access::{AccessMode, AccessPolicy};
use crate::capability::is_capability_flag;
use crate::error::ConfigError;
use crate::types::CapabilitySet;

/// Configuration for the hub daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Address to bind the HTTP listener to (must be loopback)
    pub bind_address: String,

    /// Address of the reverse proxy whose forwarded headers are trusted
    pub trusted_proxy: IpAddr,

    /// Public URL served by the edge proxy (e.g. `https://hub.example.org`)
    pub public_url: Option<String>,

    /// Path to the session signing key file
    pub signing_key_path: PathBuf,

    /// Session token lifetime
    #[serde(with = "duration_secs")]
    pub session_lifetime: Duration,

    /// Login policy
    pub access: AccessPolicy,

    /// Idle reclaimer settings
    pub idle: IdleConfig,

    /// Capabilities applied to every spawned runtime
    pub capabilities: CapabilitySet,

    /// Local account databases
    pub accounts: AccountsConfig,

    /// Runtime spawner settings
    pub spawner: SpawnerConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        let config_dir = super::default_config_dir();

        Self {
            bind_address: "127.0.0.1:8081".to_string(),
            trusted_proxy: IpAddr::V4(Ipv4Addr::LOCALHOST),
            public_url: None,
            signing_key_path: config_dir.join("cookie_secret"),
            session_lifetime: Duration::from_secs(7 * 24 * 60 * 60),
            access: AccessPolicy::default(),
            idle: IdleConfig::default(),
            capabilities: CapabilitySet::default(),
            accounts: AccountsConfig::default(),
            spawner: SpawnerConfig::default(),
        }
    }
}

impl HubConfig {
    /// Parsed bind address
    pub fn bind_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_address.parse().map_err(|e| {
            ConfigError::Invalid(format!("bind_address {:?}: {}", self.bind_address, e))
        })
    }

    /// Check the invariants the hub relies on at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bind = self.bind_socket_addr()?;
        if !bind.ip().is_loopback() {
            return Err(ConfigError::Invalid(format!(
                "bind_address must be a loopback address, got {}",
                bind
            )));
        }

        if !self.trusted_proxy.is_loopback() {
            return Err(ConfigError::Invalid(format!(
                "trusted_proxy must be a loopback address, got {}",
                self.trusted_proxy
            )));
        }

        if self.session_lifetime.is_zero() {
            return Err(ConfigError::Invalid(
                "session_lifetime must be greater than zero".to_string(),
            ));
        }

        match &self.access.mode {
            AccessMode::GroupGate { group } if group.trim().is_empty() => {
                return Err(ConfigError::Invalid(
                    "access.group must be set when mode is group_gate".to_string(),
                ));
            }
            AccessMode::AllowList { users } if users.is_empty() => {
                tracing::warn!("access.users is empty - nobody will be able to log in");
            }
            _ => {}
        }

        self.idle.validate()?;

        if self.spawner.command.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "spawner.command must not be empty".to_string(),
            ));
        }

        if let Some(arg) = self.spawner.args.iter().find(|a| is_capability_flag(a)) {
            return Err(ConfigError::Invalid(format!(
                "spawner.args must not contain {:?}; set it through [capabilities]",
                arg
            )));
        }

        Ok(())
    }
}

/// Idle reclaimer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Whether the reclaimer runs at all
    pub enabled: bool,

    /// Inactivity after which a runtime is reclaimed
    #[serde(with = "duration_secs")]
    pub timeout: Duration,

    /// Time between sweeps
    #[serde(with = "duration_secs")]
    pub interval: Duration,

    /// Maximum simultaneous terminations per sweep
    pub concurrency: usize,

    /// How long an in-flight sweep may run after shutdown is requested
    #[serde(with = "duration_secs")]
    pub shutdown_timeout: Duration,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_secs(3600),
            interval: Duration::from_secs(300),
            concurrency: 5,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl IdleConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "idle.interval must be greater than zero".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "idle.timeout must be greater than zero".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "idle.concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Local account database locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountsConfig {
    /// passwd-format file (name, uid, gid, shell)
    pub passwd_path: PathBuf,

    /// shadow-format file (name, password hash)
    pub shadow_path: PathBuf,

    /// group-format file (name, gid, members)
    pub group_path: PathBuf,

    /// Login shells that mark an account as not usable interactively
    pub disabled_shells: Vec<String>,

    /// Upper bound on a single verification call
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            passwd_path: PathBuf::from("/etc/passwd"),
            shadow_path: PathBuf::from("/etc/shadow"),
            group_path: PathBuf::from("/etc/group"),
            disabled_shells: vec![
                "/usr/sbin/nologin".to_string(),
                "/sbin/nologin".to_string(),
                "/bin/false".to_string(),
                "/usr/bin/false".to_string(),
            ],
            timeout: Duration::from_secs(10),
        }
    }
}

/// Runtime spawner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnerConfig {
    /// Single-user server executable
    pub command: String,

    /// Base arguments, placed before the capability flags (which they may not set)
    pub args: Vec<String>,

    /// Extra environment for the runtime
    pub env: BTreeMap<String, String>,

    /// Working directory for the runtime (defaults to the hub's)
    pub working_dir: Option<PathBuf>,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            command: "jupyterhub-singleuser".to_string(),
            args: vec![],
            env: BTreeMap::new(),
            working_dir: None,
        }
    }
}
