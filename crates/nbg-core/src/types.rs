//! Core domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Number of random bytes in a session identifier (before hex encoding)
const SESSION_ID_BYTES: usize = 16;

/// A verified user identity, produced by a credential verifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Local account name
    pub username: String,
    /// Names of the groups the account belongs to
    pub groups: BTreeSet<String>,
}

impl Identity {
    /// Create an identity with no group memberships
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            groups: BTreeSet::new(),
        }
    }

    /// Builder-style helper to attach group memberships
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }

    /// Check group membership
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }
}

/// Unique identifier for an issued session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a fresh random session ID
    pub fn generate() -> Self {
        use rand::Rng;
        let mut bytes = [0u8; SESSION_ID_BYTES];
        rand::thread_rng().fill(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Per-session feature toggles, fixed when the session is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitySet {
    /// Whether the spawned runtime exposes terminal (shell) access
    pub terminals_enabled: bool,
    /// Landing URL inside the runtime (e.g. `/lab`)
    pub default_url: Option<String>,
    /// Run the runtime with verbose logging
    pub debug: bool,
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self {
            terminals_enabled: false,
            default_url: None,
            debug: false,
        }
    }
}

/// Opaque handle to a running per-user runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuntimeHandle {
    /// Spawner-assigned identifier
    pub id: String,
    /// Owning user
    pub username: String,
    /// OS process ID, when the spawner knows it
    pub pid: Option<u32>,
}

impl fmt::Display for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pid {
            Some(pid) => write!(f, "{}@{} (pid {})", self.id, self.username, pid),
            None => write!(f, "{}@{}", self.id, self.username),
        }
    }
}
