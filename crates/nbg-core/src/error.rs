//! Core error types for nbgate

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the nbgate ecosystem
#[derive(Error, Debug)]
pub enum HubError {
    /// Credential verification error
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Access policy denial
    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    /// Session token error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Runtime spawn error
    #[error("Spawn error: {0}")]
    Spawn(#[from] SpawnError),

    /// Signing key error
    #[error("Signing key error: {0}")]
    Key(#[from] KeyError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HubError {
    /// Whether this error is a security decision that must be reported to the
    /// caller as a plain "access denied".
    pub fn is_denial(&self) -> bool {
        match self {
            HubError::Auth(e) => !e.is_unavailable(),
            HubError::Access(_) => true,
            HubError::Session(e) => !matches!(e, SessionError::InsecureTransport),
            _ => false,
        }
    }
}

/// Credential verification errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown user or wrong secret
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Account is locked or has no interactive login shell
    #[error("Account disabled")]
    AccountDisabled,

    /// The identity backend could not be consulted
    #[error("Identity backend unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl AuthError {
    /// Backend outages are not security decisions and are surfaced distinctly
    pub fn is_unavailable(&self) -> bool {
        matches!(self, AuthError::UpstreamUnavailable(_))
    }
}

/// Access gate denials
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    /// Username is not on the allow-list
    #[error("not_in_allowlist")]
    NotInAllowlist,

    /// Identity is not a member of the gate group
    #[error("not_in_group")]
    NotInGroup,
}

impl AccessError {
    /// Stable audit-log reason code
    pub fn reason(&self) -> &'static str {
        match self {
            AccessError::NotInAllowlist => "not_in_allowlist",
            AccessError::NotInGroup => "not_in_group",
        }
    }
}

/// Session token errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// Token is past its expiry
    #[error("Session expired")]
    Expired,

    /// Token is malformed or its signature does not verify
    #[error("Bad session signature")]
    BadSignature,

    /// Token was revoked or never issued by this hub
    #[error("Session revoked or unknown")]
    RevokedOrUnknown,

    /// Token presented or requested over a channel not asserted as TLS by the trusted proxy
    #[error("Insecure transport")]
    InsecureTransport,
}

/// Idle reclaimer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReclaimError {
    /// The runtime backend failed to terminate a session's runtime
    #[error("Failed to terminate runtime for {username}: {reason}")]
    TerminationFailed { username: String, reason: String },
}

/// Runtime spawn/terminate errors
#[derive(Error, Debug)]
pub enum SpawnError {
    /// Launching the runtime process failed
    #[error("Failed to launch runtime: {0}")]
    Launch(String),

    /// Terminating the runtime failed
    #[error("Failed to terminate runtime: {0}")]
    Terminate(String),
}

/// Signing key errors (always fatal at startup)
#[derive(Error, Debug)]
pub enum KeyError {
    /// Key file exists but does not contain a valid key
    #[error("Corrupt signing key at {path:?}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Key file could not be read or written
    #[error("Signing key I/O at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denials_are_not_distinguishable() {
        let wrong_password = HubError::from(AuthError::InvalidCredentials);
        let not_allowed = HubError::from(AccessError::NotInGroup);
        assert!(wrong_password.is_denial());
        assert!(not_allowed.is_denial());
    }

    #[test]
    fn test_upstream_unavailable_is_not_a_denial() {
        let err = HubError::from(AuthError::UpstreamUnavailable("timeout".into()));
        assert!(!err.is_denial());
    }

    #[test]
    fn test_access_reason_codes() {
        assert_eq!(AccessError::NotInAllowlist.reason(), "not_in_allowlist");
        assert_eq!(AccessError::NotInGroup.to_string(), "not_in_group");
    }
}
