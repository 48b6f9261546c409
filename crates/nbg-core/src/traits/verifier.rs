//! Identity backend interface

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::error::AuthError;
use crate::types::Identity;

/// Verifies credentials against a host identity mechanism.
///
/// Implementations must fail closed: if the backend cannot be consulted the
/// result is [`AuthError::UpstreamUnavailable`], never a success. Secrets
/// are used for the single call and never cached.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Check `secret` for `username` and return the verified identity
    async fn verify(&self, username: &str, secret: &str) -> Result<Identity, AuthError>;

    /// Current group memberships of `username`
    async fn groups_of(&self, username: &str) -> Result<BTreeSet<String>, AuthError>;
}
