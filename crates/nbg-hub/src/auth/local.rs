//! Local OS account verifier
//!
//! Checks credentials against the host's `passwd`, `shadow` and `group`
//! files. Password hashes must be argon2 PHC strings; other schemes are
//! refused. File access runs on the blocking pool.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use async_trait::async_trait;

use nbg_core::config::AccountsConfig;
use nbg_core::error::AuthError;
use nbg_core::traits::CredentialVerifier;
use nbg_core::Identity;

use super::accounts::{self, ShadowPassword};

/// Verifies credentials against local account databases
pub struct LocalAccountVerifier {
    config: Arc<AccountsConfig>,
}

impl LocalAccountVerifier {
    pub fn new(config: AccountsConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Run a blocking lookup on the blocking pool
    async fn blocking<T, F>(&self, f: F) -> Result<T, AuthError>
    where
        T: Send + 'static,
        F: FnOnce(&AccountsConfig) -> Result<T, AuthError> + Send + 'static,
    {
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || f(&config))
            .await
            .map_err(|e| AuthError::UpstreamUnavailable(format!("account lookup aborted: {}", e)))?
    }
}

#[async_trait]
impl CredentialVerifier for LocalAccountVerifier {
    async fn verify(&self, username: &str, secret: &str) -> Result<Identity, AuthError> {
        let username = username.to_string();
        let secret = secret.to_string();
        self.blocking(move |config| verify_blocking(config, &username, &secret))
            .await
    }

    async fn groups_of(&self, username: &str) -> Result<BTreeSet<String>, AuthError> {
        let username = username.to_string();
        self.blocking(move |config| groups_blocking(config, &username))
            .await
    }
}

fn read_db(path: &Path) -> Result<String, AuthError> {
    std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read account database {:?}: {}", path, e);
        AuthError::UpstreamUnavailable(format!("cannot read {}", path.display()))
    })
}

fn lookup_user(config: &AccountsConfig, username: &str) -> Result<accounts::PasswdEntry, AuthError> {
    if !accounts::is_valid_username(username) {
        return Err(AuthError::InvalidCredentials);
    }
    let passwd = read_db(&config.passwd_path)?;
    accounts::find_passwd(&passwd, username).ok_or(AuthError::InvalidCredentials)
}

fn groups_for(config: &AccountsConfig, entry: &accounts::PasswdEntry) -> Result<BTreeSet<String>, AuthError> {
    let group = read_db(&config.group_path)?;
    Ok(accounts::memberships(
        &accounts::parse_group(&group),
        &entry.name,
        entry.gid,
    ))
}

fn verify_blocking(
    config: &AccountsConfig,
    username: &str,
    secret: &str,
) -> Result<Identity, AuthError> {
    let entry = lookup_user(config, username)?;

    let shadow = read_db(&config.shadow_path)?;
    let hash = match accounts::find_shadow(&shadow, username) {
        Some(ShadowPassword::Hash(hash)) => hash,
        Some(ShadowPassword::Locked) => return Err(AuthError::AccountDisabled),
        Some(ShadowPassword::Empty) | None => return Err(AuthError::InvalidCredentials),
    };

    if !password_matches(&hash, secret, username) {
        return Err(AuthError::InvalidCredentials);
    }

    if config.disabled_shells.iter().any(|s| s == &entry.shell) {
        return Err(AuthError::AccountDisabled);
    }

    let groups = groups_for(config, &entry)?;
    Ok(Identity {
        username: entry.name,
        groups,
    })
}

fn groups_blocking(config: &AccountsConfig, username: &str) -> Result<BTreeSet<String>, AuthError> {
    let entry = lookup_user(config, username)?;
    groups_for(config, &entry)
}

fn password_matches(hash: &str, secret: &str, username: &str) -> bool {
    if !hash.starts_with("$argon2") {
        tracing::warn!(
            "Unsupported password hash scheme for {}; only argon2 is accepted",
            username
        );
        return false;
    }

    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("Malformed password hash for {}: {}", username, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{PasswordHasher, SaltString};
    use argon2::{Algorithm, Params, Version};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn hash(secret: &str) -> String {
        let salt = SaltString::encode_b64(b"nbgate-test-salt").unwrap();
        let argon = Argon2::new(
            Algorithm::Argon2id,
            Version::V0x13,
            Params::new(8, 1, 1, None).unwrap(),
        );
        argon
            .hash_password(secret.as_bytes(), &salt)
            .unwrap()
            .to_string()
    }

    fn fixture() -> (TempDir, AccountsConfig) {
        let dir = TempDir::new().unwrap();
        let write = |name: &str, contents: String| -> PathBuf {
            let path = dir.path().join(name);
            std::fs::write(&path, contents).unwrap();
            path
        };

        let passwd_path = write(
            "passwd",
            "alice:x:1000:1000::/home/alice:/bin/bash\n\
             bob:x:1001:1001::/home/bob:/bin/bash\n\
             svc:x:1002:1002::/srv:/usr/sbin/nologin\n\
             legacy:x:1003:1003::/home/legacy:/bin/bash\n"
                .to_string(),
        );
        let shadow_path = write(
            "shadow",
            format!(
                "alice:{}:19000::::::\nbob:!{}:19000::::::\nsvc:{}:19000::::::\nlegacy:$6$salt$abcdef:19000::::::\n",
                hash("wonderland"),
                hash("builder"),
                hash("service")
            ),
        );
        let group_path = write(
            "group",
            "alice:x:1000:\njhub:x:2000:alice\n".to_string(),
        );

        let config = AccountsConfig {
            passwd_path,
            shadow_path,
            group_path,
            ..Default::default()
        };
        (dir, config)
    }

    #[tokio::test]
    async fn test_verify_success_with_groups() {
        let (_dir, config) = fixture();
        let verifier = LocalAccountVerifier::new(config);

        let identity = verifier.verify("alice", "wonderland").await.unwrap();
        assert_eq!(identity.username, "alice");
        assert!(identity.in_group("jhub"));
        assert!(identity.in_group("alice"));
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_look_the_same() {
        let (_dir, config) = fixture();
        let verifier = LocalAccountVerifier::new(config);

        assert_eq!(
            verifier.verify("alice", "nope").await,
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(
            verifier.verify("mallory", "nope").await,
            Err(AuthError::InvalidCredentials)
        );
    }

    #[tokio::test]
    async fn test_locked_and_nologin_accounts_disabled() {
        let (_dir, config) = fixture();
        let verifier = LocalAccountVerifier::new(config);

        assert_eq!(
            verifier.verify("bob", "builder").await,
            Err(AuthError::AccountDisabled)
        );
        assert_eq!(
            verifier.verify("svc", "service").await,
            Err(AuthError::AccountDisabled)
        );
    }

    #[tokio::test]
    async fn test_non_argon2_hash_refused() {
        let (_dir, config) = fixture();
        let verifier = LocalAccountVerifier::new(config);
        assert_eq!(
            verifier.verify("legacy", "anything").await,
            Err(AuthError::InvalidCredentials)
        );
    }

    #[tokio::test]
    async fn test_missing_database_is_unavailable() {
        let (_dir, mut config) = fixture();
        config.shadow_path = PathBuf::from("/nonexistent/nbgate/shadow");
        let verifier = LocalAccountVerifier::new(config);

        assert!(matches!(
            verifier.verify("alice", "wonderland").await,
            Err(AuthError::UpstreamUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_groups_of() {
        let (_dir, config) = fixture();
        let verifier = LocalAccountVerifier::new(config);

        let groups = verifier.groups_of("alice").await.unwrap();
        assert!(groups.contains("jhub"));
        assert_eq!(
            verifier.groups_of("mallory").await,
            Err(AuthError::InvalidCredentials)
        );
    }
}
