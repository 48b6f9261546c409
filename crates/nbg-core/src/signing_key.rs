//! Session signing key management
//!
//! The hub signs session tokens with a server-side secret. The secret is
//! generated once, written hex-encoded to a file readable only by its owner,
//! and loaded on every start.
//!
//! # Operational lever
//!
//! Replacing or deleting the key file invalidates every outstanding session
//! token on the next start (a forced global logout). `nbgate key rotate`
//! does this deliberately.
//!
//! # Failure model
//!
//! A key file that exists but cannot be read or decoded is fatal. The hub
//! refuses to start rather than silently minting a new key or running with
//! a weak one.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::KeyError;

/// Length of the signing key in bytes (before hex encoding)
pub const KEY_BYTES: usize = 32;

/// Server-side secret used to sign session tokens
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey([u8; KEY_BYTES]);

impl SigningKey {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        use rand::Rng;
        let mut bytes = [0u8; KEY_BYTES];
        rand::thread_rng().fill(&mut bytes);
        Self(bytes)
    }

    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; KEY_BYTES]) -> Self {
        Self(bytes)
    }

    /// Raw key material
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Short public fingerprint, safe to log
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        format!("SHA256:{}", hex::encode(&digest[..8]))
    }

    fn decode(path: &Path, contents: &str) -> Result<Self, KeyError> {
        let raw = hex::decode(contents.trim()).map_err(|e| KeyError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("not hex: {}", e),
        })?;

        let bytes: [u8; KEY_BYTES] = raw.try_into().map_err(|raw: Vec<u8>| KeyError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("expected {} bytes, found {}", KEY_BYTES, raw.len()),
        })?;

        Ok(Self(bytes))
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey({})", self.fingerprint())
    }
}

/// Load the signing key, generating and persisting one if the file is absent.
pub fn load_or_generate(path: &Path) -> Result<SigningKey, KeyError> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let key = SigningKey::decode(path, &contents)?;
            tracing::info!("Loaded signing key {} from {:?}", key.fingerprint(), path);
            Ok(key)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let key = SigningKey::generate();
            write_key(path, &key)?;
            tracing::info!(
                "Generated new signing key {} at {:?}",
                key.fingerprint(),
                path
            );
            Ok(key)
        }
        Err(source) => Err(KeyError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Load an existing signing key without generating one
pub fn load(path: &Path) -> Result<SigningKey, KeyError> {
    let contents = fs::read_to_string(path).map_err(|source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    SigningKey::decode(path, &contents)
}

/// Replace the signing key with a fresh one, invalidating all sessions.
pub fn rotate(path: &Path) -> Result<SigningKey, KeyError> {
    let key = SigningKey::generate();
    write_key(path, &key)?;
    tracing::warn!(
        "Rotated signing key at {:?} (new fingerprint {}); all sessions are invalidated",
        path,
        key.fingerprint()
    );
    Ok(key)
}

/// Write the key file with owner-only permissions.
///
/// Creates the parent directory if it doesn't exist. On Unix the file is
/// created with mode 0600 so the secret is never briefly world-readable.
fn write_key(path: &Path, key: &SigningKey) -> Result<(), KeyError> {
    let io_err = |source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(io_err)?;
    file.write_all(hex::encode(key.as_bytes()).as_bytes())
        .map_err(io_err)?;
    file.write_all(b"\n").map_err(io_err)?;

    // An existing file keeps its old mode on open; tighten it explicitly.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(io_err)?;
    }

    Ok(())
}
