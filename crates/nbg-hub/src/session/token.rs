//! Signed session tokens
//!
//! A token is `hex(claims_json) "." hex(HMAC-SHA256(key, claims_json))`.
//! The claims bind the session id, the username and the issue/expiry times;
//! the server-side signing key binds them to this hub.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use nbg_core::error::{KeyError, SessionError};
use nbg_core::signing_key::SigningKey;

type HmacSha256 = Hmac<Sha256>;

/// Signed contents of a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Session id
    pub sid: String,
    /// Username the session belongs to
    pub sub: String,
    /// Issued at (Unix milliseconds)
    pub iat: u64,
    /// Expires at (Unix milliseconds)
    pub exp: u64,
}

/// Encodes and verifies session tokens with the hub's signing key
#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha256,
}

impl TokenCodec {
    /// Create a codec keyed with `key`
    pub fn new(key: &SigningKey) -> Result<Self, KeyError> {
        let mac = HmacSha256::new_from_slice(key.as_bytes()).map_err(|e| KeyError::Corrupt {
            path: Default::default(),
            reason: format!("unusable HMAC key: {}", e),
        })?;
        Ok(Self { mac })
    }

    /// Serialize and sign claims
    pub fn encode(&self, claims: &Claims) -> String {
        // Serializing a struct of strings and integers cannot fail.
        let payload = serde_json::to_vec(claims).unwrap_or_default();
        let tag = self.sign(&payload);
        format!("{}.{}", hex::encode(&payload), hex::encode(tag))
    }

    /// Check the signature and return the claims.
    ///
    /// Any malformed token is reported as [`SessionError::BadSignature`];
    /// expiry and revocation are checked by the caller.
    pub fn decode(&self, token: &str) -> Result<Claims, SessionError> {
        let (payload_hex, tag_hex) = token.split_once('.').ok_or(SessionError::BadSignature)?;
        let payload = hex::decode(payload_hex).map_err(|_| SessionError::BadSignature)?;
        let tag = hex::decode(tag_hex).map_err(|_| SessionError::BadSignature)?;

        let expected = self.sign(&payload);
        if !bool::from(expected.as_slice().ct_eq(&tag)) {
            return Err(SessionError::BadSignature);
        }

        serde_json::from_slice(&payload).map_err(|_| SessionError::BadSignature)
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}
