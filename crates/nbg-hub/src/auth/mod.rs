//! Credential verification for the hub
//!
//! Identities come from the host's local accounts. The verifier never caches
//! secrets and fails closed when the account databases cannot be read.

pub mod accounts;
mod local;

pub use local::LocalAccountVerifier;
