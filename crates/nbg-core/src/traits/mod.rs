//! Interfaces to the hub's external collaborators

mod spawner;
mod verifier;

pub use spawner::RuntimeSpawner;
pub use verifier::CredentialVerifier;
