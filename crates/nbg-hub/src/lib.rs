//! nbg-hub: Login gate and session authority for a notebook hub
//!
//! The hub runs on loopback behind a TLS-terminating reverse proxy. It
//! verifies local-account credentials, applies the access policy, issues
//! signed session tokens, starts per-user runtimes with restricted
//! capabilities, and reclaims runtimes that have gone idle.

pub mod auth;
pub mod gatekeeper;
pub mod server;
pub mod session;
pub mod spawner;
pub mod state;

pub use gatekeeper::Authenticated;
pub use state::HubState;
