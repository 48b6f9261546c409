//! nbg-core: Core policy types and configuration for nbgate
//!
//! This crate holds everything the hub and CLI share: the identity and
//! session data model, the access gate, the capability restrictor, the
//! reverse-proxy header contract, signing-key persistence, configuration
//! and the error taxonomy.

pub mod access;
pub mod api;
pub mod capability;
pub mod config;
pub mod error;
pub mod headers;
pub mod signing_key;
pub mod time;
pub mod traits;
pub mod types;

pub use access::{authorize, AccessMode, AccessPolicy, Decision};
pub use capability::build_launch_args;
pub use error::HubError;
pub use types::{CapabilitySet, Identity, RuntimeHandle, SessionId};
