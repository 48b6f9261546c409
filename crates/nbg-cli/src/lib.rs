//! nbgate CLI library
//!
//! Administrative client for the nbgate hub: configuration management,
//! signing-key rotation, session listing and forced termination over the
//! admin API, and edge proxy configuration.

pub mod client;
pub mod commands;
pub mod credentials;
pub mod edge;
pub mod output;
