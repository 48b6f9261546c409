//! HTTP surface of the hub
//!
//! Served on loopback only; the edge proxy terminates TLS and forwards.

mod error;
mod extract;
mod listener;
mod routes;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::HubState;

pub use error::ApiError;
pub use extract::{token_from_headers, AdminUser, ClientTransport, CurrentUser, SessionToken};
pub use listener::HubServer;
pub use routes::{expired_cookie, session_cookie, LoginForm};

/// Build the hub's router
pub fn router(state: Arc<HubState>) -> Router {
    Router::new()
        .route("/hub/health", get(routes::health))
        .route("/hub/login", post(routes::login))
        .route("/hub/logout", post(routes::logout))
        .route("/hub/api/user", get(routes::current_user))
        .route("/hub/api/activity", post(routes::activity))
        .route("/hub/api/sessions", get(routes::list_sessions))
        .route("/hub/api/sessions/:username", delete(routes::terminate_session))
        .route("/hub/api/status", get(routes::status))
        .with_state(state)
}
