//! HTTP handlers

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Form, Json};
use serde::Deserialize;

use nbg_core::api::{HubStatus, SessionList, UserInfo, SESSION_COOKIE};

use super::error::ApiError;
use super::extract::{AdminUser, ClientTransport, CurrentUser, SessionToken};
use crate::state::HubState;

/// Login form body
#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// `Set-Cookie` value carrying a session token
pub fn session_cookie(token: &str, max_age_secs: u64) -> String {
    format!(
        "{}={}; Max-Age={}; Path=/; Secure; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, token, max_age_secs
    )
}

/// `Set-Cookie` value that clears the session cookie
pub fn expired_cookie() -> String {
    session_cookie("", 0)
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn login(
    State(state): State<Arc<HubState>>,
    ClientTransport(transport): ClientTransport,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    let session = state
        .login(&form.username, &form.password, &transport)
        .await?;

    let cookie = session_cookie(&session.token, state.sessions.lifetime().as_secs());
    let location = format!("/user/{}/", session.identity.username);
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to(&location)).into_response())
}

/// Revoke the presented session and clear the cookie.
///
/// The cookie is cleared even when the token is ignored for arriving over an
/// insecure transport.
pub async fn logout(
    State(state): State<Arc<HubState>>,
    ClientTransport(transport): ClientTransport,
    token: Option<SessionToken>,
) -> Response {
    if let Some(SessionToken(token)) = token {
        state.logout(&token, &transport).await;
    }
    ([(header::SET_COOKIE, expired_cookie())], Redirect::to("/hub/login")).into_response()
}

pub async fn current_user(CurrentUser(auth): CurrentUser) -> Json<UserInfo> {
    Json(UserInfo {
        username: auth.identity.username,
        groups: auth.identity.groups.into_iter().collect(),
        admin: auth.is_admin,
        expires_at: auth.session.expires_at,
    })
}

pub async fn activity(
    State(state): State<Arc<HubState>>,
    ClientTransport(transport): ClientTransport,
    SessionToken(token): SessionToken,
) -> Result<StatusCode, ApiError> {
    state.record_activity(&token, &transport)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_sessions(
    State(state): State<Arc<HubState>>,
    _admin: AdminUser,
) -> Json<SessionList> {
    Json(SessionList {
        sessions: state.sessions.list(),
    })
}

pub async fn terminate_session(
    State(state): State<Arc<HubState>>,
    AdminUser(admin): AdminUser,
    Path(username): Path<String>,
) -> Result<StatusCode, ApiError> {
    tracing::info!(
        "Admin {} requested termination of {}",
        admin.identity.username,
        username
    );
    if state.terminate_user(&username).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("session of {}", username)))
    }
}

pub async fn status(State(state): State<Arc<HubState>>, _admin: AdminUser) -> Json<HubStatus> {
    Json(state.status())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("abc.def", 604_800);
        assert!(cookie.starts_with("nbgate-session=abc.def;"));
        for attr in ["Secure", "HttpOnly", "SameSite=Lax", "Path=/", "Max-Age=604800"] {
            assert!(cookie.contains(attr), "missing {}", attr);
        }
    }

    #[test]
    fn test_expired_cookie() {
        assert!(expired_cookie().starts_with("nbgate-session=; Max-Age=0;"));
    }
}
