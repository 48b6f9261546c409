//! Request extractors
//!
//! Transport is assessed from the TCP peer and the forwarded headers;
//! tokens come from the session cookie or an `Authorization: token` header.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;

use nbg_core::api::{SESSION_COOKIE, TOKEN_SCHEME};
use nbg_core::headers::{assess_transport, ForwardedHeaders, Transport, X_FORWARDED_FOR, X_FORWARDED_PROTO};

use super::error::ApiError;
use crate::gatekeeper::Authenticated;
use crate::state::HubState;

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// How the current request reached the hub
#[derive(Debug, Clone)]
pub struct ClientTransport(pub Transport);

#[async_trait]
impl FromRequestParts<Arc<HubState>> for ClientTransport {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<HubState>,
    ) -> Result<Self, Self::Rejection> {
        let ConnectInfo(peer) = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Internal("connection info unavailable".to_string()))?;

        let forwarded = ForwardedHeaders {
            proto: header_str(&parts.headers, X_FORWARDED_PROTO),
            forwarded_for: header_str(&parts.headers, X_FORWARDED_FOR),
        };

        Ok(Self(assess_transport(
            peer.ip(),
            state.config.trusted_proxy,
            &forwarded,
        )))
    }
}

/// Find the session token in a request's headers
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let from_authorization = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case(TOKEN_SCHEME))
        .map(|(_, token)| token.trim().to_string());

    from_authorization.or_else(|| {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .map(|(_, value)| value.to_string())
    })
    .filter(|token| !token.is_empty())
}

/// Raw session token presented with the request
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for SessionToken {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        token_from_headers(&parts.headers)
            .map(Self)
            .ok_or(ApiError::Denied)
    }
}

/// A caller with a valid session that passes the current access policy
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Authenticated);

#[async_trait]
impl FromRequestParts<Arc<HubState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<HubState>,
    ) -> Result<Self, Self::Rejection> {
        let ClientTransport(transport) = ClientTransport::from_request_parts(parts, state).await?;
        let SessionToken(token) = SessionToken::from_request_parts(parts, state).await?;
        let auth = state.authenticate(&token, &transport).await?;
        Ok(Self(auth))
    }
}

/// A [`CurrentUser`] listed as an administrator
#[derive(Debug, Clone)]
pub struct AdminUser(pub Authenticated);

#[async_trait]
impl FromRequestParts<Arc<HubState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<HubState>,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(auth) = CurrentUser::from_request_parts(parts, state).await?;
        if !auth.is_admin {
            tracing::warn!(
                "Non-admin {} attempted {} {}",
                auth.identity.username,
                parts.method,
                parts.uri.path()
            );
            return Err(ApiError::Denied);
        }
        Ok(Self(auth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; nbgate-session=abc.def; other=1"),
        );
        assert_eq!(token_from_headers(&headers).as_deref(), Some("abc.def"));
    }

    #[test]
    fn test_token_from_authorization_preferred() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("token 01ab.cd23"));
        headers.insert(COOKIE, HeaderValue::from_static("nbgate-session=cookie"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("01ab.cd23"));
    }

    #[test]
    fn test_other_schemes_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(token_from_headers(&headers), None);

        headers.insert(COOKIE, HeaderValue::from_static("nbgate-session="));
        assert_eq!(token_from_headers(&headers), None);
    }
}
