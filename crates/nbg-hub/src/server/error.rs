//! HTTP error mapping
//!
//! Authentication and authorization failures collapse into one generic
//! response so callers cannot tell a wrong password from a policy denial.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use nbg_core::api::ErrorBody;
use nbg_core::error::{AuthError, HubError, SessionError};

/// Error returned by HTTP handlers. `Display` is the public message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Any authentication or authorization failure
    #[error("access denied")]
    Denied,
    /// Request did not arrive over TLS through the trusted proxy
    #[error("secure transport required")]
    InsecureTransport,
    /// Identity backend could not be consulted
    #[error("identity backend unavailable")]
    Unavailable,
    /// Target of an admin action does not exist
    #[error("{0} not found")]
    NotFound(String),
    /// Anything else; the detail is logged, never returned
    #[error("internal error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Denied | ApiError::InsecureTransport => StatusCode::FORBIDDEN,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<HubError> for ApiError {
    fn from(e: HubError) -> Self {
        match e {
            HubError::Session(SessionError::InsecureTransport) => ApiError::InsecureTransport,
            HubError::Auth(AuthError::UpstreamUnavailable(_)) => ApiError::Unavailable,
            e if e.is_denial() => ApiError::Denied,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!("Request failed: {}", detail);
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbg_core::error::{AccessError, SpawnError};

    #[test]
    fn test_denials_collapse() {
        let a = ApiError::from(HubError::from(AuthError::InvalidCredentials));
        let b = ApiError::from(HubError::from(AuthError::AccountDisabled));
        let c = ApiError::from(HubError::from(AccessError::NotInAllowlist));
        let d = ApiError::from(HubError::from(SessionError::Expired));
        for e in [a, b, c, d] {
            assert_eq!(e, ApiError::Denied);
            assert_eq!(e.status(), StatusCode::FORBIDDEN);
        }
    }

    #[test]
    fn test_distinct_outcomes() {
        assert_eq!(
            ApiError::from(HubError::from(AuthError::UpstreamUnavailable("x".into()))).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(HubError::from(SessionError::InsecureTransport)),
            ApiError::InsecureTransport
        );
        assert!(matches!(
            ApiError::from(HubError::from(SpawnError::Launch("boom".into()))),
            ApiError::Internal(_)
        ));
    }
}
