//! Error types shared across the client.

use reqwest::StatusCode;
use thiserror::Error;

use crate::cart::CartError;
use crate::config::ConfigError;
use crate::gateway::GatewayError;
use crate::session::{AuthError, RefreshError};
use crate::store::StoreError;
use crate::wishlist::WishlistError;

/// Outcome of an API call that went through the gateway.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The gateway could not complete the request.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The server answered with a non-2xx status.
    #[error("Request rejected with HTTP {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    /// The response body was not what we expected.
    #[error("Invalid response body: {0}")]
    Decode(#[source] reqwest::Error),
}

impl ApiError {
    /// The HTTP status, if the server answered.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` for failures worth retrying: network errors, 5xx, and
    /// 429.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Gateway(GatewayError::Network(_)) => true,
            Self::Rejected { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }

    /// Returns `true` when the session is gone and the user must log in
    /// again.
    #[must_use]
    pub const fn is_session_lost(&self) -> bool {
        matches!(
            self,
            Self::Gateway(GatewayError::NotAuthenticated | GatewayError::SessionExpired(_))
        )
    }
}

/// Top-level error for [`Basket`](crate::Basket) operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Local storage error: {0}")]
    Store(#[from] StoreError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Wishlist(#[from] WishlistError),

    #[error("Already logged in; log out first")]
    AlreadyAuthenticated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        let rejected = |status| ApiError::Rejected {
            status,
            body: String::new(),
        };
        assert!(rejected(StatusCode::INTERNAL_SERVER_ERROR).is_transient());
        assert!(rejected(StatusCode::BAD_GATEWAY).is_transient());
        assert!(rejected(StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(!rejected(StatusCode::NOT_FOUND).is_transient());
        assert!(!rejected(StatusCode::UNAUTHORIZED).is_transient());
        assert!(!ApiError::Gateway(GatewayError::NotAuthenticated).is_transient());
    }

    #[test]
    fn test_session_lost() {
        assert!(ApiError::Gateway(GatewayError::NotAuthenticated).is_session_lost());
        assert!(
            ApiError::Gateway(GatewayError::SessionExpired(
                RefreshError::MissingRefreshToken
            ))
            .is_session_lost()
        );
        assert!(
            !ApiError::Rejected {
                status: StatusCode::CONFLICT,
                body: String::new()
            }
            .is_session_lost()
        );
    }
}
