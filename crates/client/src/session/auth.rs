//! Login and token exchange.
//!
//! Handles email/password login and the refresh-token-for-access-token
//! exchange against the storefront API.

use basket_core::{Role, UserId};
use chrono::Utc;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use super::credentials::Session;
use super::refresh::RefreshError;
use crate::gateway::{ApiRequest, Gateway, GatewayError};

/// Errors that can occur during login.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The server rejected the email/password pair.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The server answered with an unexpected status.
    #[error("Login failed with HTTP {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    /// The login request could not be sent.
    #[error("Login request failed: {0}")]
    Gateway(#[from] GatewayError),

    /// The login response was not understood.
    #[error("Invalid login response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Response from the login endpoint.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access: String,
    refresh: String,
    user_id: RawUserId,
    #[serde(default)]
    role: Role,
}

/// User ids arrive as either JSON strings or numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawUserId {
    Text(String),
    Number(i64),
}

impl From<RawUserId> for UserId {
    fn from(raw: RawUserId) -> Self {
        match raw {
            RawUserId::Text(id) => Self::new(id),
            RawUserId::Number(id) => Self::new(id.to_string()),
        }
    }
}

/// Error body returned on rejected logins.
#[derive(Deserialize)]
struct AuthErrorResponse {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Response from the refresh endpoint.
#[derive(Deserialize)]
struct RefreshResponse {
    access: String,
}

/// Log in with email and password.
///
/// The request goes through the gateway anonymously so it shares the cookie
/// jar and carries the anti-forgery header.
///
/// # Errors
///
/// Returns `AuthError::InvalidCredentials` on 400/401/403, and other
/// variants for transport or decoding failures.
#[instrument(skip(gateway, password), fields(email = %email))]
pub async fn login(
    gateway: &Gateway,
    email: &str,
    password: &SecretString,
) -> Result<Session, AuthError> {
    let request = ApiRequest::post(["auth", "login"]).json(serde_json::json!({
        "email": email,
        "password": password.expose_secret(),
    }));
    let response = gateway.send_anonymous(&request).await?;
    let status = response.status();

    if status.is_success() {
        let login: LoginResponse = response.json().await.map_err(AuthError::Decode)?;
        Ok(Session {
            access: SecretString::from(login.access),
            refresh: SecretString::from(login.refresh),
            user_id: login.user_id.into(),
            role: login.role,
            authenticated_at: Utc::now(),
        })
    } else if matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
    ) {
        let error_response: AuthErrorResponse =
            response.json().await.unwrap_or(AuthErrorResponse {
                detail: None,
                message: None,
            });

        let message = error_response
            .detail
            .or(error_response.message)
            .unwrap_or_else(|| "Invalid credentials".to_string());

        Err(AuthError::InvalidCredentials(message))
    } else {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(AuthError::Rejected { status, body })
    }
}

/// Exchange a refresh token for a new access token.
///
/// Sent directly on the HTTP client rather than through the gateway: a 401
/// here must never trigger another refresh.
///
/// # Errors
///
/// Returns `RefreshError::Rejected` for any non-2xx status and
/// `RefreshError::Network` if the exchange could not be sent.
#[instrument(skip(http, refresh_token))]
pub async fn exchange_refresh_token(
    http: &reqwest::Client,
    endpoint: &Url,
    refresh_token: &SecretString,
) -> Result<SecretString, RefreshError> {
    let response = http
        .post(endpoint.clone())
        .json(&serde_json::json!({
            "refresh": refresh_token.expose_secret()
        }))
        .send()
        .await?;

    let status = response.status();

    if status.is_success() {
        let refreshed: RefreshResponse = response.json().await?;
        Ok(SecretString::from(refreshed.access))
    } else {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(RefreshError::Rejected { status, body })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_login_response_accepts_numeric_user_id() {
        let response: LoginResponse = serde_json::from_str(
            r#"{"access":"a","refresh":"r","userId":17,"role":"admin"}"#,
        )
        .unwrap();
        assert_eq!(UserId::from(response.user_id).as_str(), "17");
        assert_eq!(response.role, Role::Admin);
    }

    #[test]
    fn test_login_response_defaults_role() {
        let response: LoginResponse =
            serde_json::from_str(r#"{"access":"a","refresh":"r","userId":"u-1"}"#).unwrap();
        assert_eq!(UserId::from(response.user_id).as_str(), "u-1");
        assert_eq!(response.role, Role::Customer);
    }
}
