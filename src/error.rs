use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Required deployment configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The identity provider redirected back with an `error` parameter.
    #[error("Identity provider returned error: {0}")]
    OAuthProvider(String),

    /// The callback carried neither `code` nor `error`.
    #[error("Authorization code missing from callback")]
    MissingAuthorizationCode,

    /// No usable flow state cookie accompanied the callback.
    #[error("Login flow state missing or expired")]
    MissingFlowState,

    /// The token endpoint rejected the exchange or answered without an access token.
    #[error("Token exchange failed (status {status:?}): {detail}")]
    OAuthExchange {
        /// HTTP status returned by the token endpoint, if a response arrived.
        status: Option<u16>,
        /// Provider error payload or transport error text.
        detail: String,
    },

    /// The userinfo endpoint failed or returned malformed claims.
    #[error("User info request failed: {0}")]
    UserInfo(String),

    /// No session secret could be resolved.
    #[error("Session secret unavailable: {0}")]
    SecretUnavailable(String),

    /// No valid session is attached to the request.
    #[error("Not authenticated")]
    Unauthenticated,

    /// An encryption error.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Whether the login flow can recover by sending the user back to the login page.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::OAuthProvider(_)
                | AppError::MissingAuthorizationCode
                | AppError::MissingFlowState
                | AppError::OAuthExchange { .. }
                | AppError::UserInfo(_)
        )
    }

    /// Short machine-readable code placed in the login page query string.
    pub fn reason_code(&self) -> &str {
        match self {
            AppError::OAuthProvider(code) => code.as_str(),
            AppError::MissingAuthorizationCode => "missing_code",
            AppError::MissingFlowState => "missing_verifier",
            AppError::OAuthExchange { .. } => "token_exchange_failed",
            AppError::UserInfo(_) => "userinfo_failed",
            AppError::Unauthenticated => "unauthenticated",
            AppError::Configuration(_)
            | AppError::SecretUnavailable(_)
            | AppError::Encryption(_)
            | AppError::Internal(_) => "server_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Configuration(ref msg) => {
                tracing::error!("Configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server misconfigured".to_string())
            }

            AppError::SecretUnavailable(ref msg) => {
                tracing::error!("Session secret unavailable: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }

            AppError::OAuthProvider(ref code) => {
                tracing::warn!("Identity provider error: {}", code);
                (StatusCode::BAD_REQUEST, code.clone())
            }

            AppError::MissingAuthorizationCode | AppError::MissingFlowState => {
                tracing::warn!("{}", self);
                (StatusCode::BAD_REQUEST, self.reason_code().to_string())
            }

            AppError::OAuthExchange { status, ref detail } => {
                tracing::warn!(?status, detail = %detail, "Token exchange failed");
                (StatusCode::BAD_GATEWAY, self.reason_code().to_string())
            }

            AppError::UserInfo(ref msg) => {
                tracing::warn!("User info request failed: {}", msg);
                (StatusCode::BAD_GATEWAY, self.reason_code().to_string())
            }

            AppError::Unauthenticated => {
                tracing::debug!("Request without valid session");
                (StatusCode::UNAUTHORIZED, "Not authenticated".to_string())
            }

            AppError::Encryption(ref msg) => {
                tracing::error!("Encryption error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Encryption error".to_string())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (status, [(http::header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}
