//! Authorization-code + PKCE client for the hosted identity provider.
//!
//! Every call is a single attempt: authorization codes are single-use, so
//! the only recovery from a failed exchange is a fresh login.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

use crate::config::ProviderConfig;
use crate::crypto::pkce::PkcePair;
use crate::error::{AppError, Result};
use crate::models::session::{FlowState, SessionUser};

const AUTHORIZE_PATH: &str = "/oauth2/authorize";
const TOKEN_PATH: &str = "/oauth2/token";
const USERINFO_PATH: &str = "/oauth2/userInfo";
const LOGOUT_PATH: &str = "/logout";
const PASSKEY_PATH: &str = "/passkeys/add";

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN: i64 = 3600;
/// Longest access token lifetime accepted from the token endpoint.
pub const MAX_EXPIRES_IN: i64 = 24 * 60 * 60;

/// Provider URL to send the browser to, plus the state to persist until the callback.
#[derive(Debug, Clone)]
pub struct FlowStart {
    pub url: Url,
    pub flow_state: FlowState,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Tokens returned by a successful code exchange.
#[derive(Clone)]
pub struct TokenSet {
    pub access_token: String,
    pub id_token: String,
    /// Seconds until the access token expires.
    pub expires_in: i64,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// Claims returned by the userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
}

impl UserClaims {
    /// Builds the session user for these claims.
    ///
    /// `expiresAt` is `now + expires_in * 1000` in epoch milliseconds.
    pub fn into_session_user(self, tokens: TokenSet, now: DateTime<Utc>) -> SessionUser {
        SessionUser {
            id: self.sub,
            email: self.email.unwrap_or_default(),
            given_name: self.given_name.unwrap_or_default(),
            family_name: self.family_name.unwrap_or_default(),
            access_token: tokens.access_token,
            id_token: tokens.id_token,
            expires_at: now
                .timestamp_millis()
                .saturating_add(tokens.expires_in.saturating_mul(1000)),
        }
    }
}

/// OAuth client for the hosted identity provider.
pub struct OAuthClient {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl OAuthClient {
    /// Creates a new client with the configured request timeout.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("HTTP client build failed: {}", e)))?;
        Ok(Self { config, http })
    }

    fn client_id(&self) -> Result<&str> {
        self.config
            .client_id
            .as_deref()
            .ok_or_else(|| AppError::Configuration("AUTH_CLIENT_ID is not configured".into()))
    }

    /// Explicit override, otherwise `path` under the hosted domain.
    fn endpoint(&self, explicit: Option<&Url>, path: &str, name: &str) -> Result<Url> {
        if let Some(url) = explicit {
            return Ok(url.clone());
        }
        let domain = self.config.domain.as_ref().ok_or_else(|| {
            AppError::Configuration(format!("AUTH_DOMAIN or {} must be configured", name))
        })?;
        domain
            .join(path)
            .map_err(|e| AppError::Configuration(format!("Invalid {} endpoint: {}", name, e)))
    }

    /// Builds the authorization URL for a fresh PKCE pair.
    ///
    /// # Arguments
    ///
    /// * `callback_url` - Absolute URL of this service's callback route.
    /// * `redirect_to` - Local path to return to after login.
    pub fn start_login(&self, callback_url: &Url, redirect_to: &str) -> Result<FlowStart> {
        let authorize_url =
            self.endpoint(self.config.authorize_url.as_ref(), AUTHORIZE_PATH, "AUTH_AUTHORIZE_URL")?;
        self.start_flow(authorize_url, callback_url, redirect_to)
    }

    /// Same as [`start_login`](Self::start_login), against the passkey registration flow.
    ///
    /// Only an authenticated caller with unexpired tokens may enroll.
    pub fn start_passkey_enrollment(
        &self,
        user: Option<&SessionUser>,
        now: DateTime<Utc>,
        callback_url: &Url,
        redirect_to: &str,
    ) -> Result<FlowStart> {
        let user = user
            .filter(|u| !u.is_expired_at(now))
            .ok_or(AppError::Unauthenticated)?;
        let passkey_url =
            self.endpoint(self.config.passkey_url.as_ref(), PASSKEY_PATH, "AUTH_PASSKEY_URL")?;

        tracing::info!(user_id = %user.id, "🔑 Starting passkey enrollment");
        self.start_flow(passkey_url, callback_url, redirect_to)
    }

    fn start_flow(&self, mut url: Url, callback_url: &Url, redirect_to: &str) -> Result<FlowStart> {
        let client_id = self.client_id()?;
        let pkce = PkcePair::generate();
        let scope = self.config.scopes.join(" ");

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", callback_url.as_str())
            .append_pair("scope", &scope)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256");

        Ok(FlowStart {
            url,
            flow_state: FlowState {
                code_verifier: pkce.verifier,
                redirect_to: redirect_to.to_string(),
            },
        })
    }

    /// Exchanges an authorization code and its verifier for tokens.
    ///
    /// # Errors
    ///
    /// [`AppError::OAuthExchange`] on transport failure, a non-2xx answer
    /// (carrying the provider's payload), or a response without `access_token`.
    pub async fn complete_login(
        &self,
        code: &str,
        code_verifier: &str,
        callback_url: &Url,
    ) -> Result<TokenSet> {
        let client_id = self.client_id()?;
        let token_url = self.endpoint(self.config.token_url.as_ref(), TOKEN_PATH, "AUTH_TOKEN_URL")?;

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", code_verifier),
            ("redirect_uri", callback_url.as_str()),
            ("client_id", client_id),
        ];

        let mut request = self.http.post(token_url).form(&params);
        if let Some(secret) = &self.config.client_secret {
            request = request.basic_auth(client_id, Some(secret.as_str()));
        }

        let response = request.send().await.map_err(|e| AppError::OAuthExchange {
            status: None,
            detail: e.to_string(),
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AppError::OAuthExchange {
            status: Some(status.as_u16()),
            detail: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(AppError::OAuthExchange {
                status: Some(status.as_u16()),
                detail: body,
            });
        }

        let raw: TokenResponse = sonic_rs::from_str(&body).map_err(|e| AppError::OAuthExchange {
            status: Some(status.as_u16()),
            detail: format!("Malformed token response: {}", e),
        })?;

        let access_token = raw
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::OAuthExchange {
                status: Some(status.as_u16()),
                detail: "Token response missing access_token".into(),
            })?;

        tracing::debug!("✅ Authorization code exchanged");

        Ok(TokenSet {
            access_token,
            id_token: raw.id_token.unwrap_or_default(),
            expires_in: raw
                .expires_in
                .filter(|s| *s > 0)
                .map_or(DEFAULT_EXPIRES_IN, |s| s.min(MAX_EXPIRES_IN)),
        })
    }

    /// Fetches the user's claims with a bearer access token.
    pub async fn fetch_user_info(&self, access_token: &str) -> Result<UserClaims> {
        let userinfo_url =
            self.endpoint(self.config.userinfo_url.as_ref(), USERINFO_PATH, "AUTH_USERINFO_URL")?;

        let response = self
            .http
            .get(userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::UserInfo(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::UserInfo(e.to_string()))?;

        if !status.is_success() {
            return Err(AppError::UserInfo(format!("status {}: {}", status.as_u16(), body)));
        }

        sonic_rs::from_str::<UserClaims>(&body)
            .map_err(|e| AppError::UserInfo(format!("Malformed userinfo response: {}", e)))
    }

    /// Hosted logout URL that returns the browser to `post_logout_redirect`.
    pub fn build_logout_url(&self, post_logout_redirect: &Url) -> Result<Url> {
        let client_id = self.client_id()?;
        let mut url = self.endpoint(self.config.logout_url.as_ref(), LOGOUT_PATH, "AUTH_LOGOUT_URL")?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("logout_uri", post_logout_redirect.as_str());
        Ok(url)
    }
}
