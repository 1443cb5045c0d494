use axum::{
    Extension, Json,
    extract::{Query, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;
use url::Url;

use crate::{
    config::Config,
    error::{AppError, Result},
    models::session::{SessionPayload, SessionUser},
    services::session::{CookieOptions, SessionCodec, removal_cookie},
    state::AppState,
    validation::auth::sanitize_redirect,
};

/// Path of the callback route, relative to the public origin.
pub const CALLBACK_PATH: &str = "/auth/callback";
/// Path of the login entry point.
pub const LOGIN_PATH: &str = "/auth/login";
/// Path of the passkey enrollment entry point.
pub const PASSKEY_PATH: &str = "/auth/passkey";

/// Longest provider error code echoed back to the login page.
const MAX_ERROR_CODE_LEN: usize = 64;

/// Query parameters accepted by the login and passkey entry points.
#[derive(Deserialize, Debug, Default)]
pub struct StartParams {
    #[serde(rename = "redirectTo")]
    pub redirect_to: Option<String>,
}

/// Query parameters the identity provider sends to the callback.
#[derive(Deserialize, Debug, Default)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Public view of the current session; tokens stay in the cookie.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub id: String,
    pub email: String,
    pub given_name: String,
    pub family_name: String,
    pub expires_at: i64,
}

/// Public origin of the portal, from configuration or the request headers.
fn public_origin(config: &Config, headers: &HeaderMap) -> Result<Url> {
    if let Some(base) = &config.public_base_url {
        return Ok(base.clone());
    }

    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(header::HOST))
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::Configuration("PUBLIC_BASE_URL is unset and the request has no Host".into())
        })?;
    let default_proto = if config.environment.is_production() { "https" } else { "http" };
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or(default_proto);

    Url::parse(&format!("{}://{}/", proto, host))
        .map_err(|e| AppError::Configuration(format!("Cannot derive public origin: {}", e)))
}

fn join(origin: &Url, path: &str) -> Result<Url> {
    origin
        .join(path)
        .map_err(|e| AppError::Configuration(format!("Invalid path '{}': {}", path, e)))
}

/// Redirect to the login page carrying a machine-readable reason.
fn login_error(login_page: &str, code: &str) -> Response {
    let encoded = urlencoding::encode(code);
    Redirect::to(&format!("{}?error={}", login_page, encoded)).into_response()
}

/// Keeps provider error codes short and free of markup.
fn sanitize_error_code(raw: &str) -> String {
    let code: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(MAX_ERROR_CODE_LEN)
        .collect();
    if code.is_empty() { "provider_error".to_string() } else { code }
}

fn session_cookie_value(state: &AppState, cookies: &Cookies) -> Option<String> {
    cookies
        .get(&state.config.session.cookie_name)
        .map(|c| c.value().to_string())
}

/// Stores the flow state and redirects the browser to the provider.
fn begin_flow(
    state: &AppState,
    codec: &SessionCodec,
    cookies: &Cookies,
    start: crate::services::oauth::FlowStart,
) -> Result<Response> {
    let options = CookieOptions {
        max_age_seconds: codec.settings().flow_max_age_seconds,
    };
    let cookie = codec.encode(&SessionPayload::Flow(start.flow_state), options, state.now())?;
    cookies.add(cookie);
    Ok(Redirect::to(start.url.as_str()).into_response())
}

/// Starts a login: `GET /auth/login?redirectTo=/path`.
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Query(params): Query<StartParams>,
) -> Result<Response> {
    let origin = public_origin(&state.config, &headers)?;
    let callback = join(&origin, CALLBACK_PATH)?;
    let redirect_to = sanitize_redirect(params.redirect_to.as_deref());

    let start = state.oauth.start_login(&callback, &redirect_to)?;
    let codec = state.session_codec().await?;

    tracing::info!(redirect_to = %redirect_to, "🔐 Login started");
    begin_flow(&state, &codec, &cookies, start)
}

/// Starts passkey registration for the signed-in user: `GET /auth/passkey`.
pub async fn passkey(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Query(params): Query<StartParams>,
) -> Result<Response> {
    let codec = state.session_codec().await?;
    let now = state.now();
    let user = codec.decode_user(session_cookie_value(&state, &cookies).as_deref(), now);

    let origin = public_origin(&state.config, &headers)?;
    let callback = join(&origin, CALLBACK_PATH)?;
    let redirect_to = sanitize_redirect(params.redirect_to.as_deref());

    match state
        .oauth
        .start_passkey_enrollment(user.as_ref(), now, &callback, &redirect_to)
    {
        Ok(start) => begin_flow(&state, &codec, &cookies, start),
        Err(AppError::Unauthenticated) => {
            tracing::debug!("Passkey enrollment without session, sending to login");
            let target = format!(
                "{}?redirectTo={}",
                LOGIN_PATH,
                urlencoding::encode(PASSKEY_PATH)
            );
            Ok(Redirect::to(&target).into_response())
        }
        Err(e) => Err(e),
    }
}

/// Handles the provider redirect: `GET /auth/callback`.
///
/// Recoverable failures never escape: they become a redirect to the login
/// page with a short reason code.
pub async fn callback(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Response> {
    let codec = state.session_codec().await?;
    let raw = session_cookie_value(&state, &cookies);

    match complete_callback(&state, &codec, &headers, raw.as_deref(), params).await {
        Ok((user, redirect_to)) => {
            let now = state.now();
            let max_age = user
                .remaining_seconds(now)
                .min(codec.settings().session_max_age_seconds)
                .max(1);
            let cookie = codec.encode(
                &SessionPayload::User(user.clone()),
                CookieOptions { max_age_seconds: max_age },
                now,
            )?;
            cookies.add(cookie);

            tracing::info!(user_id = %user.id, "✅ Login completed");
            Ok(Redirect::to(&redirect_to).into_response())
        }
        Err(e) if e.is_recoverable() => {
            tracing::warn!(reason = e.reason_code(), error = %e, "Login callback failed");
            if codec.decode_flow(raw.as_deref(), state.now()).is_some() {
                cookies.add(codec.clear());
            }
            Ok(login_error(&state.config.login_page_path, e.reason_code()))
        }
        Err(e) => Err(e),
    }
}

async fn complete_callback(
    state: &AppState,
    codec: &SessionCodec,
    headers: &HeaderMap,
    raw_cookie: Option<&str>,
    params: CallbackParams,
) -> Result<(SessionUser, String)> {
    if let Some(error) = params.error.as_deref() {
        tracing::warn!(
            error = %error,
            description = params.error_description.as_deref().unwrap_or(""),
            "Identity provider returned an error"
        );
        return Err(AppError::OAuthProvider(sanitize_error_code(error)));
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or(AppError::MissingAuthorizationCode)?;

    let flow = codec
        .decode_flow(raw_cookie, state.now())
        .ok_or(AppError::MissingFlowState)?;

    let origin = public_origin(&state.config, headers)?;
    let callback = join(&origin, CALLBACK_PATH)?;

    let tokens = state
        .oauth
        .complete_login(&code, &flow.code_verifier, &callback)
        .await?;
    let claims = state.oauth.fetch_user_info(&tokens.access_token).await?;

    let user = claims.into_session_user(tokens, state.now());
    Ok((user, sanitize_redirect(Some(&flow.redirect_to))))
}

/// Clears the session and signs out at the provider: `GET|POST /auth/logout`.
pub async fn logout(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
) -> Result<Response> {
    cookies.add(removal_cookie(&state.config.session.cookie_name));
    tracing::info!("👋 Session cleared");

    let origin = public_origin(&state.config, &headers)?;
    let post_logout = join(&origin, &state.config.post_logout_path)?;

    match state.oauth.build_logout_url(&post_logout) {
        Ok(url) => Ok(Redirect::to(url.as_str()).into_response()),
        Err(e) => {
            tracing::error!(error = %e, "Provider logout unavailable, redirecting locally");
            Ok(Redirect::to(&state.config.post_logout_path).into_response())
        }
    }
}

/// Returns the current user's public claims: `GET /auth/me`.
pub async fn me(Extension(user): Extension<SessionUser>) -> Json<MeResponse> {
    Json(MeResponse {
        id: user.id,
        email: user.email,
        given_name: user.given_name,
        family_name: user.family_name,
        expires_at: user.expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config() -> Config {
        Config::from_lookup(|_| None).unwrap()
    }

    #[test]
    fn origin_prefers_configured_base_url() {
        let mut config = config();
        config.public_base_url = Some("https://portal.example.com/".parse().unwrap());
        let origin = public_origin(&config, &HeaderMap::new()).unwrap();
        assert_eq!(origin.as_str(), "https://portal.example.com/");
    }

    #[test]
    fn origin_from_forwarded_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("internal:3000"));
        headers.insert("x-forwarded-host", HeaderValue::from_static("portal.example.com"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));

        let origin = public_origin(&config(), &headers).unwrap();
        assert_eq!(
            join(&origin, CALLBACK_PATH).unwrap().as_str(),
            "https://portal.example.com/auth/callback"
        );
    }

    #[test]
    fn origin_without_host_is_configuration_error() {
        assert!(matches!(
            public_origin(&config(), &HeaderMap::new()),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn provider_error_codes_are_sanitized() {
        assert_eq!(sanitize_error_code("access_denied"), "access_denied");
        assert_eq!(sanitize_error_code("<script>"), "script");
        assert_eq!(sanitize_error_code("!!!"), "provider_error");
        assert_eq!(sanitize_error_code(&"a".repeat(200)).len(), MAX_ERROR_CODE_LEN);
    }
}
