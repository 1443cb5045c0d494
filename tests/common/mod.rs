//! Shared fixtures for router-level tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, header};
use chrono::{DateTime, TimeZone, Utc};
use tower::ServiceExt;
use tower_cookies::Cookie;
use wiremock::MockServer;
use zeroize::Zeroizing;

use portal_auth::clock::FixedClock;
use portal_auth::config::Config;
use portal_auth::models::session::{FlowState, SessionPayload, SessionUser};
use portal_auth::services::oauth::OAuthClient;
use portal_auth::services::secrets::SecretProvider;
use portal_auth::services::session::{CookieOptions, SessionCodec};
use portal_auth::{AppState, router};

pub const PORTAL: &str = "https://portal.example.com/";
pub const CLIENT_ID: &str = "client-123";

/// The instant every test runs at.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 15, 9, 30, 0).unwrap()
}

/// State pointed at `server` as the identity provider, with a pinned clock.
pub fn test_state(server: &MockServer) -> AppState {
    let mut config = Config::from_lookup(|_| None).unwrap();
    config.public_base_url = Some(PORTAL.parse().unwrap());
    config.provider.domain = Some(server.uri().parse().unwrap());
    config.provider.client_id = Some(CLIENT_ID.into());
    config.secret.value = Some(Zeroizing::new("integration-test-secret".into()));

    let oauth = OAuthClient::new(config.provider.clone()).unwrap();
    let secrets = SecretProvider::new(config.secret.clone(), None);
    AppState::from_parts(config, oauth, secrets, Arc::new(FixedClock::new(test_now())))
}

pub async fn codec(state: &AppState) -> SessionCodec {
    state.session_codec().await.unwrap()
}

/// Cookie header value carrying `payload`, as a browser would send it back.
pub async fn cookie_header(state: &AppState, payload: SessionPayload) -> String {
    let codec = codec(state).await;
    let value = codec
        .encode_value(&payload, CookieOptions { max_age_seconds: 600 }, test_now())
        .unwrap();
    format!("{}={}", codec.cookie_name(), value)
}

pub fn flow(verifier: &str, redirect_to: &str) -> SessionPayload {
    SessionPayload::Flow(FlowState {
        code_verifier: verifier.into(),
        redirect_to: redirect_to.into(),
    })
}

pub fn signed_in_user() -> SessionUser {
    SessionUser {
        id: "5f1c2d7e-user".into(),
        email: "marie@example.com".into(),
        given_name: "Marie".into(),
        family_name: "Curie".into(),
        access_token: "access-token-1".into(),
        id_token: "id-token-1".into(),
        expires_at: test_now().timestamp_millis() + 30 * 60 * 1000,
    }
}

/// Sends a GET through the full router.
pub async fn get(state: &AppState, uri: &str, cookie: Option<&str>) -> Response<Body> {
    let mut request = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    router(state.clone())
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub fn location(response: &Response<Body>) -> String {
    response.headers()[header::LOCATION]
        .to_str()
        .unwrap()
        .to_string()
}

/// The `Set-Cookie` for `name`, if the response sets one.
pub fn set_cookie(response: &Response<Body>, name: &str) -> Option<Cookie<'static>> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| Cookie::parse(v.to_string()).ok())
        .find(|c| c.name() == name)
}
