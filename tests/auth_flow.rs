//! End-to-end tests of the login, callback and logout routes against a mock
//! identity provider.

use std::collections::HashMap;

use axum::http::StatusCode;
use serde_json::json;
use tower_cookies::cookie::time::Duration;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use portal_auth::crypto::pkce;
use portal_auth::models::session::SessionPayload;
use portal_auth::services::oauth::MAX_EXPIRES_IN;

mod common;
use common::*;

fn query(location: &str) -> HashMap<String, String> {
    Url::parse(location)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}

async fn mount_token_success(server: &MockServer, verifier: &str) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-1"))
        .and(body_string_contains(format!("code_verifier={}", verifier)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-token-1",
            "id_token": "id-token-1",
            "refresh_token": "refresh-token-1",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_userinfo_success(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/oauth2/userInfo"))
        .and(header("authorization", "Bearer access-token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "5f1c2d7e-user",
            "email": "marie@example.com",
            "email_verified": "true",
            "given_name": "Marie",
            "family_name": "Curie"
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn forbid_token_exchange(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(server)
        .await;
}

#[tokio::test]
async fn login_start_stores_redirect_target_in_flow_cookie() {
    let server = MockServer::start().await;
    let state = test_state(&server);

    let response = get(&state, "/auth/login?redirectTo=/protected", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let location = location(&response);
    assert!(location.starts_with(&format!("{}/oauth2/authorize?", server.uri())));
    let params = query(&location);
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["client_id"], CLIENT_ID);
    assert_eq!(params["redirect_uri"], "https://portal.example.com/auth/callback");
    assert_eq!(params["code_challenge_method"], "S256");

    let codec = codec(&state).await;
    let cookie = set_cookie(&response, codec.cookie_name()).expect("flow cookie");
    assert_ne!(cookie.http_only(), Some(true));
    assert_eq!(cookie.path(), Some("/"));

    let flow = codec
        .decode_flow(Some(cookie.value()), test_now())
        .expect("flow state decodes");
    assert_eq!(flow.redirect_to, "/protected");
    assert_eq!(params["code_challenge"], pkce::code_challenge(&flow.code_verifier));
    assert!(!location.contains(&flow.code_verifier));
}

#[tokio::test]
async fn login_start_rejects_offsite_redirect_target() {
    let server = MockServer::start().await;
    let state = test_state(&server);

    let response = get(&state, "/auth/login?redirectTo=//evil.example", None).await;
    let codec = codec(&state).await;
    let cookie = set_cookie(&response, codec.cookie_name()).unwrap();
    let flow = codec.decode_flow(Some(cookie.value()), test_now()).unwrap();
    assert_eq!(flow.redirect_to, "/");
}

#[tokio::test]
async fn login_without_client_id_is_server_error() {
    let server = MockServer::start().await;
    let mut state = test_state(&server);
    let mut config = (*state.config).clone();
    config.provider.client_id = None;
    state.oauth = std::sync::Arc::new(
        portal_auth::services::oauth::OAuthClient::new(config.provider.clone()).unwrap(),
    );
    state.config = std::sync::Arc::new(config);

    let response = get(&state, "/auth/login", None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn successful_callback_writes_session_user() {
    let server = MockServer::start().await;
    let state = test_state(&server);
    mount_token_success(&server, "verifier-xyz").await;
    mount_userinfo_success(&server).await;

    let cookie = cookie_header(&state, flow("verifier-xyz", "/protected")).await;
    let response = get(&state, "/auth/callback?code=auth-code-1", Some(&cookie)).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/protected");

    let codec = codec(&state).await;
    let session = set_cookie(&response, codec.cookie_name()).expect("session cookie");
    assert_eq!(session.http_only(), Some(true));
    assert_eq!(session.max_age(), Some(Duration::seconds(3600)));

    let user = codec
        .decode_user(Some(session.value()), test_now())
        .expect("session user decodes");
    assert_eq!(user.id, "5f1c2d7e-user");
    assert_eq!(user.email, "marie@example.com");
    assert_eq!(user.given_name, "Marie");
    assert_eq!(user.family_name, "Curie");
    assert_eq!(user.access_token, "access-token-1");
    assert_eq!(user.id_token, "id-token-1");
    assert_eq!(user.expires_at, test_now().timestamp_millis() + 3600 * 1000);
}

#[tokio::test]
async fn oversized_expires_in_is_capped() {
    let server = MockServer::start().await;
    let state = test_state(&server);
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-token-1",
            "id_token": "id-token-1",
            "expires_in": 9223372036854775807i64
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_userinfo_success(&server).await;

    let cookie = cookie_header(&state, flow("verifier-xyz", "/protected")).await;
    let response = get(&state, "/auth/callback?code=auth-code-1", Some(&cookie)).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/protected");

    let codec = codec(&state).await;
    let session = set_cookie(&response, codec.cookie_name()).expect("session cookie");
    assert_eq!(
        session.max_age(),
        Some(Duration::seconds(state.config.session.session_max_age_seconds))
    );
    let user = codec.decode_user(Some(session.value()), test_now()).unwrap();
    assert_eq!(
        user.expires_at,
        test_now().timestamp_millis() + MAX_EXPIRES_IN * 1000
    );
}

#[tokio::test]
async fn provider_error_never_reaches_token_endpoint() {
    let server = MockServer::start().await;
    let state = test_state(&server);
    forbid_token_exchange(&server).await;

    let cookie = cookie_header(&state, flow("verifier-xyz", "/")).await;
    let response = get(
        &state,
        "/auth/callback?error=access_denied&error_description=User+cancelled",
        Some(&cookie),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?error=access_denied");
}

#[tokio::test]
async fn callback_without_flow_cookie_redirects_with_missing_verifier() {
    let server = MockServer::start().await;
    let state = test_state(&server);
    forbid_token_exchange(&server).await;

    let response = get(&state, "/auth/callback?code=auth-code-1", None).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?error=missing_verifier");
}

#[tokio::test]
async fn callback_with_session_cookie_instead_of_flow_is_missing_verifier() {
    let server = MockServer::start().await;
    let state = test_state(&server);
    forbid_token_exchange(&server).await;

    let cookie = cookie_header(&state, SessionPayload::User(signed_in_user())).await;
    let response = get(&state, "/auth/callback?code=auth-code-1", Some(&cookie)).await;

    assert_eq!(location(&response), "/login?error=missing_verifier");
    let codec = codec(&state).await;
    assert!(set_cookie(&response, codec.cookie_name()).is_none());
}

#[tokio::test]
async fn callback_without_code_redirects_with_missing_code() {
    let server = MockServer::start().await;
    let state = test_state(&server);
    forbid_token_exchange(&server).await;

    let cookie = cookie_header(&state, flow("verifier-xyz", "/")).await;
    let response = get(&state, "/auth/callback", Some(&cookie)).await;

    assert_eq!(location(&response), "/login?error=missing_code");
}

#[tokio::test]
async fn rejected_exchange_clears_flow_cookie() {
    let server = MockServer::start().await;
    let state = test_state(&server);
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cookie = cookie_header(&state, flow("verifier-xyz", "/")).await;
    let response = get(&state, "/auth/callback?code=stale", Some(&cookie)).await;

    assert_eq!(location(&response), "/login?error=token_exchange_failed");
    let codec = codec(&state).await;
    let cleared = set_cookie(&response, codec.cookie_name()).expect("removal cookie");
    assert_eq!(cleared.value(), "");
    assert_eq!(cleared.max_age(), Some(Duration::ZERO));
}

#[tokio::test]
async fn token_response_without_access_token_fails_exchange() {
    let server = MockServer::start().await;
    let state = test_state(&server);
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id_token": "id-token-1",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cookie = cookie_header(&state, flow("verifier-xyz", "/")).await;
    let response = get(&state, "/auth/callback?code=auth-code-1", Some(&cookie)).await;

    assert_eq!(location(&response), "/login?error=token_exchange_failed");
}

#[tokio::test]
async fn userinfo_failure_redirects_to_login() {
    let server = MockServer::start().await;
    let state = test_state(&server);
    mount_token_success(&server, "verifier-xyz").await;
    Mock::given(method("GET"))
        .and(path("/oauth2/userInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let cookie = cookie_header(&state, flow("verifier-xyz", "/")).await;
    let response = get(&state, "/auth/callback?code=auth-code-1", Some(&cookie)).await;

    assert_eq!(location(&response), "/login?error=userinfo_failed");
}

#[tokio::test]
async fn logout_clears_session_and_redirects_to_provider() {
    let server = MockServer::start().await;
    let state = test_state(&server);

    let cookie = cookie_header(&state, SessionPayload::User(signed_in_user())).await;
    let response = get(&state, "/auth/logout", Some(&cookie)).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = location(&response);
    assert!(location.starts_with(&format!("{}/logout?", server.uri())));
    let params = query(&location);
    assert_eq!(params["client_id"], CLIENT_ID);
    assert_eq!(params["logout_uri"], PORTAL);

    let codec = codec(&state).await;
    let cleared = set_cookie(&response, codec.cookie_name()).expect("removal cookie");
    assert_eq!(cleared.max_age(), Some(Duration::ZERO));
}
