use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::get,
};
use tower_cookies::CookieManagerLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::handlers::auth::{self as auth_handlers, CALLBACK_PATH, LOGIN_PATH, PASSKEY_PATH};
use crate::middleware_layer;
use crate::state::AppState;

async fn healthz() -> &'static str {
    "ok"
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route(LOGIN_PATH, get(auth_handlers::login))
        .route(CALLBACK_PATH, get(auth_handlers::callback))
        .route(
            "/auth/logout",
            get(auth_handlers::logout).post(auth_handlers::logout),
        )
        .route(PASSKEY_PATH, get(auth_handlers::passkey))
        .route("/healthz", get(healthz))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/me", get(auth_handlers::me))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_session,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
}
