use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use tower_cookies::Cookies;

use crate::{
    error::AppError,
    services::session::removal_cookie,
    state::AppState,
};

/// A middleware that requires a valid, unexpired session cookie.
///
/// On success the decoded `SessionUser` is inserted into the request
/// extensions. A cookie that is present but does not decode to a live
/// session is cleared.
pub async fn require_session(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    tracing::debug!("🔐 Checking session...");

    let cookie_name = &state.config.session.cookie_name;
    let raw = cookies.get(cookie_name).map(|c| c.value().to_string());
    if raw.is_none() {
        tracing::debug!("No session cookie found");
        return Err(AppError::Unauthenticated);
    }

    let codec = state.session_codec().await?;
    let user = match codec.decode_user(raw.as_deref(), state.now()) {
        Some(user) => user,
        None => {
            tracing::debug!("Session cookie invalid or expired, clearing");
            cookies.add(removal_cookie(cookie_name));
            return Err(AppError::Unauthenticated);
        }
    };

    tracing::debug!("✅ User authenticated: {}", user.id);

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}
