use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transient state held between starting a login and its callback.
///
/// Consumed by the callback: the cookie carrying it is replaced with the
/// session cookie, never reused.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FlowState {
    pub code_verifier: String,
    /// Local path to return to once the login completes.
    pub redirect_to: String,
}

impl std::fmt::Debug for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowState")
            .field("code_verifier", &"[redacted]")
            .field("redirect_to", &self.redirect_to)
            .finish()
    }
}

/// The authenticated identity and tokens carried by the session cookie.
///
/// Replaced wholesale on re-login, never mutated in place.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionUser {
    /// Identity provider subject.
    pub id: String,
    pub email: String,
    pub given_name: String,
    pub family_name: String,
    pub access_token: String,
    pub id_token: String,
    /// Token expiry in epoch milliseconds.
    pub expires_at: i64,
}

impl std::fmt::Debug for SessionUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionUser")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("given_name", &self.given_name)
            .field("family_name", &self.family_name)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl SessionUser {
    /// Whether the tokens in this session have expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now.timestamp_millis()
    }

    /// Seconds until expiry, floored at zero.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at.saturating_sub(now.timestamp_millis()) / 1000).max(0)
    }
}

/// The two mutually exclusive shapes a session cookie can hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionPayload {
    Flow(FlowState),
    User(SessionUser),
}

impl SessionPayload {
    /// Flow state cookies stay readable by client scripts; session cookies do not.
    pub fn http_only(&self) -> bool {
        matches!(self, SessionPayload::User(_))
    }
}

impl From<FlowState> for SessionPayload {
    fn from(flow: FlowState) -> Self {
        SessionPayload::Flow(flow)
    }
}

impl From<SessionUser> for SessionPayload {
    fn from(user: SessionUser) -> Self {
        SessionPayload::User(user)
    }
}
