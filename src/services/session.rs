//! Signed, optionally encrypted cookie codec for login flow state and
//! authenticated sessions.
//!
//! Wire format: `base64url(body) "." base64url(HMAC-SHA256(body))`, where
//! `body` is a mode byte followed by either the JSON envelope or its
//! AES-256-GCM sealed form. The envelope carries its own expiry so a
//! replayed cookie stops decoding once its max-age has passed, whatever
//! the browser does with `Max-Age`.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_cookies::Cookie;
use tower_cookies::cookie::SameSite;
use tower_cookies::cookie::time::Duration;

use crate::config::SessionSettings;
use crate::crypto::aes::{self, SecureKey};
use crate::crypto::signing::{self, SigningKey};
use crate::error::{AppError, Result};
use crate::models::session::{FlowState, SessionPayload, SessionUser};
use crate::services::secrets::SessionSecret;

/// Browsers drop cookies larger than this.
const MAX_COOKIE_BYTES: usize = 4096;

const MODE_PLAIN: u8 = 1;
const MODE_SEALED: u8 = 2;

/// Per-cookie attributes chosen by the caller.
#[derive(Debug, Clone, Copy)]
pub struct CookieOptions {
    pub max_age_seconds: i64,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "p")]
    payload: SessionPayload,
    /// Expiry in epoch seconds.
    #[serde(rename = "exp")]
    expires: i64,
}

/// Encodes and decodes the session cookie.
///
/// Built per request from the resolved session secret; holds only derived keys.
#[derive(Clone)]
pub struct SessionCodec {
    signing: SigningKey,
    encryption: SecureKey,
    settings: SessionSettings,
}

impl SessionCodec {
    /// Creates a codec whose keys are derived from `secret`.
    pub fn new(secret: &SessionSecret, settings: SessionSettings) -> Self {
        let (signing, encryption) = signing::derive_keys(secret.expose());
        Self {
            signing,
            encryption,
            settings,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.settings.cookie_name
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Serializes, optionally encrypts, and signs `payload`.
    pub fn encode_value(
        &self,
        payload: &SessionPayload,
        options: CookieOptions,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let envelope = Envelope {
            payload: payload.clone(),
            expires: now.timestamp().saturating_add(options.max_age_seconds),
        };
        let json = sonic_rs::to_vec(&envelope)
            .map_err(|e| AppError::Internal(format!("Session serialization failed: {}", e)))?;

        let mut body = Vec::with_capacity(json.len() + 29);
        if self.settings.encrypt {
            body.push(MODE_SEALED);
            body.extend_from_slice(&aes::seal(&self.encryption, &json)?);
        } else {
            body.push(MODE_PLAIN);
            body.extend_from_slice(&json);
        }

        let tag = self.signing.sign(&body);
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&body),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Builds the `Set-Cookie` for `payload`.
    ///
    /// Flow state stays script-readable; session users are `HttpOnly`.
    pub fn encode(
        &self,
        payload: &SessionPayload,
        options: CookieOptions,
        now: DateTime<Utc>,
    ) -> Result<Cookie<'static>> {
        let value = self.encode_value(payload, options, now)?;
        if value.len() + self.settings.cookie_name.len() > MAX_COOKIE_BYTES {
            tracing::warn!(
                bytes = value.len(),
                "⚠️  Session cookie exceeds browser size limit"
            );
        }

        let mut cookie = Cookie::new(self.settings.cookie_name.clone(), value);
        cookie.set_path("/");
        cookie.set_same_site(SameSite::Lax);
        cookie.set_secure(self.settings.secure);
        cookie.set_http_only(payload.http_only());
        cookie.set_max_age(Duration::seconds(options.max_age_seconds));
        Ok(cookie)
    }

    /// Verifies and opens a cookie value.
    ///
    /// Absence, tampering, corruption and expiry all yield `None`; callers
    /// cannot tell them apart.
    pub fn decode(&self, value: Option<&str>, now: DateTime<Utc>) -> Option<SessionPayload> {
        let value = value?;
        let (body_b64, tag_b64) = value.split_once('.')?;
        let body = URL_SAFE_NO_PAD.decode(body_b64).ok()?;
        let tag = URL_SAFE_NO_PAD.decode(tag_b64).ok()?;

        if !self.signing.verify(&body, &tag) {
            tracing::debug!("Session cookie signature mismatch");
            return None;
        }

        let (mode, rest) = body.split_first()?;
        let json = match *mode {
            MODE_PLAIN => rest.to_vec(),
            MODE_SEALED => aes::open(&self.encryption, rest).ok()?,
            _ => return None,
        };

        let envelope: Envelope = sonic_rs::from_slice(&json).ok()?;
        if envelope.expires <= now.timestamp() {
            tracing::debug!("Session cookie expired");
            return None;
        }
        Some(envelope.payload)
    }

    /// Decodes and keeps only a flow state.
    pub fn decode_flow(&self, value: Option<&str>, now: DateTime<Utc>) -> Option<FlowState> {
        match self.decode(value, now)? {
            SessionPayload::Flow(flow) => Some(flow),
            SessionPayload::User(_) => None,
        }
    }

    /// Decodes and keeps only a session user whose tokens are still valid.
    pub fn decode_user(&self, value: Option<&str>, now: DateTime<Utc>) -> Option<SessionUser> {
        match self.decode(value, now)? {
            SessionPayload::User(user) if !user.is_expired_at(now) => Some(user),
            _ => None,
        }
    }

    /// Removal cookie for the session.
    pub fn clear(&self) -> Cookie<'static> {
        removal_cookie(&self.settings.cookie_name)
    }
}

/// Expires the cookie named `name`; needs no secret.
pub fn removal_cookie(name: &str) -> Cookie<'static> {
    let mut cookie = Cookie::new(name.to_string(), "");
    cookie.set_path("/");
    cookie.set_max_age(Duration::seconds(0));
    cookie
}
