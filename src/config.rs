use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;
use zeroize::Zeroizing;

/// Signing key used outside production when nothing else is configured.
pub const DEVELOPMENT_SESSION_SECRET: &str = "portal-development-session-secret";

/// Default lifetime of the flow-state cookie (login in progress).
pub const DEFAULT_FLOW_MAX_AGE_SECONDS: i64 = 10 * 60;
/// Upper bound for the session cookie lifetime.
pub const DEFAULT_SESSION_MAX_AGE_SECONDS: i64 = 12 * 60 * 60;
/// Longest cookie lifetime browsers honour (400 days).
pub const MAX_COOKIE_MAX_AGE_SECONDS: i64 = 400 * 24 * 60 * 60;

/// Deployment environment, resolved once from `APP_ENV`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("production") | Some("prod") => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// What the secret provider does when neither an inline secret nor an ARN is configured.
#[derive(Clone)]
pub enum FallbackPolicy {
    /// Fail with `SecretUnavailable`.
    Fail,
    /// Log a warning and sign with the given value.
    UseDefault(Zeroizing<String>),
}

/// Identity provider endpoints and client registration.
///
/// Everything is optional here: the flow driver reports a configuration
/// error at call time when a required piece is absent.
#[derive(Clone)]
pub struct ProviderConfig {
    /// Hosted UI base, e.g. `https://portal.auth.eu-west-1.amazoncognito.com`.
    pub domain: Option<Url>,
    pub client_id: Option<String>,
    pub client_secret: Option<Zeroizing<String>>,
    pub authorize_url: Option<Url>,
    pub token_url: Option<Url>,
    pub userinfo_url: Option<Url>,
    pub logout_url: Option<Url>,
    pub passkey_url: Option<Url>,
    pub scopes: Vec<String>,
    /// Timeout applied to every outbound provider call.
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            domain: None,
            client_id: None,
            client_secret: None,
            authorize_url: None,
            token_url: None,
            userinfo_url: None,
            logout_url: None,
            passkey_url: None,
            scopes: vec!["openid".into(), "email".into(), "profile".into()],
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Cookie attributes shared by every session codec operation.
#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub cookie_name: String,
    /// Adds the `Secure` attribute.
    pub secure: bool,
    /// Encrypts the payload in addition to signing it.
    pub encrypt: bool,
    pub flow_max_age_seconds: i64,
    pub session_max_age_seconds: i64,
}

impl SessionSettings {
    /// Settings matching the given environment.
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            cookie_name: "portal_session".into(),
            secure: environment.is_production(),
            encrypt: environment.is_production(),
            flow_max_age_seconds: DEFAULT_FLOW_MAX_AGE_SECONDS,
            session_max_age_seconds: DEFAULT_SESSION_MAX_AGE_SECONDS,
        }
    }
}

/// Where the session signing secret comes from.
#[derive(Clone)]
pub struct SecretConfig {
    /// Inline value, takes precedence over the store.
    pub value: Option<Zeroizing<String>>,
    /// Secret store identifier.
    pub arn: Option<String>,
    /// When set, the stored secret is a JSON object and this key holds the value.
    pub json_key: Option<String>,
    pub fallback: FallbackPolicy,
}

impl SecretConfig {
    /// Fallback policy matching the given environment.
    pub fn fallback_for(environment: Environment) -> FallbackPolicy {
        if environment.is_production() {
            FallbackPolicy::Fail
        } else {
            FallbackPolicy::UseDefault(Zeroizing::new(DEVELOPMENT_SESSION_SECRET.to_string()))
        }
    }
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    pub environment: Environment,
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Public origin of the portal; derived from request headers when absent.
    pub public_base_url: Option<Url>,
    /// Page users land on when a login attempt fails.
    pub login_page_path: String,
    /// Local path the provider sends users back to after logout.
    pub post_logout_path: String,
    pub provider: ProviderConfig,
    pub session: SessionSettings,
    pub secret: SecretConfig,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Creates a new `Config` from an arbitrary variable source.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_url = |key: &str| -> Result<Option<Url>> {
            get(key)
                .map(|raw| Url::parse(raw.trim()).with_context(|| format!("{key} must be a valid URL")))
                .transpose()
        };

        let environment = Environment::parse(get("APP_ENV").as_deref());

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| "127.0.0.1:3000".to_string())
            .parse()
            .context("Invalid BIND_ADDR")?;

        let mut provider = ProviderConfig {
            domain: get_url("AUTH_DOMAIN")?,
            client_id: get("AUTH_CLIENT_ID"),
            client_secret: get("AUTH_CLIENT_SECRET").map(Zeroizing::new),
            authorize_url: get_url("AUTH_AUTHORIZE_URL")?,
            token_url: get_url("AUTH_TOKEN_URL")?,
            userinfo_url: get_url("AUTH_USERINFO_URL")?,
            logout_url: get_url("AUTH_LOGOUT_URL")?,
            passkey_url: get_url("AUTH_PASSKEY_URL")?,
            ..ProviderConfig::default()
        };
        if let Some(scopes) = get("AUTH_SCOPES") {
            provider.scopes = scopes
                .split([',', ' '])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(timeout) = get("AUTH_REQUEST_TIMEOUT_SECONDS") {
            provider.request_timeout = Duration::from_secs(
                timeout.parse().context("Invalid AUTH_REQUEST_TIMEOUT_SECONDS")?,
            );
        }

        let mut session = SessionSettings::for_environment(environment);
        if let Some(name) = get("SESSION_COOKIE_NAME") {
            session.cookie_name = name;
        }
        if let Some(max_age) = get("FLOW_MAX_AGE_SECONDS") {
            session.flow_max_age_seconds = max_age.parse().context("Invalid FLOW_MAX_AGE_SECONDS")?;
        }
        if let Some(max_age) = get("SESSION_MAX_AGE_SECONDS") {
            session.session_max_age_seconds =
                max_age.parse().context("Invalid SESSION_MAX_AGE_SECONDS")?;
        }
        for max_age in [session.flow_max_age_seconds, session.session_max_age_seconds] {
            if !(1..=MAX_COOKIE_MAX_AGE_SECONDS).contains(&max_age) {
                anyhow::bail!(
                    "Cookie max-age values must be between 1 and {} seconds",
                    MAX_COOKIE_MAX_AGE_SECONDS
                );
            }
        }

        let secret = SecretConfig {
            value: get("SESSION_SECRET").map(Zeroizing::new),
            arn: get("SESSION_SECRET_ARN"),
            json_key: get("SESSION_SECRET_JSON_KEY"),
            fallback: SecretConfig::fallback_for(environment),
        };

        Ok(Self {
            environment,
            bind_addr,
            public_base_url: get_url("PUBLIC_BASE_URL")?,
            login_page_path: get("LOGIN_PAGE_PATH").unwrap_or_else(|| "/login".to_string()),
            post_logout_path: get("POST_LOGOUT_PATH").unwrap_or_else(|| "/".to_string()),
            provider,
            session,
            secret,
        })
    }
}
