use std::sync::Arc;

use async_trait::async_trait;
use sonic_rs::JsonValueTrait;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

use crate::config::{FallbackPolicy, SecretConfig};
use crate::error::{AppError, Result};

/// The key the session codec signs and encrypts with.
///
/// Cheap to clone; the value is zeroized when the last clone drops.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionSecret(Arc<Zeroizing<String>>);

impl SessionSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Arc::new(Zeroizing::new(value.into())))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionSecret([redacted])")
    }
}

/// Read access to a managed secret store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Returns the current string value of the secret identified by `secret_id`.
    async fn get_secret_string(&self, secret_id: &str) -> Result<String>;
}

/// Secret store backed by AWS Secrets Manager.
#[derive(Debug, Clone)]
pub struct AwsSecretStore {
    client: aws_sdk_secretsmanager::Client,
}

impl AwsSecretStore {
    /// Creates a store using the ambient AWS credentials and region.
    pub async fn from_env() -> Self {
        let sdk_config = aws_config::load_from_env().await;
        tracing::info!(
            region = ?sdk_config.region(),
            "✅ AWS Secrets Manager client initialized"
        );
        Self {
            client: aws_sdk_secretsmanager::Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl SecretStore for AwsSecretStore {
    async fn get_secret_string(&self, secret_id: &str) -> Result<String> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|e| {
                AppError::SecretUnavailable(format!(
                    "Failed to read secret '{}': {}",
                    secret_id,
                    aws_sdk_secretsmanager::error::DisplayErrorContext(&e)
                ))
            })?;

        if let Some(value) = output.secret_string() {
            return Ok(value.to_string());
        }
        output
            .secret_binary()
            .and_then(|blob| String::from_utf8(blob.as_ref().to_vec()).ok())
            .ok_or_else(|| {
                AppError::SecretUnavailable(format!(
                    "Secret '{}' has no string value",
                    secret_id
                ))
            })
    }
}

/// Resolves the session secret once and keeps it for the life of the process.
///
/// Constructed at startup and cloned into whatever needs the secret. The
/// cache lock is never held across a fetch: concurrent first calls may each
/// fetch, and the first value written wins.
#[derive(Clone)]
pub struct SecretProvider {
    config: SecretConfig,
    store: Option<Arc<dyn SecretStore>>,
    cache: Arc<RwLock<Option<SessionSecret>>>,
}

impl SecretProvider {
    /// Creates a new `SecretProvider`.
    ///
    /// # Arguments
    ///
    /// * `config` - Inline value, ARN and fallback policy.
    /// * `store` - Store used when only an ARN is configured.
    pub fn new(config: SecretConfig, store: Option<Arc<dyn SecretStore>>) -> Self {
        Self {
            config,
            store,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Returns the session secret, resolving it on first use.
    ///
    /// No TTL and no refresh: rotating the secret requires a restart.
    pub async fn get_secret(&self) -> Result<SessionSecret> {
        if let Some(secret) = self.cache.read().await.clone() {
            return Ok(secret);
        }

        let resolved = self.resolve().await?;
        let mut cache = self.cache.write().await;
        Ok(cache.get_or_insert(resolved).clone())
    }

    async fn resolve(&self) -> Result<SessionSecret> {
        if let Some(value) = &self.config.value {
            tracing::debug!("Session secret resolved from configuration");
            return Ok(SessionSecret::new(value.as_str()));
        }

        if let Some(arn) = &self.config.arn {
            let store = self.store.as_ref().ok_or_else(|| {
                AppError::SecretUnavailable("Secret ARN configured without a secret store".into())
            })?;
            let raw = Zeroizing::new(store.get_secret_string(arn).await?);
            let value = self.extract(&raw)?;
            tracing::info!("✅ Session secret loaded from secret store");
            return Ok(SessionSecret::new(value));
        }

        match &self.config.fallback {
            FallbackPolicy::Fail => Err(AppError::SecretUnavailable(
                "Neither SESSION_SECRET nor SESSION_SECRET_ARN is configured".into(),
            )),
            FallbackPolicy::UseDefault(value) => {
                tracing::warn!("⚠️  No session secret configured, using development default");
                Ok(SessionSecret::new(value.as_str()))
            }
        }
    }

    /// Applies the optional JSON key and rejects empty values.
    fn extract(&self, raw: &str) -> Result<String> {
        let value = match &self.config.json_key {
            None => raw.to_string(),
            Some(key) => {
                let document: sonic_rs::Value = sonic_rs::from_str(raw).map_err(|_| {
                    AppError::SecretUnavailable("Stored secret is not valid JSON".into())
                })?;
                document
                    .get(key.as_str())
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        AppError::SecretUnavailable(format!("Stored secret has no '{}' field", key))
                    })?
            }
        };

        if value.is_empty() {
            return Err(AppError::SecretUnavailable("Stored secret is empty".into()));
        }
        Ok(value)
    }
}
