use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::services::oauth::OAuthClient;
use crate::services::secrets::{AwsSecretStore, SecretProvider, SecretStore};
use crate::services::session::SessionCodec;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Arc<Config>,
    /// Identity provider client.
    pub oauth: Arc<OAuthClient>,
    /// Session secret, resolved once per process.
    pub secrets: SecretProvider,
    /// Time source for cookie and token expiry.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// The AWS client is only built when a secret ARN is configured.
    pub async fn new(config: &Config) -> Result<Self> {
        let oauth = OAuthClient::new(config.provider.clone())?;
        tracing::info!("✅ OAuth client initialized");

        let store: Option<Arc<dyn SecretStore>> = match config.secret.arn {
            Some(_) => Some(Arc::new(AwsSecretStore::from_env().await)),
            None => None,
        };
        let secrets = SecretProvider::new(config.secret.clone(), store);
        tracing::info!("✅ Secret provider initialized");

        Ok(Self::from_parts(config.clone(), oauth, secrets, Arc::new(SystemClock)))
    }

    /// Assembles state from already-built parts.
    pub fn from_parts(
        config: Config,
        oauth: OAuthClient,
        secrets: SecretProvider,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            oauth: Arc::new(oauth),
            secrets,
            clock,
        }
    }

    /// Codec keyed with the process session secret.
    pub async fn session_codec(&self) -> Result<SessionCodec> {
        let secret = self.secrets.get_secret().await?;
        Ok(SessionCodec::new(&secret, self.config.session.clone()))
    }

    /// Current time according to the state's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
