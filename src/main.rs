use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portal_auth::{AppState, Config, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        environment = ?config.environment,
        "✅ Configuration loaded successfully"
    );

    let state = AppState::new(&config).await?;

    // Fail fast in production; development falls back to the default secret.
    if let Err(e) = state.secrets.get_secret().await {
        tracing::error!("❌ Session secret unavailable: {}", e);
        return Err(e.into());
    }
    tracing::info!("✅ Session secret resolved");

    let app = router(state);

    let addr = config.bind_addr;
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
