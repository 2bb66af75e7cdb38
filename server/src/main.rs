use tokio::net::TcpListener;
use tracing::info;

use relay_server::{app, config::ServerConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting voice relay...");

    // Missing secrets are fatal: nothing below works without them
    let config = ServerConfig::from_env()?;

    info!(
        "Server configuration loaded: retry={}x{}ms, upstream_timeout={}s, max_audio={} bytes",
        config.retry_max_attempts,
        config.retry_delay_ms,
        config.upstream_timeout_secs,
        config.max_audio_bytes
    );
    match &config.output_dir {
        Some(dir) => info!("Generated audio will be saved under {}", dir.display()),
        None => info!("OUTPUT_DIR not set, generated audio is not saved"),
    }

    let listener = TcpListener::bind(config.bind_addr()).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind {}:{}: {e}. Try a different PORT.",
            config.host,
            config.port
        )
    })?;

    let state = AppState::new(config)?;
    let app = app(state);

    info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
