mod catalog;
mod config;
mod error;
mod extract;
mod fallback;
mod model;
mod recommend;
mod server;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use recommend::Recommender;
use server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting product-advisor");

    let config = Config::from_env()?;
    info!(
        listen = %config.listen_addr(),
        model = %config.gemini.model,
        model_timeout_ms = config.gemini.timeout.as_millis(),
        search_timeout_ms = config.search.timeout.as_millis(),
        "configuration loaded"
    );
    if config.search.api_key.is_none() {
        warn!("SERPAPI_KEY not set, web search disabled");
    }
    if config.gemini.api_key.is_none() {
        warn!("GEMINI_API_KEY not set, recommendation requests will fail");
    }

    let recommender = Recommender::from_config(&config)?;
    let catalog = catalog::default_catalog();
    info!(products = catalog.len(), "catalog loaded");

    let app = server::router(AppState::new(recommender, catalog));
    let listener = TcpListener::bind(config.listen_addr()).await?;
    info!(addr = %listener.local_addr()?, "HTTP server ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .inspect_err(|e| tracing::error!(error = %e, "HTTP server error"))?;

    info!("HTTP server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
