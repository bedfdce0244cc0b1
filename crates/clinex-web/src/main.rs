//! Clinex Web Server
//!
//! Run with: cargo run -p clinex-web

use clinex_config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .init();

    info!("Starting Clinex NER server...");

    let config = Config::load()?;
    info!(
        "Model {} (load policy {:?}, default threshold {})",
        config.model.model_id, config.model.load_policy, config.extraction.default_threshold
    );

    // Under the eager policy a load failure ends the process here
    let state = clinex_web::state::AppState::from_config(&config).await?;

    let app = clinex_web::router::build_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
