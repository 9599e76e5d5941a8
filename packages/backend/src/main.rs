// packages/backend/src/main.rs
use anyhow::Context;
use livepoll::{build_router, config::Config, init_tracing, setup_shared_state};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::new());
    init_tracing(&config.log_filter);
    info!("🚀 Starting livepoll");

    let state = setup_shared_state(config.clone())?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("🚀 Survey server is running at http://{}", config.bind_addr);
    axum::serve(listener, app).await.context("Server failed")?;
    Ok(())
}
