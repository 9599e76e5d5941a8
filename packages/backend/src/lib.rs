// packages/backend/src/lib.rs
pub mod answer_store;
pub mod config;
pub mod error;
pub mod http_handlers;
pub mod hub;
pub mod leaderboard;
pub mod session;
pub mod slide_cursor;
pub mod socket_handlers;
pub mod types;

use axum::{
    routing::{get, post},
    Router,
};
use config::Config;
use session::Session;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone)]
pub struct ServerState {
    pub session: Arc<Session>,
    pub config: Arc<Config>,
}

pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub fn setup_shared_state(config: Arc<Config>) -> anyhow::Result<ServerState> {
    // Survey file is required at startup; a bad one aborts the boot
    let survey = config.load_survey()?;
    let session = Arc::new(Session::new(survey, &config));
    Ok(ServerState { session, config })
}

pub fn build_router(state: ServerState) -> Router {
    Router::new()
        // participant
        .route("/survey/{token}", get(http_handlers::survey_handler))
        .route("/submit/{token}", post(http_handlers::submit_handler))
        .route("/results/{token}", get(http_handlers::results_handler))
        .route("/highscores", get(http_handlers::highscores_handler))
        .route("/ws", get(socket_handlers::ws_handler))
        // presenter
        .route("/nextSlide", post(http_handlers::next_slide_handler))
        .route("/reset", post(http_handlers::reset_handler))
        .route("/stats", get(http_handlers::stats_handler))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
