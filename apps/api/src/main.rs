mod ai;
mod analytics;
mod auth;
mod billing;
mod calendar;
mod challenges;
mod config;
mod cv;
mod db;
mod errors;
mod interviews;
mod livekit;
mod llm_client;
mod models;
mod notifications;
mod recordings;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("jobprep_api={},tower_http=info", &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting JobPrep API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL and apply migrations
    let db = create_pool(&config.database_url).await?;

    // LLM, mailer and optional integrations
    let state = AppState::from_config(config.clone(), db).await?;

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins to APP_URL once the frontend domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
