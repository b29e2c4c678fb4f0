use axum::{extract::State, Json};
use serde::Serialize;

use crate::config::FeatureStatus;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
    pub features: FeatureStatus,
}

/// GET /health
/// Returns service version and which optional integrations are configured.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        service: "jobprep-api",
        features: state.config.features(),
    })
}
