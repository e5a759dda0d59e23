use crate::services::metrics::get_metrics;
use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": state.config.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "issuanceEnabled": state.config.phase.issuance_enabled,
        "consumptionEnabled": state.config.phase.consumption_enabled,
    }))
}

/// Ready once both stores answer.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let contracts = state.pipeline.registry().phase("readiness-check").await;
    let leases = state.leases.list_for_ingest("readiness-check").await;
    match (contracts, leases) {
        (Ok(_), Ok(_)) => StatusCode::OK,
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}
