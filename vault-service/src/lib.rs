pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

use crate::config::VaultConfig;
use crate::models::{IngestContracts, Lease};
use crate::services::{
    AuditLog, AuditSink, ConsumeGate, IngestPipeline, KeyValueStore, KeyedLocks,
    LeaseController, PhaseRegistry, SecretVault,
};
use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: VaultConfig,
    pub pipeline: IngestPipeline,
    pub leases: LeaseController,
    pub consume: ConsumeGate,
}

impl AppState {
    /// Wire the pipeline from its collaborators. Every component shares one
    /// registry and one lock table.
    pub fn new(
        config: VaultConfig,
        contracts: Arc<dyn KeyValueStore<IngestContracts>>,
        leases: Arc<dyn KeyValueStore<Lease>>,
        vault: Arc<dyn SecretVault>,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Self {
        let registry = PhaseRegistry::new(contracts, Arc::new(KeyedLocks::new()));
        let audit = AuditLog::new(audit_sink);

        let pipeline = IngestPipeline::new(registry.clone(), audit.clone());
        let lease_controller = LeaseController::new(
            registry.clone(),
            leases.clone(),
            vault,
            audit.clone(),
            config.phase.clone(),
            config.lease.clone(),
        );
        let consume = ConsumeGate::new(
            registry,
            leases,
            audit,
            config.phase.consumption_enabled,
        );

        Self {
            config,
            pipeline,
            leases: lease_controller,
            consume,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        // Phase registry
        .route("/ingest/:id/scan", post(handlers::register_scan))
        .route("/ingest/:id/eligibility", post(handlers::evaluate_eligibility))
        .route("/ingest/:id/bind", post(handlers::bind))
        .route("/ingest/:id/scan/result", get(handlers::scan_result))
        .route("/ingest/:id/eligibility/result", get(handlers::eligibility_result))
        .route("/ingest/:id/bind/result", get(handlers::bind_result))
        // Leases
        .route("/ingest/:id/lease", post(handlers::issue_lease))
        .route("/ingest/:id/leases", get(handlers::list_leases))
        .route("/lease/:id", get(handlers::get_lease))
        .route("/lease/:id/revoke", post(handlers::revoke_lease))
        .route("/lease/:id/consume", post(handlers::consume_lease))
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    requester = tracing::field::Empty,
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
}
