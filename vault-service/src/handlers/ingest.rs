use crate::dtos::{
    parse_optional_body, BindRequest, BindResponse, ContractEnvelope, LeaseListResponse,
    ScanRegisteredResponse,
};
use crate::models::{BindDecision, EligibilityDecision, PhaseRecord, ScanReport};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;

pub async fn register_scan(
    State(state): State<AppState>,
    Path(ingest_id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<ScanRegisteredResponse>), AppError> {
    let report = match parse_optional_body::<ScanReport>(&body, "scan report") {
        Ok(report) => report,
        Err(reason) => return Err(state.pipeline.reject_scan(&ingest_id, &reason).await.into()),
    };

    let record = state
        .pipeline
        .register_scan(&ingest_id, report, Utc::now())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ScanRegisteredResponse::new(&ingest_id, &record)),
    ))
}

pub async fn evaluate_eligibility(
    State(state): State<AppState>,
    Path(ingest_id): Path<String>,
) -> Result<Json<PhaseRecord<EligibilityDecision>>, AppError> {
    let record = state
        .pipeline
        .evaluate_eligibility(&ingest_id, Utc::now())
        .await?;
    Ok(Json(record))
}

pub async fn bind(
    State(state): State<AppState>,
    Path(ingest_id): Path<String>,
    body: Bytes,
) -> Result<Json<BindResponse>, AppError> {
    let request = match parse_optional_body::<BindRequest>(&body, "bind request") {
        Ok(request) => request.unwrap_or_default(),
        Err(reason) => return Err(state.pipeline.reject_bind(&ingest_id, &reason).await.into()),
    };
    let (context, inline) = request.into_parts();
    let record = state
        .pipeline
        .bind(&ingest_id, context, inline, Utc::now())
        .await?;
    Ok(Json(BindResponse::new(&ingest_id, record)))
}

pub async fn scan_result(
    State(state): State<AppState>,
    Path(ingest_id): Path<String>,
) -> Result<Json<ContractEnvelope<ScanReport>>, AppError> {
    let record = state.pipeline.registry().scan(&ingest_id).await?;
    envelope(&ingest_id, record)
}

pub async fn eligibility_result(
    State(state): State<AppState>,
    Path(ingest_id): Path<String>,
) -> Result<Json<ContractEnvelope<EligibilityDecision>>, AppError> {
    let record = state.pipeline.registry().eligibility(&ingest_id).await?;
    envelope(&ingest_id, record)
}

pub async fn bind_result(
    State(state): State<AppState>,
    Path(ingest_id): Path<String>,
) -> Result<Json<ContractEnvelope<BindDecision>>, AppError> {
    let record = state.pipeline.registry().bind(&ingest_id).await?;
    envelope(&ingest_id, record)
}

fn envelope<T: serde::Serialize>(
    ingest_id: &str,
    record: PhaseRecord<T>,
) -> Result<Json<ContractEnvelope<T>>, AppError> {
    ContractEnvelope::new(ingest_id, record, Utc::now())
        .map(Json)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to hash contract: {}", e)))
}

pub async fn list_leases(
    State(state): State<AppState>,
    Path(ingest_id): Path<String>,
) -> Result<Json<LeaseListResponse>, AppError> {
    let leases = state.leases.list_for_ingest(&ingest_id).await?;
    Ok(Json(LeaseListResponse { ingest_id, leases }))
}
