use crate::dtos::{parse_optional_body, ConsumeLeaseRequest, IssueLeaseRequest};
use crate::middleware::{ConsumerHeaders, Requester};
use crate::models::Lease;
use crate::services::{ConsumeGrant, ConsumeRequest};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;

pub async fn issue_lease(
    State(state): State<AppState>,
    Path(ingest_id): Path<String>,
    Requester(requester): Requester,
    body: Bytes,
) -> Result<(StatusCode, Json<Lease>), AppError> {
    let request = match parse_optional_body::<IssueLeaseRequest>(&body, "lease request") {
        Ok(request) => request.unwrap_or_default(),
        Err(reason) => {
            let err = state
                .leases
                .reject_request(&ingest_id, requester.as_deref(), &reason)
                .await;
            return Err(err.into());
        }
    };
    let lease = state
        .leases
        .issue(&ingest_id, requester.as_deref(), request.into(), Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(lease)))
}

pub async fn revoke_lease(
    State(state): State<AppState>,
    Path(lease_id): Path<String>,
    Requester(requester): Requester,
) -> Result<Json<Lease>, AppError> {
    let lease = state
        .leases
        .revoke(&lease_id, requester.as_deref(), Utc::now())
        .await?;
    Ok(Json(lease))
}

pub async fn get_lease(
    State(state): State<AppState>,
    Path(lease_id): Path<String>,
) -> Result<Json<Lease>, AppError> {
    let lease = state.leases.check_usable(&lease_id, Utc::now()).await?;
    Ok(Json(lease))
}

pub async fn consume_lease(
    State(state): State<AppState>,
    Path(lease_id): Path<String>,
    headers: ConsumerHeaders,
    body: Bytes,
) -> Result<Json<ConsumeGrant>, AppError> {
    let mut request: ConsumeRequest =
        match parse_optional_body::<ConsumeLeaseRequest>(&body, "consume request") {
            Ok(request) => request.unwrap_or_default().into(),
            Err(reason) => return Err(state.consume.reject_request(&lease_id, &reason).await.into()),
        };
    if headers.audience.is_some() {
        request.audience = headers.audience;
    }
    if headers.issuer.is_some() {
        request.issuer = headers.issuer;
    }
    if headers.consumer_id.is_some() {
        request.consumer_id = headers.consumer_id;
    }

    let grant = state
        .consume
        .consume(&lease_id, request, Utc::now())
        .await?;
    Ok(Json(grant))
}
