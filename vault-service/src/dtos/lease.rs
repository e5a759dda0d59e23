use crate::models::Lease;
use crate::services::{ConsumeRequest, IssueRequest};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueLeaseRequest {
    #[serde(default)]
    pub contract_id: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub ttl_seconds: Option<i64>,
    #[serde(default)]
    pub audience: Option<String>,
}

impl From<IssueLeaseRequest> for IssueRequest {
    fn from(body: IssueLeaseRequest) -> Self {
        Self {
            contract_id: body.contract_id,
            scopes: body.scopes,
            ttl_seconds: body.ttl_seconds,
            audience: body.audience,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeLeaseRequest {
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub consumer_id: Option<String>,
}

impl From<ConsumeLeaseRequest> for ConsumeRequest {
    fn from(body: ConsumeLeaseRequest) -> Self {
        Self {
            audience: body.audience,
            issuer: body.issuer,
            scopes: body.scopes,
            consumer_id: body.consumer_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseListResponse {
    pub ingest_id: String,
    pub leases: Vec<Lease>,
}
