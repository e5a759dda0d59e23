use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Policy attached to a Bind contract.
///
/// Unknown flags are kept in an ordered map so the canonical JSON of a
/// contract (and therefore its hash) does not depend on insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PolicyFlags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ttl_seconds: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Mandatory context propagated by the caller of a bind decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BindContext {
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub policy_flags: Option<PolicyFlags>,
    /// Defaults to the ingest id.
    #[serde(default)]
    pub contract_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseType {
    SecretLease,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementStatus {
    PendingIssuance,
}

/// A lease the bind decision declares will be needed. Never issued here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRequirement {
    pub name: String,
    #[serde(rename = "type")]
    pub lease_type: LeaseType,
    pub status: RequirementStatus,
}

impl LeaseRequirement {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lease_type: LeaseType::SecretLease,
            status: RequirementStatus::PendingIssuance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindDecision {
    pub ingest_id: String,
    // Identity fields default to empty so a record written by an older or
    // foreign writer still loads; issuance rejects it with a precise code.
    #[serde(default)]
    pub contract_id: String,
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub audience: String,
    #[serde(default)]
    pub policy_flags: Option<PolicyFlags>,
    pub allowed_scopes: Vec<String>,
    pub allowed: bool,
    pub leases_required: Vec<LeaseRequirement>,
    pub reasons: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Bind status as reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindStatus {
    ApprovedPendingSecrets,
    Rejected,
}

impl From<&BindDecision> for BindStatus {
    fn from(decision: &BindDecision) -> Self {
        if decision.allowed {
            BindStatus::ApprovedPendingSecrets
        } else {
            BindStatus::Rejected
        }
    }
}
