use crate::models::{
    contract_hash, BindContext, BindDecision, BindStatus, MatchEligibility, PhaseRecord,
    PhaseState, PolicyFlags, ScanReport,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRegisteredResponse {
    pub ingest_id: String,
    pub phase: PhaseState,
    pub contract_version: String,
    pub registered_at: DateTime<Utc>,
}

impl ScanRegisteredResponse {
    pub fn new(ingest_id: &str, record: &PhaseRecord<ScanReport>) -> Self {
        Self {
            ingest_id: ingest_id.to_string(),
            phase: PhaseState::Scanned,
            contract_version: record.contract_version.clone(),
            registered_at: record.registered_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindRequest {
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub policy_flags: Option<PolicyFlags>,
    #[serde(default)]
    pub contract_id: Option<String>,
    /// Inline Match Eligibility; the stored decision is used when absent.
    #[serde(default)]
    pub eligibility: Option<MatchEligibility>,
}

impl BindRequest {
    pub fn into_parts(self) -> (BindContext, Option<MatchEligibility>) {
        (
            BindContext {
                issuer: self.issuer,
                audience: self.audience,
                policy_flags: self.policy_flags,
                contract_id: self.contract_id,
            },
            self.eligibility,
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindResponse {
    pub ingest_id: String,
    pub status: BindStatus,
    pub decision: PhaseRecord<BindDecision>,
}

impl BindResponse {
    pub fn new(ingest_id: &str, decision: PhaseRecord<BindDecision>) -> Self {
        Self {
            ingest_id: ingest_id.to_string(),
            status: BindStatus::from(&decision.contract),
            decision,
        }
    }
}

/// A registered contract as served by the `/result` endpoints.
///
/// `contract_hash` is computed over exactly the `contract` value in this
/// body, so a client can re-hash what it received.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractEnvelope<T> {
    pub ingest_id: String,
    pub contract: PhaseRecord<T>,
    pub contract_hash: String,
    pub retrieved_at: DateTime<Utc>,
}

impl<T: Serialize> ContractEnvelope<T> {
    pub fn new(
        ingest_id: &str,
        contract: PhaseRecord<T>,
        retrieved_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        let contract_hash = contract_hash(&contract)?;
        Ok(Self {
            ingest_id: ingest_id.to_string(),
            contract,
            contract_hash,
            retrieved_at,
        })
    }
}
