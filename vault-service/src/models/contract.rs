//! Registered phase contracts and their tamper-evidence hash.

use super::{BindDecision, EligibilityDecision, ScanReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub const SCAN_CONTRACT_VERSION: &str = "1.0";
pub const ELIGIBILITY_CONTRACT_VERSION: &str = "1.0";
pub const BIND_CONTRACT_VERSION: &str = "1.0";

/// A contract as stored by the registry: the phase output plus stamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseRecord<T> {
    #[serde(flatten)]
    pub contract: T,
    pub contract_version: String,
    pub registered_at: DateTime<Utc>,
}

impl<T> PhaseRecord<T> {
    pub fn new(contract: T, contract_version: &str, registered_at: DateTime<Utc>) -> Self {
        Self {
            contract,
            contract_version: contract_version.to_string(),
            registered_at,
        }
    }
}

/// Everything registered for one ingest. Each phase is replaced wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IngestContracts {
    #[serde(default)]
    pub scan: Option<PhaseRecord<ScanReport>>,
    #[serde(default)]
    pub eligibility: Option<PhaseRecord<EligibilityDecision>>,
    #[serde(default)]
    pub bind: Option<PhaseRecord<BindDecision>>,
    /// Every contract id this ingest has bound. Ids stay claimed after a rebind.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub claimed_contracts: Vec<String>,
}

/// Forward-only ingest state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseState {
    None,
    Scanned,
    EligibleEvaluated,
    Bound,
}

impl IngestContracts {
    pub fn phase(&self) -> PhaseState {
        if self.bind.is_some() {
            PhaseState::Bound
        } else if self.eligibility.is_some() {
            PhaseState::EligibleEvaluated
        } else if self.scan.is_some() {
            PhaseState::Scanned
        } else {
            PhaseState::None
        }
    }

    /// True when `contract_id` is the current bind's id or was bound earlier.
    pub fn holds_contract(&self, contract_id: &str) -> bool {
        self.claimed_contracts.iter().any(|id| id == contract_id)
            || self
                .bind
                .as_ref()
                .is_some_and(|bind| bind.contract.contract_id == contract_id)
    }

    /// The current bind, only if it still carries `contract_id`.
    pub fn bind_for_contract(&self, contract_id: &str) -> Option<&PhaseRecord<BindDecision>> {
        self.bind
            .as_ref()
            .filter(|bind| bind.contract.contract_id == contract_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scan,
    Eligibility,
    Bind,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Scan => "scan",
            Phase::Eligibility => "eligibility",
            Phase::Bind => "bind",
        }
    }

    /// The phase that must exist before this one may be read or written.
    pub fn prerequisite(&self) -> Option<Phase> {
        match self {
            Phase::Scan => None,
            Phase::Eligibility => Some(Phase::Scan),
            Phase::Bind => Some(Phase::Eligibility),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SHA-256 (hex) over the canonical JSON of `contract`.
///
/// Canonical means: converted to a `serde_json::Value` first, then written
/// compactly. Re-parsing the served JSON and hashing it again yields the same
/// digest.
pub fn contract_hash<T: Serialize>(contract: &T) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_value(contract)?;
    let bytes = serde_json::to_vec(&canonical)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
