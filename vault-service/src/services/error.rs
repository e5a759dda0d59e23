use crate::models::Phase;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::fmt;
use thiserror::Error;

/// Why an issuance request was refused, in check order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssuanceViolation {
    PhaseNotEnabled,
    IssuerRequired,
    IssuerNotAuthorized,
    BindContractMissing,
    EligibilityNotPass,
    BindNotApproved,
    ContractIdMissing,
    IssuerMissing,
    PolicyFlagsMissing,
    AudienceMissing,
    IssuerMismatch,
    ContractIdRequired,
    ContractIdMismatch,
    ScopesRequired,
    ScopeBroaden,
    TtlRequired,
    TtlExceedsMax,
    AudienceRequired,
    AudienceMismatch,
    SecretPersistFailed,
    LeasePersistFailed,
}

impl IssuanceViolation {
    pub fn code(&self) -> &'static str {
        match self {
            IssuanceViolation::PhaseNotEnabled => "PHASE_NOT_ENABLED",
            IssuanceViolation::IssuerRequired => "ISSUER_REQUIRED",
            IssuanceViolation::IssuerNotAuthorized => "ISSUER_NOT_AUTHORIZED",
            IssuanceViolation::BindContractMissing => "BIND_CONTRACT_MISSING",
            IssuanceViolation::EligibilityNotPass => "ELIGIBILITY_NOT_PASS",
            IssuanceViolation::BindNotApproved => "BIND_NOT_APPROVED",
            IssuanceViolation::ContractIdMissing => "CONTRACT_ID_MISSING",
            IssuanceViolation::IssuerMissing => "ISSUER_MISSING",
            IssuanceViolation::PolicyFlagsMissing => "POLICY_FLAGS_MISSING",
            IssuanceViolation::AudienceMissing => "AUDIENCE_MISSING",
            IssuanceViolation::IssuerMismatch => "ISSUER_MISMATCH",
            IssuanceViolation::ContractIdRequired => "CONTRACT_ID_REQUIRED",
            IssuanceViolation::ContractIdMismatch => "CONTRACT_ID_MISMATCH",
            IssuanceViolation::ScopesRequired => "SCOPES_REQUIRED",
            IssuanceViolation::ScopeBroaden => "SCOPE_BROADEN",
            IssuanceViolation::TtlRequired => "TTL_REQUIRED",
            IssuanceViolation::TtlExceedsMax => "TTL_EXCEEDS_MAX",
            IssuanceViolation::AudienceRequired => "AUDIENCE_REQUIRED",
            IssuanceViolation::AudienceMismatch => "AUDIENCE_MISMATCH",
            IssuanceViolation::SecretPersistFailed => "SECRET_PERSIST_FAILED",
            IssuanceViolation::LeasePersistFailed => "LEASE_PERSIST_FAILED",
        }
    }

    /// Collaborator failures rather than refusals of the request itself.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            IssuanceViolation::SecretPersistFailed | IssuanceViolation::LeasePersistFailed
        )
    }
}

impl fmt::Display for IssuanceViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaseStateViolation {
    LeaseNotFound,
    LeaseRevoked,
    LeaseExpired,
    LeaseAlreadyRevoked,
    LeaseAlreadyExpired,
}

impl LeaseStateViolation {
    pub fn code(&self) -> &'static str {
        match self {
            LeaseStateViolation::LeaseNotFound => "LEASE_NOT_FOUND",
            LeaseStateViolation::LeaseRevoked => "LEASE_REVOKED",
            LeaseStateViolation::LeaseExpired => "LEASE_EXPIRED",
            LeaseStateViolation::LeaseAlreadyRevoked => "LEASE_ALREADY_REVOKED",
            LeaseStateViolation::LeaseAlreadyExpired => "LEASE_ALREADY_EXPIRED",
        }
    }
}

impl fmt::Display for LeaseStateViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Consumption denial reasons, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialReason {
    PhaseViolation,
    LeaseNotFound,
    LeaseRevoked,
    LeaseExpired,
    AudienceMismatch,
    IssuerMismatch,
    ScopeInsufficient,
    ContractInvalid,
}

impl DenialReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenialReason::PhaseViolation => "PHASE_VIOLATION",
            DenialReason::LeaseNotFound => "LEASE_NOT_FOUND",
            DenialReason::LeaseRevoked => "LEASE_REVOKED",
            DenialReason::LeaseExpired => "LEASE_EXPIRED",
            DenialReason::AudienceMismatch => "AUDIENCE_MISMATCH",
            DenialReason::IssuerMismatch => "ISSUER_MISMATCH",
            DenialReason::ScopeInsufficient => "SCOPE_INSUFFICIENT",
            DenialReason::ContractInvalid => "CONTRACT_INVALID",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid bind decision: {0}")]
    InvalidBindDecision(String),

    #[error("Contract id {contract_id} is bound by another ingest")]
    ContractIdConflict { contract_id: String },

    #[error("{phase} result unavailable: {prerequisite} phase must complete first")]
    PreconditionFailed { phase: Phase, prerequisite: Phase },

    #[error("{0} result not found")]
    PhaseNotFound(Phase),

    #[error("Lease issuance refused: {0}")]
    Issuance(IssuanceViolation),

    #[error("Lease state violation: {0}")]
    LeaseState(LeaseStateViolation),

    #[error("Consumption denied: {0}")]
    Denied(DenialReason),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl VaultError {
    /// Machine-readable code carried in HTTP error bodies.
    pub fn code(&self) -> String {
        match self {
            VaultError::InvalidInput(_) => "INVALID_INPUT".to_string(),
            VaultError::MissingField(field) => format!("MISSING_FIELD_{}", field.to_ascii_uppercase()),
            VaultError::InvalidBindDecision(_) => "INVALID_BIND_DECISION".to_string(),
            VaultError::ContractIdConflict { .. } => "CONTRACT_ID_CONFLICT".to_string(),
            VaultError::PreconditionFailed { .. } => "PRECONDITION_FAILED".to_string(),
            VaultError::PhaseNotFound(phase) => {
                format!("{}_NOT_FOUND", phase.as_str().to_ascii_uppercase())
            }
            VaultError::Issuance(v) => v.code().to_string(),
            VaultError::LeaseState(v) => v.code().to_string(),
            VaultError::Denied(reason) => reason.code().to_string(),
            VaultError::Store(_) => "STORE_ERROR".to_string(),
            VaultError::Internal(_) => "INTERNAL_ERROR".to_string(),
        }
    }
}

impl From<VaultError> for AppError {
    fn from(err: VaultError) -> Self {
        let code = err.code();
        let message = err.to_string();
        match err {
            VaultError::InvalidInput(_)
            | VaultError::MissingField(_)
            | VaultError::InvalidBindDecision(_)
            | VaultError::ContractIdConflict { .. }
            | VaultError::LeaseState(_) => AppError::validation(code, message),
            VaultError::Issuance(v) if v.is_fault() => AppError::internal_fault(code, message),
            VaultError::Issuance(_) => AppError::validation(code, message),
            VaultError::PreconditionFailed { .. } => AppError::precondition_failed(code, message),
            VaultError::PhaseNotFound(_) => AppError::not_found(code, message),
            VaultError::Denied(_) => AppError::forbidden(code, message),
            VaultError::Store(e) => AppError::InternalError(anyhow::Error::new(e)),
            VaultError::Internal(e) => AppError::InternalError(e),
        }
    }
}
