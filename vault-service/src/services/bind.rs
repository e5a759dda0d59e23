//! Bind decisions: eligibility verdict → declared (not issued) leases.

use super::error::VaultError;
use crate::models::{BindContext, BindDecision, EligibilityDecision, LeaseRequirement};
use chrono::{DateTime, Utc};

fn required(value: &Option<String>, field: &'static str) -> Result<String, VaultError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(VaultError::MissingField(field)),
    }
}

/// Build the bind decision for an ingest.
///
/// Fails closed with `MissingField` when the caller did not propagate
/// `issuer`, `audience` or `policyFlags`.
pub fn create_bind_decision(
    ingest_id: &str,
    eligibility: &EligibilityDecision,
    context: &BindContext,
    now: DateTime<Utc>,
) -> Result<BindDecision, VaultError> {
    let issuer = required(&context.issuer, "issuer")?;
    let audience = required(&context.audience, "audience")?;
    let policy_flags = context
        .policy_flags
        .clone()
        .ok_or(VaultError::MissingField("policyFlags"))
        .map(Some)?;
    let contract_id = context
        .contract_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(ingest_id)
        .to_string();

    if !eligibility.eligible {
        return Ok(BindDecision {
            ingest_id: ingest_id.to_string(),
            contract_id,
            issuer,
            audience,
            policy_flags,
            allowed_scopes: vec![],
            allowed: false,
            leases_required: vec![],
            reasons: eligibility.errors.iter().map(|e| e.code().to_string()).collect(),
            timestamp: now,
        });
    }

    let mut allowed_scopes: Vec<String> = Vec::with_capacity(eligibility.formations.len());
    for scope in &eligibility.formations {
        if !allowed_scopes.contains(scope) {
            allowed_scopes.push(scope.clone());
        }
    }

    let leases_required = eligibility
        .clearance
        .iter()
        .map(LeaseRequirement::pending)
        .collect();

    Ok(BindDecision {
        ingest_id: ingest_id.to_string(),
        contract_id,
        issuer,
        audience,
        policy_flags,
        allowed_scopes,
        allowed: true,
        leases_required,
        reasons: vec![],
        timestamp: now,
    })
}

/// Shape check run before a decision is persisted.
pub fn validate_bind_decision(decision: &BindDecision) -> Result<(), VaultError> {
    if decision.contract_id.trim().is_empty() {
        return Err(VaultError::InvalidBindDecision(
            "contractId must not be empty".to_string(),
        ));
    }
    if !decision.allowed && decision.reasons.is_empty() {
        return Err(VaultError::InvalidBindDecision(
            "rejection must include reasons".to_string(),
        ));
    }
    if decision.allowed {
        if decision.allowed_scopes.is_empty() {
            return Err(VaultError::InvalidBindDecision(
                "approval must declare allowed scopes".to_string(),
            ));
        }
        if decision.audience.trim().is_empty() {
            return Err(VaultError::InvalidBindDecision(
                "approval must name an audience".to_string(),
            ));
        }
    }
    if !decision.allowed && !decision.leases_required.is_empty() {
        return Err(VaultError::InvalidBindDecision(
            "rejection must not declare leases".to_string(),
        ));
    }
    Ok(())
}
