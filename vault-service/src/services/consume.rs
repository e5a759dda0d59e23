//! Lease consumption gate.
//!
//! Read-only: never mutates lease metadata or secrets, and writes exactly
//! one audit record per call.

use super::audit::{AuditLog, Audited};
use super::error::{DenialReason, VaultError};
use super::metrics;
use super::registry::PhaseRegistry;
use super::store::KeyValueStore;
use crate::models::{AuditEventType, AuditRecord, BindDecision, Lease, LeaseStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ConsumeRequest {
    pub audience: Option<String>,
    pub issuer: Option<String>,
    pub scopes: Vec<String>,
    pub consumer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeGrant {
    pub allowed: bool,
}

/// Ordered consumption checks; the first failing check names the denial.
pub fn evaluate_consume(
    consumption_enabled: bool,
    lease: Option<&Lease>,
    bind: Option<&BindDecision>,
    request: &ConsumeRequest,
    now: DateTime<Utc>,
) -> Result<(), DenialReason> {
    if !consumption_enabled {
        return Err(DenialReason::PhaseViolation);
    }

    let lease = lease.ok_or(DenialReason::LeaseNotFound)?;
    if lease.status == LeaseStatus::Revoked {
        return Err(DenialReason::LeaseRevoked);
    }
    if lease.status == LeaseStatus::Expired || lease.is_lapsed(now) {
        return Err(DenialReason::LeaseExpired);
    }

    let audience_matches = matches!(
        (bind, request.audience.as_deref()),
        (Some(bind), Some(audience)) if !audience.is_empty() && bind.audience == audience
    );
    if !audience_matches {
        return Err(DenialReason::AudienceMismatch);
    }

    if request.issuer.as_deref() != Some(lease.issuer.as_str()) {
        return Err(DenialReason::IssuerMismatch);
    }

    if request.scopes.is_empty() || !request.scopes.iter().all(|s| lease.scopes.contains(s)) {
        return Err(DenialReason::ScopeInsufficient);
    }

    match bind {
        Some(bind) if bind.allowed && bind.contract_id == lease.contract_id => Ok(()),
        _ => Err(DenialReason::ContractInvalid),
    }
}

#[derive(Clone)]
pub struct ConsumeGate {
    registry: PhaseRegistry,
    leases: Arc<dyn KeyValueStore<Lease>>,
    audit: AuditLog,
    consumption_enabled: bool,
}

impl ConsumeGate {
    pub fn new(
        registry: PhaseRegistry,
        leases: Arc<dyn KeyValueStore<Lease>>,
        audit: AuditLog,
        consumption_enabled: bool,
    ) -> Self {
        Self {
            registry,
            leases,
            audit,
            consumption_enabled,
        }
    }

    pub async fn consume(
        &self,
        lease_id: &str,
        request: ConsumeRequest,
        now: DateTime<Utc>,
    ) -> Result<ConsumeGrant, VaultError> {
        let outcome = self.decide(lease_id, &request, now).await;

        match &outcome.result {
            Ok(_) => {
                tracing::info!(lease_id = %lease_id, consumer_id = ?request.consumer_id, "Consumption allowed");
                metrics::record_consume("allowed");
            }
            Err(VaultError::Denied(reason)) => {
                tracing::warn!(lease_id = %lease_id, reason = %reason, "Consumption denied");
                metrics::record_consume(reason.code());
            }
            Err(e) => {
                tracing::error!(lease_id = %lease_id, error = %e, "Consumption check failed");
                metrics::record_consume("error");
            }
        }

        outcome.commit(&self.audit).await
    }

    /// Deny a consume call whose body could not be parsed. One record, as
    /// for any other denial.
    pub async fn reject_request(&self, lease_id: &str, reason: &str) -> VaultError {
        tracing::warn!(lease_id = %lease_id, reason = %reason, "Consume request rejected");
        metrics::record_consume("INVALID_INPUT");
        self.audit
            .record(
                AuditRecord::new(AuditEventType::ConsumeDenied)
                    .lease(lease_id)
                    .allowed(false)
                    .failure("INVALID_INPUT")
                    .detail(reason),
            )
            .await;
        VaultError::InvalidInput(reason.to_string())
    }

    async fn decide(
        &self,
        lease_id: &str,
        request: &ConsumeRequest,
        now: DateTime<Utc>,
    ) -> Audited<ConsumeGrant> {
        let denied = |contract_id: Option<&str>, reason: &str| {
            let mut record = AuditRecord::new(AuditEventType::ConsumeDenied)
                .lease(lease_id)
                .maybe_issuer(request.issuer.as_deref())
                .audience(request.audience.as_deref())
                .consumer(request.consumer_id.as_deref())
                .scopes(&request.scopes)
                .allowed(false)
                .failure(reason);
            if let Some(contract_id) = contract_id {
                record = record.contract(contract_id);
            }
            record
        };
        let fault = |e: VaultError| {
            let record = denied(None, "INTERNAL_ERROR").detail(e.to_string());
            Audited::err(e, vec![record])
        };

        if !self.consumption_enabled {
            let reason = DenialReason::PhaseViolation;
            return Audited::err(VaultError::Denied(reason), vec![denied(None, reason.code())]);
        }

        // Locate the owning ingest, then re-read everything under its lock.
        let located = match self.leases.get(lease_id).await {
            Ok(lease) => lease,
            Err(e) => return fault(e.into()),
        };
        let ingest_id = match &located {
            Some(lease) => match self.registry.ingest_for_contract(&lease.contract_id).await {
                Ok(id) => Some(id),
                Err(e) => return fault(e),
            },
            None => None,
        };
        let _guard = match &ingest_id {
            Some(id) => Some(self.registry.locks().read(id).await),
            None => None,
        };

        let lease = match self.leases.get(lease_id).await {
            Ok(lease) => lease,
            Err(e) => return fault(e.into()),
        };
        let bind = match &lease {
            Some(lease) => match self.registry.find_bind_by_contract(&lease.contract_id).await {
                Ok(found) => found.map(|(_, record)| record.contract),
                Err(e) => return fault(e),
            },
            None => None,
        };

        let contract_id = lease.as_ref().map(|l| l.contract_id.as_str());
        match evaluate_consume(
            self.consumption_enabled,
            lease.as_ref(),
            bind.as_ref(),
            request,
            now,
        ) {
            Ok(()) => {
                let lease = lease.as_ref();
                let mut record = AuditRecord::new(AuditEventType::Consume)
                    .lease(lease_id)
                    .audience(request.audience.as_deref())
                    .consumer(request.consumer_id.as_deref())
                    .scopes(&request.scopes)
                    .allowed(true);
                if let Some(lease) = lease {
                    record = record.contract(&lease.contract_id).issuer(&lease.issuer);
                }
                Audited::ok(ConsumeGrant { allowed: true }, vec![record])
            }
            Err(reason) => Audited::err(
                VaultError::Denied(reason),
                vec![denied(contract_id, reason.code())],
            ),
        }
    }
}
