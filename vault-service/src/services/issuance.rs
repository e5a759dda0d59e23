//! Lease issuance, revocation and usability checks.
//!
//! Issuance is fail-closed: preconditions are evaluated in a fixed order and
//! the first failure aborts with nothing persisted and one `LEASE_VIOLATION`
//! record. Minting and persisting form a two-phase commit; a failed persist
//! revokes the freshly minted secret.

use super::audit::{AuditLog, Audited};
use super::error::{IssuanceViolation, LeaseStateViolation, VaultError};
use super::metrics;
use super::registry::PhaseRegistry;
use super::secrets::SecretVault;
use super::store::KeyValueStore;
use crate::config::{LeaseConfig, PhaseConfig};
use crate::models::{AuditEventType, AuditRecord, IngestContracts, Lease, LeaseStatus};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Caller's issuance request. Fields are optional so that absence is
/// reported with its own violation code rather than a parse failure.
#[derive(Debug, Clone, Default)]
pub struct IssueRequest {
    pub contract_id: Option<String>,
    pub scopes: Vec<String>,
    pub ttl_seconds: Option<i64>,
    pub audience: Option<String>,
}

/// Everything issuance needs once every precondition has passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueApproval {
    pub contract_id: String,
    pub issuer: String,
    pub audience: String,
    pub scopes: Vec<String>,
    pub ttl_seconds: u64,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Run the issuance checks against a snapshot of the ingest's contracts.
pub fn evaluate_issuance(
    phase: &PhaseConfig,
    limits: &LeaseConfig,
    contracts: &IngestContracts,
    requester: Option<&str>,
    request: &IssueRequest,
) -> Result<IssueApproval, IssuanceViolation> {
    use IssuanceViolation::*;

    if !phase.issuance_enabled {
        return Err(PhaseNotEnabled);
    }

    let requester = present(requester).ok_or(IssuerRequired)?;
    if !limits.is_authorized_issuer(requester) {
        return Err(IssuerNotAuthorized);
    }

    let bind = &contracts.bind.as_ref().ok_or(BindContractMissing)?.contract;
    let eligible = contracts
        .eligibility
        .as_ref()
        .map(|e| e.contract.eligible)
        .unwrap_or(false);
    if !eligible {
        return Err(EligibilityNotPass);
    }
    if !bind.allowed {
        return Err(BindNotApproved);
    }

    let bound_contract = present(Some(&bind.contract_id)).ok_or(ContractIdMissing)?;
    let bound_issuer = present(Some(&bind.issuer)).ok_or(IssuerMissing)?;
    let policy = bind.policy_flags.as_ref().ok_or(PolicyFlagsMissing)?;
    let bound_audience = present(Some(&bind.audience)).ok_or(AudienceMissing)?;
    if bound_issuer != requester {
        return Err(IssuerMismatch);
    }

    let contract_id = present(request.contract_id.as_deref()).ok_or(ContractIdRequired)?;
    if contract_id != bound_contract {
        return Err(ContractIdMismatch);
    }

    if request.scopes.is_empty() {
        return Err(ScopesRequired);
    }
    if !request
        .scopes
        .iter()
        .all(|scope| bind.allowed_scopes.contains(scope))
    {
        return Err(ScopeBroaden);
    }

    let ttl = match request.ttl_seconds {
        Some(ttl) if ttl > 0 => ttl as u64,
        _ => return Err(TtlRequired),
    };
    let max_ttl = policy
        .max_ttl_seconds
        .map(|policy_max| policy_max.min(limits.max_ttl_seconds))
        .unwrap_or(limits.max_ttl_seconds);
    if ttl > max_ttl {
        return Err(TtlExceedsMax);
    }

    let audience = present(request.audience.as_deref()).ok_or(AudienceRequired)?;
    if audience != bound_audience {
        return Err(AudienceMismatch);
    }

    let mut scopes: Vec<String> = Vec::with_capacity(request.scopes.len());
    for scope in &request.scopes {
        if !scopes.contains(scope) {
            scopes.push(scope.clone());
        }
    }

    Ok(IssueApproval {
        contract_id: contract_id.to_string(),
        issuer: requester.to_string(),
        audience: audience.to_string(),
        scopes,
        ttl_seconds: ttl,
    })
}

#[derive(Clone)]
pub struct LeaseController {
    registry: PhaseRegistry,
    leases: Arc<dyn KeyValueStore<Lease>>,
    vault: Arc<dyn SecretVault>,
    audit: AuditLog,
    phase: PhaseConfig,
    limits: LeaseConfig,
}

impl LeaseController {
    pub fn new(
        registry: PhaseRegistry,
        leases: Arc<dyn KeyValueStore<Lease>>,
        vault: Arc<dyn SecretVault>,
        audit: AuditLog,
        phase: PhaseConfig,
        limits: LeaseConfig,
    ) -> Self {
        Self {
            registry,
            leases,
            vault,
            audit,
            phase,
            limits,
        }
    }

    /// Issue a lease against the ingest's Bind contract.
    pub async fn issue(
        &self,
        ingest_id: &str,
        requester: Option<&str>,
        request: IssueRequest,
        now: DateTime<Utc>,
    ) -> Result<Lease, VaultError> {
        let _guard = self.registry.locks().write(ingest_id).await;
        let outcome = self.issue_locked(ingest_id, requester, &request, now).await;

        match &outcome.result {
            Ok(lease) => {
                tracing::info!(
                    ingest_id = %ingest_id,
                    lease_id = %lease.lease_id,
                    expires_at = %lease.expires_at,
                    "Lease issued"
                );
                metrics::record_issuance("issued");
            }
            Err(VaultError::Issuance(violation)) => {
                tracing::warn!(ingest_id = %ingest_id, violation = %violation, "Lease issuance refused");
                metrics::record_issuance(violation.code());
            }
            Err(e) => {
                tracing::error!(ingest_id = %ingest_id, error = %e, "Lease issuance failed");
                metrics::record_issuance("error");
            }
        }

        outcome.commit(&self.audit).await
    }

    /// Audit an issuance body that could not be parsed. Nothing is minted.
    pub async fn reject_request(
        &self,
        ingest_id: &str,
        requester: Option<&str>,
        reason: &str,
    ) -> VaultError {
        tracing::warn!(ingest_id = %ingest_id, reason = %reason, "Lease request rejected");
        metrics::record_issuance("INVALID_INPUT");
        self.audit
            .record(
                AuditRecord::new(AuditEventType::LeaseViolation)
                    .ingest(ingest_id)
                    .maybe_issuer(requester)
                    .failure("INVALID_INPUT")
                    .detail(reason),
            )
            .await;
        VaultError::InvalidInput(reason.to_string())
    }

    async fn issue_locked(
        &self,
        ingest_id: &str,
        requester: Option<&str>,
        request: &IssueRequest,
        now: DateTime<Utc>,
    ) -> Audited<Lease> {
        let violation = |code: IssuanceViolation| {
            AuditRecord::new(AuditEventType::LeaseViolation)
                .ingest(ingest_id)
                .maybe_issuer(requester)
                .failure(code.code())
        };

        let contracts = match self.registry.snapshot(ingest_id).await {
            Ok(contracts) => contracts,
            Err(e) => return Audited::err(e, vec![]),
        };

        let approval = match evaluate_issuance(&self.phase, &self.limits, &contracts, requester, request) {
            Ok(approval) => approval,
            Err(code) => {
                let mut record = violation(code);
                if let Some(bind) = &contracts.bind {
                    record = record.contract(bind.contract.contract_id.clone());
                }
                return Audited::err(VaultError::Issuance(code), vec![record]);
            }
        };

        let expires_at = match Duration::try_seconds(approval.ttl_seconds as i64)
            .and_then(|ttl| now.checked_add_signed(ttl))
        {
            Some(at) => at,
            None => {
                let code = IssuanceViolation::TtlExceedsMax;
                return Audited::err(
                    VaultError::Issuance(code),
                    vec![violation(code).contract(approval.contract_id)],
                );
            }
        };

        let lease_id = Uuid::new_v4().to_string();
        let minted = match self.vault.mint(&lease_id, approval.ttl_seconds).await {
            Ok(minted) => minted,
            Err(e) => {
                let code = IssuanceViolation::SecretPersistFailed;
                return Audited::err(
                    VaultError::Issuance(code),
                    vec![violation(code)
                        .contract(approval.contract_id)
                        .lease(lease_id)
                        .detail(e.to_string())],
                );
            }
        };

        let lease = Lease {
            lease_id: lease_id.clone(),
            contract_id: approval.contract_id.clone(),
            scopes: approval.scopes.clone(),
            issued_at: now,
            expires_at,
            revocable: true,
            status: LeaseStatus::Active,
            hash_fingerprint: minted.hash_fingerprint,
            issuer: approval.issuer.clone(),
        };

        if let Err(e) = self.leases.put(&lease_id, lease.clone()).await {
            if let Err(revoke_err) = self.vault.revoke(&lease_id).await {
                tracing::error!(
                    lease_id = %lease_id,
                    error = %revoke_err,
                    "Failed to revoke secret after lease persist failure"
                );
            }
            let code = IssuanceViolation::LeasePersistFailed;
            return Audited::err(
                VaultError::Issuance(code),
                vec![violation(code)
                    .contract(approval.contract_id)
                    .lease(lease_id)
                    .detail(e.to_string())],
            );
        }

        let record = AuditRecord::new(AuditEventType::LeaseIssued)
            .ingest(ingest_id)
            .lease(&lease.lease_id)
            .contract(&lease.contract_id)
            .issuer(&lease.issuer)
            .audience(Some(approval.audience.as_str()))
            .scopes(&lease.scopes)
            .detail(format!("expires_at={}", lease.expires_at.to_rfc3339()));
        Audited::ok(lease, vec![record])
    }

    /// Revoke an active lease. Revoking twice is a violation, not a no-op.
    pub async fn revoke(
        &self,
        lease_id: &str,
        actor: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Lease, VaultError> {
        let Some(existing) = self.leases.get(lease_id).await? else {
            let outcome: Audited<Lease> = Audited::err(
                VaultError::LeaseState(LeaseStateViolation::LeaseNotFound),
                vec![AuditRecord::new(AuditEventType::LeaseViolation)
                    .lease(lease_id)
                    .maybe_issuer(actor)
                    .failure(LeaseStateViolation::LeaseNotFound.code())],
            );
            metrics::record_revocation(LeaseStateViolation::LeaseNotFound.code());
            return outcome.commit(&self.audit).await;
        };

        let ingest_id = self.registry.ingest_for_contract(&existing.contract_id).await?;
        let _guard = self.registry.locks().write(&ingest_id).await;

        let outcome = match self.leases.get(lease_id).await? {
            Some(lease) => self.revoke_locked(lease, actor, now).await,
            None => Audited::err(
                VaultError::LeaseState(LeaseStateViolation::LeaseNotFound),
                vec![],
            ),
        };

        match &outcome.result {
            Ok(_) => metrics::record_revocation("revoked"),
            Err(VaultError::LeaseState(v)) => metrics::record_revocation(v.code()),
            Err(_) => metrics::record_revocation("error"),
        }
        outcome.commit(&self.audit).await
    }

    async fn revoke_locked(
        &self,
        mut lease: Lease,
        actor: Option<&str>,
        now: DateTime<Utc>,
    ) -> Audited<Lease> {
        let violation = |lease: &Lease, code: LeaseStateViolation| {
            AuditRecord::new(AuditEventType::LeaseViolation)
                .lease(&lease.lease_id)
                .contract(&lease.contract_id)
                .issuer(&lease.issuer)
                .failure(code.code())
        };

        match lease.status {
            LeaseStatus::Revoked => {
                let code = LeaseStateViolation::LeaseAlreadyRevoked;
                return Audited::err(VaultError::LeaseState(code), vec![violation(&lease, code)]);
            }
            LeaseStatus::Expired => {
                let code = LeaseStateViolation::LeaseAlreadyExpired;
                return Audited::err(VaultError::LeaseState(code), vec![violation(&lease, code)]);
            }
            LeaseStatus::Active if lease.is_lapsed(now) => {
                let mut records = Vec::with_capacity(2);
                match self.transition(&mut lease, LeaseStatus::Expired).await {
                    Ok(()) => records.push(expired_record(&lease)),
                    Err(e) => return Audited::err(e, records),
                }
                let code = LeaseStateViolation::LeaseAlreadyExpired;
                records.push(violation(&lease, code));
                return Audited::err(VaultError::LeaseState(code), records);
            }
            LeaseStatus::Active => {}
        }

        if let Err(e) = self.vault.revoke(&lease.lease_id).await {
            tracing::warn!(lease_id = %lease.lease_id, error = %e, "Secret revoke failed; marking lease revoked anyway");
        }

        if let Err(e) = self.transition(&mut lease, LeaseStatus::Revoked).await {
            return Audited::err(e, vec![]);
        }

        let mut record = AuditRecord::new(AuditEventType::LeaseRevoked)
            .lease(&lease.lease_id)
            .contract(&lease.contract_id)
            .issuer(&lease.issuer)
            .detail(format!("revoked_at={}", now.to_rfc3339()));
        if let Some(actor) = actor {
            record = record.actor(actor);
        }
        Audited::ok(lease, vec![record])
    }

    /// Lease if it may currently be used. A lapsed active lease is moved to
    /// `expired` as a side effect.
    pub async fn check_usable(&self, lease_id: &str, now: DateTime<Utc>) -> Result<Lease, VaultError> {
        let Some(existing) = self.leases.get(lease_id).await? else {
            let code = LeaseStateViolation::LeaseNotFound;
            let outcome: Audited<Lease> = Audited::err(
                VaultError::LeaseState(code),
                vec![AuditRecord::new(AuditEventType::LeaseViolation)
                    .lease(lease_id)
                    .failure(code.code())],
            );
            return outcome.commit(&self.audit).await;
        };

        let ingest_id = self.registry.ingest_for_contract(&existing.contract_id).await?;
        let _guard = self.registry.locks().write(&ingest_id).await;

        let Some(mut lease) = self.leases.get(lease_id).await? else {
            return Err(VaultError::LeaseState(LeaseStateViolation::LeaseNotFound));
        };

        let outcome = match lease.status {
            LeaseStatus::Revoked => {
                let code = LeaseStateViolation::LeaseRevoked;
                let record = AuditRecord::new(AuditEventType::LeaseViolation)
                    .lease(&lease.lease_id)
                    .contract(&lease.contract_id)
                    .issuer(&lease.issuer)
                    .failure(code.code());
                Audited::err(VaultError::LeaseState(code), vec![record])
            }
            LeaseStatus::Expired => Audited::err(
                VaultError::LeaseState(LeaseStateViolation::LeaseExpired),
                vec![],
            ),
            LeaseStatus::Active if lease.is_lapsed(now) => {
                match self.transition(&mut lease, LeaseStatus::Expired).await {
                    Ok(()) => Audited::err(
                        VaultError::LeaseState(LeaseStateViolation::LeaseExpired),
                        vec![expired_record(&lease)],
                    ),
                    Err(e) => Audited::err(e, vec![]),
                }
            }
            LeaseStatus::Active => Audited::ok(lease, vec![]),
        };
        outcome.commit(&self.audit).await
    }

    /// Leases bound to the ingest's contract id (the ingest id when unbound).
    pub async fn list_for_ingest(&self, ingest_id: &str) -> Result<Vec<Lease>, VaultError> {
        let contracts = self.registry.snapshot(ingest_id).await?;

        let mut leases: Vec<Lease> = self
            .leases
            .list()
            .await?
            .into_iter()
            .map(|(_, lease)| lease)
            .filter(|lease| contracts.holds_contract(&lease.contract_id))
            .collect();
        leases.sort_by(|a, b| a.issued_at.cmp(&b.issued_at));
        Ok(leases)
    }

    async fn transition(&self, lease: &mut Lease, next: LeaseStatus) -> Result<(), VaultError> {
        if !lease.status.can_transition_to(next) {
            return Err(VaultError::Internal(anyhow::anyhow!(
                "illegal lease transition {} -> {}",
                lease.status.as_str(),
                next.as_str()
            )));
        }
        let mut updated = lease.clone();
        updated.status = next;
        self.leases.put(&updated.lease_id, updated.clone()).await?;
        *lease = updated;
        Ok(())
    }
}

fn expired_record(lease: &Lease) -> AuditRecord {
    AuditRecord::new(AuditEventType::LeaseExpired)
        .lease(&lease.lease_id)
        .contract(&lease.contract_id)
        .issuer(&lease.issuer)
        .detail(format!("expires_at={}", lease.expires_at.to_rfc3339()))
}
