//! Scan registration, eligibility evaluation and bind decisions for an
//! ingest, written through the phase registry with audit.

use super::audit::{AuditLog, Audited};
use super::bind::create_bind_decision;
use super::eligibility::{transform_to_eligibility, validate};
use super::error::VaultError;
use super::registry::PhaseRegistry;
use crate::models::{
    AuditEventType, AuditRecord, BindContext, BindDecision, EligibilityDecision, MatchEligibility,
    Phase, PhaseRecord, ScanReport,
};
use chrono::{DateTime, Utc};

#[derive(Clone)]
pub struct IngestPipeline {
    registry: PhaseRegistry,
    audit: AuditLog,
}

impl IngestPipeline {
    pub fn new(registry: PhaseRegistry, audit: AuditLog) -> Self {
        Self { registry, audit }
    }

    pub fn registry(&self) -> &PhaseRegistry {
        &self.registry
    }

    /// Register a scan report. A missing report is rejected and audited.
    pub async fn register_scan(
        &self,
        ingest_id: &str,
        report: Option<ScanReport>,
        now: DateTime<Utc>,
    ) -> Result<PhaseRecord<ScanReport>, VaultError> {
        let Some(report) = report else {
            return Err(self.reject_scan(ingest_id, "scan report is required").await);
        };

        let outcome = match self.registry.register_scan(ingest_id, report, now).await {
            Ok(record) => {
                let audit = AuditRecord::new(AuditEventType::ScanRegistered)
                    .ingest(ingest_id)
                    .detail(format!(
                        "providers={} runtime={} files_scanned={}",
                        record.contract.providers.len(),
                        record.contract.runtime.as_str(),
                        record.contract.files_scanned.len()
                    ));
                Audited::ok(record, vec![audit])
            }
            Err(e) => Audited::err(e, vec![]),
        };
        outcome.commit(&self.audit).await
    }

    /// Audit a scan body that could not be accepted.
    pub async fn reject_scan(&self, ingest_id: &str, reason: &str) -> VaultError {
        tracing::warn!(ingest_id = %ingest_id, reason = %reason, "Scan rejected");
        self.audit
            .record(
                AuditRecord::new(AuditEventType::ScanRejected)
                    .ingest(ingest_id)
                    .failure("INVALID_INPUT")
                    .detail(reason),
            )
            .await;
        VaultError::InvalidInput(reason.to_string())
    }

    /// Audit a bind body that could not be parsed.
    pub async fn reject_bind(&self, ingest_id: &str, reason: &str) -> VaultError {
        tracing::warn!(ingest_id = %ingest_id, reason = %reason, "Bind request rejected");
        self.audit
            .record(
                AuditRecord::new(AuditEventType::BindError)
                    .ingest(ingest_id)
                    .failure("INVALID_INPUT")
                    .detail(reason),
            )
            .await;
        VaultError::InvalidInput(reason.to_string())
    }

    /// Evaluate the stored scan and register the resulting decision.
    pub async fn evaluate_eligibility(
        &self,
        ingest_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PhaseRecord<EligibilityDecision>, VaultError> {
        let scan = self.registry.scan(ingest_id).await.map_err(|e| match e {
            VaultError::PhaseNotFound(Phase::Scan) => VaultError::PreconditionFailed {
                phase: Phase::Eligibility,
                prerequisite: Phase::Scan,
            },
            other => other,
        })?;

        let decision = validate(&transform_to_eligibility(&scan.contract, now));
        self.record_eligibility(ingest_id, decision, now).await
    }

    async fn record_eligibility(
        &self,
        ingest_id: &str,
        decision: EligibilityDecision,
        now: DateTime<Utc>,
    ) -> Result<PhaseRecord<EligibilityDecision>, VaultError> {
        let outcome = match self.registry.register_eligibility(ingest_id, decision, now).await {
            Ok(record) => {
                let codes: Vec<&str> = record.contract.errors.iter().map(|e| e.code()).collect();
                tracing::info!(
                    ingest_id = %ingest_id,
                    eligible = record.contract.eligible,
                    errors = ?codes,
                    "Eligibility evaluated"
                );
                let mut audit = AuditRecord::new(AuditEventType::EligibilityEvaluated)
                    .ingest(ingest_id)
                    .allowed(record.contract.eligible);
                if !codes.is_empty() {
                    audit = audit.detail(codes.join(","));
                }
                Audited::ok(record, vec![audit])
            }
            Err(e) => Audited::err(e, vec![]),
        };
        outcome.commit(&self.audit).await
    }

    /// Decide and register the Bind contract.
    ///
    /// `inline` lets a caller supply the Match Eligibility directly; it is
    /// validated and registered as the ingest's eligibility first. Otherwise
    /// the stored decision is used.
    pub async fn bind(
        &self,
        ingest_id: &str,
        context: BindContext,
        inline: Option<MatchEligibility>,
        now: DateTime<Utc>,
    ) -> Result<PhaseRecord<BindDecision>, VaultError> {
        let eligibility = match inline {
            Some(match_eligibility) => {
                let decision = validate(&match_eligibility);
                self.record_eligibility(ingest_id, decision, now).await?.contract
            }
            None => match self.registry.eligibility(ingest_id).await {
                Ok(record) => record.contract,
                Err(VaultError::PhaseNotFound(_)) | Err(VaultError::PreconditionFailed { .. }) => {
                    return Err(VaultError::PreconditionFailed {
                        phase: Phase::Bind,
                        prerequisite: Phase::Eligibility,
                    })
                }
                Err(e) => return Err(e),
            },
        };

        let outcome = self.decide_bind(ingest_id, &eligibility, &context, now).await;
        outcome.commit(&self.audit).await
    }

    async fn decide_bind(
        &self,
        ingest_id: &str,
        eligibility: &EligibilityDecision,
        context: &BindContext,
        now: DateTime<Utc>,
    ) -> Audited<PhaseRecord<BindDecision>> {
        let error_record = |e: &VaultError| {
            AuditRecord::new(AuditEventType::BindError)
                .ingest(ingest_id)
                .maybe_issuer(context.issuer.as_deref())
                .failure(e.code())
                .detail(e.to_string())
        };

        let decision = match create_bind_decision(ingest_id, eligibility, context, now) {
            Ok(decision) => decision,
            Err(e) => {
                let record = error_record(&e);
                return Audited::err(e, vec![record]);
            }
        };

        let record = match self.registry.register_bind(ingest_id, decision, now).await {
            Ok(record) => record,
            Err(e) => {
                let mut audit = error_record(&e);
                if let VaultError::ContractIdConflict { contract_id } = &e {
                    audit = audit.contract(contract_id.as_str());
                }
                return Audited::err(e, vec![audit]);
            }
        };

        let bind = &record.contract;
        tracing::info!(
            ingest_id = %ingest_id,
            contract_id = %bind.contract_id,
            allowed = bind.allowed,
            leases_required = bind.leases_required.len(),
            "Bind decided"
        );

        let mut decided = AuditRecord::new(AuditEventType::BindDecided)
            .ingest(ingest_id)
            .contract(&bind.contract_id)
            .issuer(&bind.issuer)
            .audience(Some(bind.audience.as_str()))
            .scopes(&bind.allowed_scopes)
            .allowed(bind.allowed);
        if !bind.allowed {
            decided = decided.detail(bind.reasons.join(","));
        }
        let mut records = vec![decided];
        for requirement in &bind.leases_required {
            records.push(
                AuditRecord::new(AuditEventType::BindPendingIssuance)
                    .ingest(ingest_id)
                    .contract(&bind.contract_id)
                    .issuer(&bind.issuer)
                    .detail(requirement.name.clone()),
            );
        }
        Audited::ok(record, records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PhaseState, PolicyFlags, Runtime};
    use crate::services::audit::MemoryAuditSink;
    use crate::services::locks::KeyedLocks;
    use crate::services::store::InMemoryStore;
    use std::sync::Arc;

    fn pipeline() -> (IngestPipeline, Arc<MemoryAuditSink>) {
        let sink = Arc::new(MemoryAuditSink::new());
        let registry = PhaseRegistry::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(KeyedLocks::new()),
        );
        (IngestPipeline::new(registry, AuditLog::new(sink.clone())), sink)
    }

    fn report() -> ScanReport {
        ScanReport {
            providers: vec!["openai".to_string()],
            runtime: Runtime::Frontend,
            requested_capabilities: vec!["ai.openai.inference".to_string()],
            required_secrets: vec!["OPENAI_API_KEY".to_string()],
            ..Default::default()
        }
    }

    fn context() -> BindContext {
        BindContext {
            issuer: Some("vault-builder".to_string()),
            audience: Some("app".to_string()),
            policy_flags: Some(PolicyFlags::default()),
            contract_id: None,
        }
    }

    #[tokio::test]
    async fn test_missing_scan_is_rejected_and_audited() {
        let (pipeline, sink) = pipeline();
        let err = pipeline.register_scan("i", None, Utc::now()).await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidInput(_)));
        assert_eq!(sink.of_type(AuditEventType::ScanRejected).len(), 1);
        assert_eq!(pipeline.registry().phase("i").await.unwrap(), PhaseState::None);
    }

    #[tokio::test]
    async fn test_eligibility_requires_scan() {
        let (pipeline, _) = pipeline();
        assert!(matches!(
            pipeline.evaluate_eligibility("i", Utc::now()).await,
            Err(VaultError::PreconditionFailed { phase: Phase::Eligibility, .. })
        ));
    }

    #[tokio::test]
    async fn test_full_pipeline_audits_each_step() {
        let (pipeline, sink) = pipeline();
        let now = Utc::now();
        pipeline.register_scan("i", Some(report()), now).await.unwrap();
        let eligibility = pipeline.evaluate_eligibility("i", now).await.unwrap();
        assert!(eligibility.contract.eligible);

        let bind = pipeline.bind("i", context(), None, now).await.unwrap();
        assert!(bind.contract.allowed);
        assert_eq!(bind.contract.contract_id, "i");

        let types: Vec<_> = sink.records().iter().map(|r| r.event_type).collect();
        assert_eq!(
            types,
            vec![
                AuditEventType::ScanRegistered,
                AuditEventType::EligibilityEvaluated,
                AuditEventType::BindDecided,
                AuditEventType::BindPendingIssuance,
            ]
        );
    }

    #[tokio::test]
    async fn test_bind_without_eligibility_is_precondition_failure() {
        let (pipeline, _) = pipeline();
        pipeline.register_scan("i", Some(report()), Utc::now()).await.unwrap();
        assert!(matches!(
            pipeline.bind("i", context(), None, Utc::now()).await,
            Err(VaultError::PreconditionFailed { phase: Phase::Bind, prerequisite: Phase::Eligibility })
        ));
    }

    #[tokio::test]
    async fn test_bind_missing_audience_is_audited_error() {
        let (pipeline, sink) = pipeline();
        let now = Utc::now();
        pipeline.register_scan("i", Some(report()), now).await.unwrap();
        pipeline.evaluate_eligibility("i", now).await.unwrap();

        let ctx = BindContext { audience: None, ..context() };
        assert!(matches!(
            pipeline.bind("i", ctx, None, now).await,
            Err(VaultError::MissingField("audience"))
        ));
        let errors = sink.of_type(AuditEventType::BindError);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].failure_reason.as_deref(), Some("MISSING_FIELD_AUDIENCE"));
        assert_eq!(pipeline.registry().phase("i").await.unwrap(), PhaseState::EligibleEvaluated);
    }

    #[tokio::test]
    async fn test_inline_eligibility_is_registered() {
        let (pipeline, _) = pipeline();
        let now = Utc::now();
        pipeline.register_scan("i", Some(report()), now).await.unwrap();

        let inline = MatchEligibility {
            squad: vec![],
            formations: vec![],
            clearance: vec![],
            stadium_rules: None,
            inspection_score: 0,
            warnings: vec![],
            timestamp: now,
        };
        let bind = pipeline.bind("i", context(), Some(inline), now).await.unwrap();
        assert!(!bind.contract.allowed);
        assert_eq!(
            bind.contract.reasons,
            vec!["EMPTY_SQUAD", "NO_FORMATIONS", "UNKNOWN_STADIUM"]
        );
        assert!(!pipeline.registry().eligibility("i").await.unwrap().contract.eligible);
    }
}
