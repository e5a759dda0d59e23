//! Phase registry: the latest contract per phase per ingest.
//!
//! Writes are forward-only and take the ingest's write lock. Reads do not
//! lock; callers that need a consistent view across several reads hold the
//! ingest lock themselves (see the lease controller and consume gate).
//!
//! A contract id belongs to the first ingest that binds it and stays with
//! that ingest after a rebind. Binds take the contract id's claim lock
//! before the ingest lock.

use super::bind::validate_bind_decision;
use super::error::VaultError;
use super::locks::KeyedLocks;
use super::store::KeyValueStore;
use crate::models::contract::{
    BIND_CONTRACT_VERSION, ELIGIBILITY_CONTRACT_VERSION, SCAN_CONTRACT_VERSION,
};
use crate::models::{
    BindDecision, EligibilityDecision, IngestContracts, Phase, PhaseRecord, PhaseState, ScanReport,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Clone)]
pub struct PhaseRegistry {
    store: Arc<dyn KeyValueStore<IngestContracts>>,
    locks: Arc<KeyedLocks>,
    claims: Arc<KeyedLocks>,
}

impl PhaseRegistry {
    pub fn new(store: Arc<dyn KeyValueStore<IngestContracts>>, locks: Arc<KeyedLocks>) -> Self {
        Self {
            store,
            locks,
            claims: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn locks(&self) -> &Arc<KeyedLocks> {
        &self.locks
    }

    /// Everything registered for `ingest_id`; empty when nothing is.
    pub async fn snapshot(&self, ingest_id: &str) -> Result<IngestContracts, VaultError> {
        Ok(self.store.get(ingest_id).await?.unwrap_or_default())
    }

    pub async fn phase(&self, ingest_id: &str) -> Result<PhaseState, VaultError> {
        Ok(self.snapshot(ingest_id).await?.phase())
    }

    pub async fn register_scan(
        &self,
        ingest_id: &str,
        report: ScanReport,
        now: DateTime<Utc>,
    ) -> Result<PhaseRecord<ScanReport>, VaultError> {
        let _guard = self.locks.write(ingest_id).await;
        let mut contracts = self.snapshot(ingest_id).await?;
        let record = PhaseRecord::new(report, SCAN_CONTRACT_VERSION, now);
        contracts.scan = Some(record.clone());
        self.store.put(ingest_id, contracts).await?;
        Ok(record)
    }

    pub async fn register_eligibility(
        &self,
        ingest_id: &str,
        decision: EligibilityDecision,
        now: DateTime<Utc>,
    ) -> Result<PhaseRecord<EligibilityDecision>, VaultError> {
        let _guard = self.locks.write(ingest_id).await;
        let mut contracts = self.snapshot(ingest_id).await?;
        if contracts.scan.is_none() {
            return Err(precondition(Phase::Eligibility));
        }
        let record = PhaseRecord::new(decision, ELIGIBILITY_CONTRACT_VERSION, now);
        contracts.eligibility = Some(record.clone());
        self.store.put(ingest_id, contracts).await?;
        Ok(record)
    }

    pub async fn register_bind(
        &self,
        ingest_id: &str,
        decision: BindDecision,
        now: DateTime<Utc>,
    ) -> Result<PhaseRecord<BindDecision>, VaultError> {
        validate_bind_decision(&decision)?;
        let contract_id = decision.contract_id.clone();
        let _claim = self.claims.write(&contract_id).await;
        let _guard = self.locks.write(ingest_id).await;
        let mut contracts = self.snapshot(ingest_id).await?;
        if contracts.eligibility.is_none() {
            return Err(precondition(Phase::Bind));
        }
        self.ensure_claimable(ingest_id, &contract_id).await?;

        let record = PhaseRecord::new(decision, BIND_CONTRACT_VERSION, now);
        contracts.bind = Some(record.clone());
        if !contracts.claimed_contracts.contains(&contract_id) {
            contracts.claimed_contracts.push(contract_id);
        }
        self.store.put(ingest_id, contracts).await?;
        Ok(record)
    }

    pub async fn scan(&self, ingest_id: &str) -> Result<PhaseRecord<ScanReport>, VaultError> {
        self.snapshot(ingest_id)
            .await?
            .scan
            .ok_or(VaultError::PhaseNotFound(Phase::Scan))
    }

    pub async fn eligibility(
        &self,
        ingest_id: &str,
    ) -> Result<PhaseRecord<EligibilityDecision>, VaultError> {
        let contracts = self.snapshot(ingest_id).await?;
        if contracts.scan.is_none() {
            return Err(precondition(Phase::Eligibility));
        }
        contracts
            .eligibility
            .ok_or(VaultError::PhaseNotFound(Phase::Eligibility))
    }

    pub async fn bind(&self, ingest_id: &str) -> Result<PhaseRecord<BindDecision>, VaultError> {
        let contracts = self.snapshot(ingest_id).await?;
        if contracts.eligibility.is_none() {
            return Err(precondition(Phase::Bind));
        }
        contracts
            .bind
            .ok_or(VaultError::PhaseNotFound(Phase::Bind))
    }

    /// A contract id is free for `ingest_id` unless another ingest holds it
    /// or it names another registered ingest, whose default contract id it is.
    async fn ensure_claimable(
        &self,
        ingest_id: &str,
        contract_id: &str,
    ) -> Result<(), VaultError> {
        let conflict = || VaultError::ContractIdConflict {
            contract_id: contract_id.to_string(),
        };
        if contract_id != ingest_id && self.store.get(contract_id).await?.is_some() {
            return Err(conflict());
        }
        match self.holder(contract_id).await? {
            Some((owner, _)) if owner != ingest_id => Err(conflict()),
            _ => Ok(()),
        }
    }

    /// Ingest holding `contract_id`, with its contracts.
    ///
    /// The contract id defaults to the ingest id, so that key is tried first.
    async fn holder(
        &self,
        contract_id: &str,
    ) -> Result<Option<(String, IngestContracts)>, VaultError> {
        let direct = self.snapshot(contract_id).await?;
        if direct.holds_contract(contract_id) {
            return Ok(Some((contract_id.to_string(), direct)));
        }

        Ok(self
            .store
            .list()
            .await?
            .into_iter()
            .find(|(_, contracts)| contracts.holds_contract(contract_id)))
    }

    /// Resolve a bind by its contract id, returning the owning ingest id.
    ///
    /// None when no ingest holds the id, or its owner has since rebound to
    /// a different contract id.
    pub async fn find_bind_by_contract(
        &self,
        contract_id: &str,
    ) -> Result<Option<(String, PhaseRecord<BindDecision>)>, VaultError> {
        Ok(self.holder(contract_id).await?.and_then(|(ingest_id, contracts)| {
            contracts
                .bind_for_contract(contract_id)
                .cloned()
                .map(|bind| (ingest_id, bind))
        }))
    }

    /// Ingest that owns `contract_id`, falling back to the id itself.
    pub async fn ingest_for_contract(&self, contract_id: &str) -> Result<String, VaultError> {
        Ok(self
            .holder(contract_id)
            .await?
            .map(|(ingest_id, _)| ingest_id)
            .unwrap_or_else(|| contract_id.to_string()))
    }
}

fn precondition(phase: Phase) -> VaultError {
    VaultError::PreconditionFailed {
        phase,
        // Scan has no prerequisite and never reaches here.
        prerequisite: phase.prerequisite().unwrap_or(Phase::Scan),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BindContext, PolicyFlags, Runtime};
    use crate::services::bind::create_bind_decision;
    use crate::services::eligibility::{transform_to_eligibility, validate};
    use crate::services::store::InMemoryStore;

    fn registry() -> PhaseRegistry {
        PhaseRegistry::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(KeyedLocks::new()),
        )
    }

    fn report() -> ScanReport {
        ScanReport {
            providers: vec!["openai".to_string()],
            runtime: Runtime::Backend,
            requested_capabilities: vec!["ai.openai.inference".to_string()],
            required_secrets: vec!["OPENAI_API_KEY".to_string()],
            ..Default::default()
        }
    }

    fn bind_for(ingest_id: &str, decision: &EligibilityDecision, contract_id: Option<&str>) -> BindDecision {
        let context = BindContext {
            issuer: Some("vault-builder".to_string()),
            audience: Some("app".to_string()),
            policy_flags: Some(PolicyFlags::default()),
            contract_id: contract_id.map(str::to_string),
        };
        create_bind_decision(ingest_id, decision, &context, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_accessors_gate_on_prerequisites() {
        let registry = registry();

        assert!(matches!(
            registry.scan("i").await,
            Err(VaultError::PhaseNotFound(Phase::Scan))
        ));
        assert!(matches!(
            registry.eligibility("i").await,
            Err(VaultError::PreconditionFailed { phase: Phase::Eligibility, prerequisite: Phase::Scan })
        ));
        assert!(matches!(
            registry.bind("i").await,
            Err(VaultError::PreconditionFailed { phase: Phase::Bind, .. })
        ));

        registry.register_scan("i", report(), Utc::now()).await.unwrap();
        assert!(matches!(
            registry.eligibility("i").await,
            Err(VaultError::PhaseNotFound(Phase::Eligibility))
        ));
        assert!(matches!(
            registry.bind("i").await,
            Err(VaultError::PreconditionFailed { phase: Phase::Bind, .. })
        ));
    }

    #[tokio::test]
    async fn test_writes_are_forward_only() {
        let registry = registry();
        let decision = validate(&transform_to_eligibility(&report(), Utc::now()));

        assert!(matches!(
            registry.register_eligibility("i", decision.clone(), Utc::now()).await,
            Err(VaultError::PreconditionFailed { .. })
        ));
        assert!(matches!(
            registry.register_bind("i", bind_for("i", &decision, None), Utc::now()).await,
            Err(VaultError::PreconditionFailed { .. })
        ));
        assert_eq!(registry.phase("i").await.unwrap(), PhaseState::None);
    }

    #[tokio::test]
    async fn test_full_progression_and_stamps() {
        let registry = registry();
        let now = Utc::now();
        let decision = validate(&transform_to_eligibility(&report(), now));

        registry.register_scan("i", report(), now).await.unwrap();
        assert_eq!(registry.phase("i").await.unwrap(), PhaseState::Scanned);
        registry.register_eligibility("i", decision.clone(), now).await.unwrap();
        assert_eq!(registry.phase("i").await.unwrap(), PhaseState::EligibleEvaluated);
        let record = registry
            .register_bind("i", bind_for("i", &decision, None), now)
            .await
            .unwrap();
        assert_eq!(registry.phase("i").await.unwrap(), PhaseState::Bound);

        assert_eq!(record.contract_version, BIND_CONTRACT_VERSION);
        assert_eq!(record.registered_at, now);
        assert_eq!(registry.bind("i").await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_rescan_replaces_wholesale() {
        let registry = registry();
        registry.register_scan("i", report(), Utc::now()).await.unwrap();
        let replacement = ScanReport {
            warnings: vec!["second pass".to_string()],
            ..report()
        };
        registry.register_scan("i", replacement.clone(), Utc::now()).await.unwrap();
        assert_eq!(registry.scan("i").await.unwrap().contract, replacement);
    }

    #[tokio::test]
    async fn test_find_bind_by_contract() {
        let registry = registry();
        let now = Utc::now();
        let decision = validate(&transform_to_eligibility(&report(), now));

        for ingest in ["ingest-1", "ingest-2"] {
            registry.register_scan(ingest, report(), now).await.unwrap();
            registry.register_eligibility(ingest, decision.clone(), now).await.unwrap();
        }
        registry
            .register_bind("ingest-1", bind_for("ingest-1", &decision, None), now)
            .await
            .unwrap();
        registry
            .register_bind("ingest-2", bind_for("ingest-2", &decision, Some("contract-x")), now)
            .await
            .unwrap();

        let (owner, _) = registry.find_bind_by_contract("ingest-1").await.unwrap().unwrap();
        assert_eq!(owner, "ingest-1");
        let (owner, bind) = registry.find_bind_by_contract("contract-x").await.unwrap().unwrap();
        assert_eq!(owner, "ingest-2");
        assert_eq!(bind.contract.contract_id, "contract-x");
        assert!(registry.find_bind_by_contract("nope").await.unwrap().is_none());
        assert_eq!(registry.ingest_for_contract("nope").await.unwrap(), "nope");
    }

    async fn eligible(registry: &PhaseRegistry, ingest_id: &str) -> EligibilityDecision {
        let now = Utc::now();
        let decision = validate(&transform_to_eligibility(&report(), now));
        registry.register_scan(ingest_id, report(), now).await.unwrap();
        registry
            .register_eligibility(ingest_id, decision.clone(), now)
            .await
            .unwrap();
        decision
    }

    #[tokio::test]
    async fn test_contract_id_cannot_be_taken_by_another_ingest() {
        let registry = registry();
        let victim = eligible(&registry, "victim").await;
        let other = eligible(&registry, "aaa-other").await;

        registry
            .register_bind("victim", bind_for("victim", &victim, Some("contract-x")), Utc::now())
            .await
            .unwrap();

        let err = registry
            .register_bind("aaa-other", bind_for("aaa-other", &other, Some("contract-x")), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONTRACT_ID_CONFLICT");
        assert!(matches!(
            registry.bind("aaa-other").await,
            Err(VaultError::PhaseNotFound(Phase::Bind))
        ));

        // Another ingest's own id is its default contract id.
        let err = registry
            .register_bind("aaa-other", bind_for("aaa-other", &other, Some("victim")), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONTRACT_ID_CONFLICT");

        let (owner, _) = registry.find_bind_by_contract("contract-x").await.unwrap().unwrap();
        assert_eq!(owner, "victim");
        assert!(registry.locks().is_empty());
    }

    #[tokio::test]
    async fn test_rebind_keeps_earlier_contract_ids_claimed() {
        let registry = registry();
        let first = eligible(&registry, "ingest-1").await;
        let second = eligible(&registry, "ingest-2").await;

        registry
            .register_bind("ingest-1", bind_for("ingest-1", &first, Some("contract-a")), Utc::now())
            .await
            .unwrap();
        registry
            .register_bind("ingest-1", bind_for("ingest-1", &first, Some("contract-b")), Utc::now())
            .await
            .unwrap();
        // Rebinding the same id on the same ingest is allowed.
        registry
            .register_bind("ingest-1", bind_for("ingest-1", &first, Some("contract-b")), Utc::now())
            .await
            .unwrap();

        let err = registry
            .register_bind("ingest-2", bind_for("ingest-2", &second, Some("contract-a")), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONTRACT_ID_CONFLICT");

        // The retired id still resolves to its ingest but no longer to a bind.
        assert!(registry.find_bind_by_contract("contract-a").await.unwrap().is_none());
        assert_eq!(registry.ingest_for_contract("contract-a").await.unwrap(), "ingest-1");
        assert_eq!(
            registry.snapshot("ingest-1").await.unwrap().claimed_contracts,
            vec!["contract-a".to_string(), "contract-b".to_string()]
        );
    }

    #[tokio::test]
    async fn test_concurrent_binds_of_one_contract_id_admit_one() {
        let registry = registry();
        let mut decisions = Vec::new();
        for i in 0..8 {
            let ingest = format!("ingest-{}", i);
            let decision = eligible(&registry, &ingest).await;
            decisions.push((ingest, decision));
        }

        let mut tasks = Vec::new();
        for (ingest, decision) in decisions {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let bind = bind_for(&ingest, &decision, Some("shared"));
                registry.register_bind(&ingest, bind, Utc::now()).await.is_ok()
            }));
        }

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }

    #[tokio::test]
    async fn test_invalid_bind_is_not_persisted() {
        let registry = registry();
        let now = Utc::now();
        let decision = validate(&transform_to_eligibility(&report(), now));
        registry.register_scan("i", report(), now).await.unwrap();
        registry.register_eligibility("i", decision.clone(), now).await.unwrap();

        let mut bad = bind_for("i", &decision, None);
        bad.allowed_scopes.clear();
        assert!(matches!(
            registry.register_bind("i", bad, now).await,
            Err(VaultError::InvalidBindDecision(_))
        ));
        assert_eq!(registry.phase("i").await.unwrap(), PhaseState::EligibleEvaluated);
    }
}
