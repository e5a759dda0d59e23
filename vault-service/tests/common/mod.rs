//! Shared harness for router-level tests.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;
use vault_service::config::VaultConfig;
use vault_service::models::{AuditRecord, IngestContracts, Lease};
use vault_service::services::error::StoreError;
use vault_service::services::{
    AuditSink, InMemorySecretVault, InMemoryStore, KeyValueStore, MemoryAuditSink,
};
use vault_service::{build_router, AppState};

pub const ISSUER: &str = "vault-builder";
pub const AUDIENCE: &str = "runtime-gateway";
pub const SCOPE: &str = "ai.openai.inference";

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub audit: Arc<MemoryAuditSink>,
    pub vault: Arc<InMemorySecretVault>,
    pub leases: Arc<InMemoryStore<Lease>>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(VaultConfig::for_tests())
    }

    pub fn with_config(config: VaultConfig) -> Self {
        let leases = Arc::new(InMemoryStore::new());
        Self::assemble(config, leases.clone(), leases, Arc::new(MemoryAuditSink::new()), None)
    }

    /// Lease writes always fail; reads see an empty store.
    pub fn with_failing_lease_store() -> Self {
        let leases = Arc::new(InMemoryStore::new());
        Self::assemble(
            VaultConfig::for_tests(),
            leases,
            Arc::new(FailingLeaseStore),
            Arc::new(MemoryAuditSink::new()),
            None,
        )
    }

    /// Every audit append fails.
    pub fn with_failing_audit_sink() -> Self {
        let leases = Arc::new(InMemoryStore::new());
        Self::assemble(
            VaultConfig::for_tests(),
            leases.clone(),
            leases,
            Arc::new(MemoryAuditSink::new()),
            Some(Arc::new(FailingAuditSink) as Arc<dyn AuditSink>),
        )
    }

    fn assemble(
        config: VaultConfig,
        leases: Arc<InMemoryStore<Lease>>,
        lease_store: Arc<dyn KeyValueStore<Lease>>,
        audit: Arc<MemoryAuditSink>,
        sink_override: Option<Arc<dyn AuditSink>>,
    ) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("vault_service=debug")
            .with_test_writer()
            .try_init();

        let vault = Arc::new(InMemorySecretVault::new());
        let contracts: Arc<dyn KeyValueStore<IngestContracts>> = Arc::new(InMemoryStore::new());
        let sink: Arc<dyn AuditSink> = match sink_override {
            Some(sink) => sink,
            None => audit.clone(),
        };

        let state = AppState::new(config, contracts, lease_store, vault.clone(), sink);
        let router = build_router(state.clone());

        Self {
            state,
            router,
            audit,
            vault,
            leases,
        }
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.post_with_headers(uri, body, &[]).await
    }

    pub async fn post_with_headers(
        &self,
        uri: &str,
        body: Value,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        self.post_raw(uri, &body.to_string(), headers).await
    }

    /// POST a body verbatim, for payloads `serde_json::Value` cannot express.
    pub async fn post_raw(
        &self,
        uri: &str,
        body: &str,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    /// Scan, eligibility and an approved bind for `ingest_id`.
    pub async fn bound_ingest(&self, ingest_id: &str) {
        let (status, _) = self
            .post(&format!("/ingest/{}/scan", ingest_id), openai_scan())
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = self
            .post(&format!("/ingest/{}/eligibility", ingest_id), Value::Null)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["eligible"], true);

        let (status, body) = self
            .post(&format!("/ingest/{}/bind", ingest_id), bind_body(600))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "approved_pending_secrets");
    }

    pub async fn issue(&self, ingest_id: &str, body: Value) -> (StatusCode, Value) {
        self.post_with_headers(
            &format!("/ingest/{}/lease", ingest_id),
            body,
            &[("x-requester", ISSUER)],
        )
        .await
    }

    /// Bound ingest plus one active lease; returns the lease id.
    pub async fn leased_ingest(&self, ingest_id: &str) -> String {
        self.bound_ingest(ingest_id).await;
        let (status, lease) = self.issue(ingest_id, lease_body(ingest_id, 300)).await;
        assert_eq!(status, StatusCode::CREATED, "{}", lease);
        lease["leaseId"].as_str().unwrap().to_string()
    }

    pub async fn consume(&self, lease_id: &str, body: Value) -> (StatusCode, Value) {
        self.post(&format!("/lease/{}/consume", lease_id), body).await
    }

    pub fn audit_types(&self) -> Vec<String> {
        self.audit
            .records()
            .iter()
            .map(|r| r.event_type.as_str().to_string())
            .collect()
    }
}

pub fn openai_scan() -> Value {
    json!({
        "providers": ["openai"],
        "runtime": "frontend",
        "requestedCapabilities": [SCOPE],
        "requiredSecrets": ["OPENAI_API_KEY"],
        "filesScanned": ["src/app.ts"]
    })
}

pub fn bind_body(max_ttl_seconds: u64) -> Value {
    json!({
        "issuer": ISSUER,
        "audience": AUDIENCE,
        "policyFlags": { "maxTtlSeconds": max_ttl_seconds }
    })
}

pub fn lease_body(contract_id: &str, ttl_seconds: i64) -> Value {
    json!({
        "contractId": contract_id,
        "scopes": [SCOPE],
        "ttlSeconds": ttl_seconds,
        "audience": AUDIENCE
    })
}

pub fn consume_body() -> Value {
    json!({
        "audience": AUDIENCE,
        "issuer": ISSUER,
        "scopes": [SCOPE],
        "consumerId": "worker-1"
    })
}

struct FailingLeaseStore;

#[async_trait]
impl KeyValueStore<Lease> for FailingLeaseStore {
    async fn get(&self, _key: &str) -> Result<Option<Lease>, StoreError> {
        Ok(None)
    }

    async fn put(&self, _key: &str, _value: Lease) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("lease store offline".to_string()))
    }

    async fn list(&self) -> Result<Vec<(String, Lease)>, StoreError> {
        Ok(Vec::new())
    }
}

struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn append(&self, _record: &AuditRecord) -> anyhow::Result<()> {
        anyhow::bail!("audit sink offline")
    }
}
