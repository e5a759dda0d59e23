pub mod audit;
pub mod bind;
pub mod consume;
pub mod eligibility;
pub mod error;
pub mod ingest;
pub mod issuance;
pub mod locks;
pub mod metrics;
pub mod registry;
pub mod secrets;
pub mod store;

pub use audit::{AuditLog, AuditSink, Audited, JsonLinesAuditSink, MemoryAuditSink, TracingAuditSink};
pub use consume::{ConsumeGate, ConsumeGrant, ConsumeRequest};
pub use error::{DenialReason, IssuanceViolation, LeaseStateViolation, StoreError, VaultError};
pub use ingest::IngestPipeline;
pub use issuance::{IssueRequest, LeaseController};
pub use locks::KeyedLocks;
pub use registry::PhaseRegistry;
pub use secrets::{InMemorySecretVault, MintedSecret, SecretVault};
pub use store::{InMemoryStore, JsonFileStore, KeyValueStore};
