//! Append-only audit records.
//!
//! One record per significant pipeline event. Records are never updated or
//! deleted; sinks only append.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    ScanRegistered,
    ScanRejected,
    EligibilityEvaluated,
    BindDecided,
    BindPendingIssuance,
    BindError,
    LeaseIssued,
    LeaseRevoked,
    LeaseExpired,
    LeaseViolation,
    Consume,
    ConsumeDenied,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::ScanRegistered => "SCAN_REGISTERED",
            AuditEventType::ScanRejected => "SCAN_REJECTED",
            AuditEventType::EligibilityEvaluated => "ELIGIBILITY_EVALUATED",
            AuditEventType::BindDecided => "BIND_DECIDED",
            AuditEventType::BindPendingIssuance => "BIND_PENDING_ISSUANCE",
            AuditEventType::BindError => "BIND_ERROR",
            AuditEventType::LeaseIssued => "LEASE_ISSUED",
            AuditEventType::LeaseRevoked => "LEASE_REVOKED",
            AuditEventType::LeaseExpired => "LEASE_EXPIRED",
            AuditEventType::LeaseViolation => "LEASE_VIOLATION",
            AuditEventType::Consume => "CONSUME",
            AuditEventType::ConsumeDenied => "CONSUME_DENIED",
        }
    }

    /// Violations and denials are logged at warn level.
    pub fn is_violation(&self) -> bool {
        matches!(
            self,
            AuditEventType::ScanRejected
                | AuditEventType::BindError
                | AuditEventType::LeaseViolation
                | AuditEventType::ConsumeDenied
        )
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit line. Event-specific fields are omitted when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: AuditEventType,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditRecord {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            timestamp: Utc::now(),
            ingest_id: None,
            lease_id: None,
            contract_id: None,
            issuer: None,
            actor: None,
            audience: None,
            consumer_id: None,
            scopes: None,
            allowed: None,
            failure_reason: None,
            detail: None,
        }
    }

    pub fn ingest(mut self, ingest_id: impl Into<String>) -> Self {
        self.ingest_id = Some(ingest_id.into());
        self
    }

    pub fn lease(mut self, lease_id: impl Into<String>) -> Self {
        self.lease_id = Some(lease_id.into());
        self
    }

    pub fn contract(mut self, contract_id: impl Into<String>) -> Self {
        self.contract_id = Some(contract_id.into());
        self
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Set the issuer only when one is known.
    pub fn maybe_issuer(mut self, issuer: Option<&str>) -> Self {
        self.issuer = issuer.map(str::to_string);
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn audience(mut self, audience: Option<&str>) -> Self {
        self.audience = audience.map(str::to_string);
        self
    }

    pub fn consumer(mut self, consumer_id: Option<&str>) -> Self {
        self.consumer_id = consumer_id.map(str::to_string);
        self
    }

    pub fn scopes(mut self, scopes: &[String]) -> Self {
        self.scopes = Some(scopes.to_vec());
        self
    }

    pub fn allowed(mut self, allowed: bool) -> Self {
        self.allowed = Some(allowed);
        self
    }

    pub fn failure(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
