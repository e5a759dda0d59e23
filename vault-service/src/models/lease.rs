use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaseStatus {
    Active,
    Revoked,
    Expired,
}

impl LeaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseStatus::Active => "active",
            LeaseStatus::Revoked => "revoked",
            LeaseStatus::Expired => "expired",
        }
    }

    /// Only `active` may move, and only forward.
    pub fn can_transition_to(&self, next: LeaseStatus) -> bool {
        matches!(
            (self, next),
            (LeaseStatus::Active, LeaseStatus::Revoked) | (LeaseStatus::Active, LeaseStatus::Expired)
        )
    }
}

/// Lease metadata. The secret material itself never appears here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    pub lease_id: String,
    pub contract_id: String,
    pub scopes: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revocable: bool,
    pub status: LeaseStatus,
    pub hash_fingerprint: String,
    pub issuer: String,
}

impl Lease {
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_are_monotone() {
        assert!(LeaseStatus::Active.can_transition_to(LeaseStatus::Revoked));
        assert!(LeaseStatus::Active.can_transition_to(LeaseStatus::Expired));
        assert!(!LeaseStatus::Revoked.can_transition_to(LeaseStatus::Active));
        assert!(!LeaseStatus::Expired.can_transition_to(LeaseStatus::Active));
        assert!(!LeaseStatus::Expired.can_transition_to(LeaseStatus::Revoked));
        assert!(!LeaseStatus::Revoked.can_transition_to(LeaseStatus::Expired));
    }
}
