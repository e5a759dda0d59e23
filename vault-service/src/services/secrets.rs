use async_trait::async_trait;
use dashmap::DashMap;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// What the vault hands back after minting. Never the material itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintedSecret {
    pub hash_fingerprint: String,
}

/// Secret material collaborator. Implementations own generation, storage and
/// encryption; the pipeline only sees fingerprints.
#[async_trait]
pub trait SecretVault: Send + Sync {
    async fn mint(&self, lease_id: &str, ttl_seconds: u64) -> anyhow::Result<MintedSecret>;
    async fn revoke(&self, lease_id: &str) -> anyhow::Result<()>;
}

fn fingerprint(material: &SecretString) -> String {
    hex::encode(Sha256::digest(material.expose_secret().as_bytes()))
}

/// Process-local vault for development and tests.
#[derive(Default)]
pub struct InMemorySecretVault {
    secrets: DashMap<String, SecretString>,
}

impl InMemorySecretVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    pub fn contains(&self, lease_id: &str) -> bool {
        self.secrets.contains_key(lease_id)
    }

    /// Lease id → fingerprint for every held secret.
    pub fn fingerprints(&self) -> BTreeMap<String, String> {
        self.secrets
            .iter()
            .map(|entry| (entry.key().clone(), fingerprint(entry.value())))
            .collect()
    }
}

#[async_trait]
impl SecretVault for InMemorySecretVault {
    async fn mint(&self, lease_id: &str, ttl_seconds: u64) -> anyhow::Result<MintedSecret> {
        if self.secrets.contains_key(lease_id) {
            anyhow::bail!("secret already minted for lease {}", lease_id);
        }

        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let material = SecretString::new(hex::encode(bytes));
        let hash_fingerprint = fingerprint(&material);
        self.secrets.insert(lease_id.to_string(), material);

        tracing::debug!(lease_id = %lease_id, ttl_seconds, "Secret minted");
        Ok(MintedSecret { hash_fingerprint })
    }

    async fn revoke(&self, lease_id: &str) -> anyhow::Result<()> {
        match self.secrets.remove(lease_id) {
            Some(_) => Ok(()),
            None => anyhow::bail!("no secret held for lease {}", lease_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mint_returns_fingerprint_only() {
        let vault = InMemorySecretVault::new();
        let minted = vault.mint("lease-1", 60).await.unwrap();

        assert_eq!(minted.hash_fingerprint.len(), 64);
        assert!(vault.contains("lease-1"));
        assert_eq!(
            vault.fingerprints().get("lease-1"),
            Some(&minted.hash_fingerprint)
        );
    }

    #[tokio::test]
    async fn test_each_mint_is_distinct() {
        let vault = InMemorySecretVault::new();
        let a = vault.mint("a", 60).await.unwrap();
        let b = vault.mint("b", 60).await.unwrap();
        assert_ne!(a.hash_fingerprint, b.hash_fingerprint);
        assert!(vault.mint("a", 60).await.is_err());
    }

    #[tokio::test]
    async fn test_revoke_removes_material() {
        let vault = InMemorySecretVault::new();
        vault.mint("lease-1", 60).await.unwrap();
        vault.revoke("lease-1").await.unwrap();
        assert!(vault.is_empty());
        assert!(vault.revoke("lease-1").await.is_err());
    }
}
