use serde::Deserialize;
use service_core::config::{self as core_config, get_env, parse_flag};
use service_core::error::AppError;
use std::env;

/// Hard ceiling on any lease TTL: 90 days.
pub const DEFAULT_MAX_TTL_SECONDS: u64 = 7_776_000;

#[derive(Debug, Clone, Deserialize)]
pub struct VaultConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub phase: PhaseConfig,
    pub lease: LeaseConfig,
    pub storage: StorageConfig,
    pub audit: AuditConfig,
}

/// Kill switches for the two phases that touch secrets.
#[derive(Debug, Clone, Deserialize)]
pub struct PhaseConfig {
    pub issuance_enabled: bool,
    pub consumption_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaseConfig {
    pub max_ttl_seconds: u64,
    pub authorized_issuers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// JSON-lines file; records go to the tracing `audit` target when unset.
    pub path: Option<String>,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "file" => Ok(StorageBackend::File),
            _ => Err(format!("Invalid storage backend: {}", s)),
        }
    }
}

impl LeaseConfig {
    pub fn is_authorized_issuer(&self, issuer: &str) -> bool {
        self.authorized_issuers.iter().any(|allowed| allowed == issuer)
    }
}

impl VaultConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = common.is_prod();

        let issuance_enabled = get_env("VAULT_ISSUANCE_ENABLED", Some("true"), is_prod)?;
        let consumption_enabled = get_env("VAULT_CONSUMPTION_ENABLED", Some("true"), is_prod)?;
        let max_ttl = get_env(
            "VAULT_MAX_TTL_SECONDS",
            Some(&DEFAULT_MAX_TTL_SECONDS.to_string()),
            is_prod,
        )?;

        Ok(VaultConfig {
            common,
            service_name: get_env("SERVICE_NAME", Some("vault-service"), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            phase: PhaseConfig {
                issuance_enabled: parse_flag("VAULT_ISSUANCE_ENABLED", &issuance_enabled)?,
                consumption_enabled: parse_flag("VAULT_CONSUMPTION_ENABLED", &consumption_enabled)?,
            },
            lease: LeaseConfig {
                max_ttl_seconds: parse_max_ttl(&max_ttl)?,
                authorized_issuers: parse_issuers(&get_env(
                    "VAULT_AUTHORIZED_ISSUERS",
                    Some("vault-builder"),
                    is_prod,
                )?),
            },
            storage: StorageConfig {
                backend: get_env("VAULT_STORAGE_BACKEND", Some("memory"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
                data_dir: get_env("VAULT_DATA_DIR", Some("data"), is_prod)?,
            },
            audit: AuditConfig {
                path: env::var("VAULT_AUDIT_PATH").ok().filter(|v| !v.is_empty()),
            },
        })
    }

    /// Defaults for tests and embedding: everything enabled, in-memory.
    pub fn for_tests() -> Self {
        VaultConfig {
            common: core_config::Config::default(),
            service_name: "vault-service".to_string(),
            log_level: "debug".to_string(),
            otlp_endpoint: None,
            phase: PhaseConfig {
                issuance_enabled: true,
                consumption_enabled: true,
            },
            lease: LeaseConfig {
                max_ttl_seconds: DEFAULT_MAX_TTL_SECONDS,
                authorized_issuers: vec!["vault-builder".to_string()],
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                data_dir: "data".to_string(),
            },
            audit: AuditConfig { path: None },
        }
    }
}

fn parse_max_ttl(raw: &str) -> Result<u64, AppError> {
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(AppError::ConfigError(anyhow::anyhow!(
            "VAULT_MAX_TTL_SECONDS must be a positive integer, got '{}'",
            raw
        ))),
        Ok(value) => Ok(value),
    }
}

fn parse_issuers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_issuers_trims_and_drops_empties() {
        assert_eq!(
            parse_issuers(" vault-builder, ops ,,"),
            vec!["vault-builder".to_string(), "ops".to_string()]
        );
        assert!(parse_issuers("").is_empty());
    }

    #[test]
    fn test_parse_max_ttl() {
        assert_eq!(parse_max_ttl("3600").unwrap(), 3600);
        assert!(parse_max_ttl("0").is_err());
        assert!(parse_max_ttl("-5").is_err());
        assert!(parse_max_ttl("soon").is_err());
    }

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!("FILE".parse::<StorageBackend>().unwrap(), StorageBackend::File);
        assert!("s3".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_issuer_allow_list() {
        let config = VaultConfig::for_tests();
        assert!(config.lease.is_authorized_issuer("vault-builder"));
        assert!(!config.lease.is_authorized_issuer("intruder"));
    }
}
