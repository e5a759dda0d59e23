//! Scan Report: what the workspace scanner detected for one ingest.

use serde::{Deserialize, Serialize};

/// Runtime environment the scanner attributed to the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    Frontend,
    Backend,
    Hybrid,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Runtime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Runtime::Frontend => "frontend",
            Runtime::Backend => "backend",
            Runtime::Hybrid => "hybrid",
            Runtime::Unknown => "unknown",
        }
    }
}

/// Scanner output. Produced outside this service and never mutated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    #[serde(default)]
    pub providers: Vec<String>,
    #[serde(default)]
    pub runtime: Runtime,
    #[serde(default)]
    pub requested_capabilities: Vec<String>,
    #[serde(default)]
    pub required_secrets: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub files_scanned: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default_to_empty() {
        let report: ScanReport = serde_json::from_str(r#"{"providers":["openai"]}"#).unwrap();
        assert_eq!(report.providers, vec!["openai"]);
        assert_eq!(report.runtime, Runtime::Unknown);
        assert!(report.requested_capabilities.is_empty());
        assert!(report.files_scanned.is_empty());
    }

    #[test]
    fn test_unrecognised_runtime_is_unknown() {
        let report: ScanReport = serde_json::from_str(r#"{"runtime":"edge"}"#).unwrap();
        assert_eq!(report.runtime, Runtime::Unknown);

        let report: ScanReport = serde_json::from_str(r#"{"runtime":"hybrid"}"#).unwrap();
        assert_eq!(report.runtime, Runtime::Hybrid);
    }
}
