pub mod ingest;
pub mod lease;

pub use ingest::{BindRequest, BindResponse, ContractEnvelope, ScanRegisteredResponse};
pub use lease::{ConsumeLeaseRequest, IssueLeaseRequest, LeaseListResponse};

use serde::de::DeserializeOwned;

/// Empty and `null` bodies are absent; anything else must parse as `T`.
pub fn parse_optional_body<T: DeserializeOwned>(
    body: &[u8],
    what: &str,
) -> Result<Option<T>, String> {
    let trimmed = std::str::from_utf8(body)
        .map_err(|_| format!("{} must be UTF-8 JSON", what))?
        .trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| format!("malformed {}: {}", what, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Runtime, ScanReport};

    fn scan(body: &[u8]) -> Result<Option<ScanReport>, String> {
        parse_optional_body(body, "scan report")
    }

    fn lease(body: &[u8]) -> Result<Option<IssueLeaseRequest>, String> {
        parse_optional_body(body, "lease request")
    }

    #[test]
    fn test_parse_scan_body() {
        assert_eq!(scan(b""), Ok(None));
        assert_eq!(scan(b"  null "), Ok(None));
        assert!(scan(b"{\"providers\": 3}").is_err());

        let report = scan(br#"{"providers":["openai"],"runtime":"edge"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(report.providers, vec!["openai"]);
        assert_eq!(report.runtime, Runtime::Unknown);
    }

    #[test]
    fn test_mistyped_fields_are_not_absent() {
        let fractional = lease(br#"{"ttlSeconds": 1.5}"#).unwrap_err();
        assert!(fractional.starts_with("malformed lease request"));

        let oversized = format!(r#"{{"ttlSeconds": {}}}"#, u64::MAX);
        assert!(lease(oversized.as_bytes()).is_err());
        assert!(lease(&[0xff, 0xfe]).is_err());

        let consume: Result<Option<ConsumeLeaseRequest>, String> =
            parse_optional_body(br#"{"scopes": "ai.openai.inference"}"#, "consume request");
        assert!(consume.is_err());
        let bind: Result<Option<BindRequest>, String> =
            parse_optional_body(b"[1, 2]", "bind request");
        assert!(bind.is_err());

        let request = lease(br#"{"ttlSeconds": 60}"#).unwrap().unwrap();
        assert_eq!(request.ttl_seconds, Some(60));
    }
}
