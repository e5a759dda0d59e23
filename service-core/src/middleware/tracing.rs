use axum::http::HeaderValue;
use axum::{extract::Request, middleware::Next, response::Response};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 128;

/// Correlation id for the current request, also stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// A caller-supplied id is kept only if it is short printable ASCII;
/// anything else is replaced with a fresh UUID.
fn accept_request_id(raw: Option<&HeaderValue>) -> String {
    raw.and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.len() <= MAX_REQUEST_ID_LEN)
        .filter(|s| s.bytes().all(|b| b.is_ascii_graphic()))
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Stamp every request with an `x-request-id` and echo it on the response.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = accept_request_id(req.headers().get(REQUEST_ID_HEADER));
    let header_value = HeaderValue::from_str(&request_id).ok();

    if let Some(value) = &header_value {
        req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
    }
    req.extensions_mut().insert(RequestId(request_id));

    let mut response = next.run(req).await;
    if let Some(value) = header_value {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_well_formed_id() {
        let value = HeaderValue::from_static("req-42");
        assert_eq!(accept_request_id(Some(&value)), "req-42");
    }

    #[test]
    fn test_replaces_unusable_id() {
        let spaced = HeaderValue::from_static("two words");
        let replaced = accept_request_id(Some(&spaced));
        assert_ne!(replaced, "two words");
        assert!(Uuid::parse_str(&replaced).is_ok());

        let long = HeaderValue::from_str(&"a".repeat(200)).unwrap();
        assert_eq!(accept_request_id(Some(&long)).len(), 36);

        assert!(Uuid::parse_str(&accept_request_id(None)).is_ok());
    }
}
