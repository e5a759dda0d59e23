use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;

pub const REQUESTER_HEADER: &str = "x-requester";
pub const AUDIENCE_HEADER: &str = "x-audience";
pub const ISSUER_HEADER: &str = "x-issuer";
pub const CONSUMER_HEADER: &str = "x-consumer";

fn header(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Identity of the caller issuing or revoking a lease, from `x-requester`.
///
/// Never rejects: a missing requester is an issuance violation that must be
/// audited by the controller, not a transport error.
#[derive(Debug, Clone)]
pub struct Requester(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for Requester
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let requester = header(parts, REQUESTER_HEADER);
        if let Some(requester) = &requester {
            tracing::Span::current().record("requester", requester.as_str());
        }
        Ok(Requester(requester))
    }
}

/// Consumer identity headers. Each one overrides the matching body field.
#[derive(Debug, Clone, Default)]
pub struct ConsumerHeaders {
    pub audience: Option<String>,
    pub issuer: Option<String>,
    pub consumer_id: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for ConsumerHeaders
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ConsumerHeaders {
            audience: header(parts, AUDIENCE_HEADER),
            issuer: header(parts, ISSUER_HEADER),
            consumer_id: header(parts, CONSUMER_HEADER),
        })
    }
}
