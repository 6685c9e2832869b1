use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use std::convert::Infallible;

use crate::models::RequestContext;

pub const USER_ID_HEADER: &str = "x-user-id";

// Caller identity for the audit trail. Missing headers are not an error:
// the audit row just records less.
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(context_from_headers(&parts.headers))
    }
}

pub fn context_from_headers(headers: &HeaderMap) -> RequestContext {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    // First hop of X-Forwarded-For is the original client.
    let ip_address = text("x-forwarded-for")
        .and_then(|chain| chain.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty())
        .or_else(|| text("x-real-ip"));

    RequestContext {
        user_id: text(USER_ID_HEADER),
        ip_address,
        user_agent: text(header::USER_AGENT.as_str()),
    }
}
