//! Request context extraction middleware.
//!
//! Every request gets a request ID (taken from `X-Request-Id` or freshly
//! generated) and, for writes, an optional `Idempotency-Key`. There is no
//! authentication layer; the user identity is the configured default.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::FromRequestParts;
use axum::extract::State;
use axum::http::header::HeaderName;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use ulid::Ulid;

use tally_core::idempotency::MAX_KEY_LENGTH;

use crate::error::ApiError;
use crate::server::AppState;

/// Header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Header name for idempotency keys on write requests.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Per-request context derived from headers.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// User identifier (configured default; no auth layer in scope).
    pub user_id: String,
    /// Request ID for tracing/correlation.
    pub request_id: String,
    /// Optional idempotency key (safe retries).
    pub idempotency_key: Option<String>,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(existing) = parts.extensions.get::<Self>() {
            return Ok(existing.clone());
        }

        let headers = &parts.headers;

        let request_id =
            request_id_from_headers(headers).unwrap_or_else(|| Ulid::new().to_string());

        let idempotency_key = header_string(headers, IDEMPOTENCY_KEY_HEADER)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        if let Some(key) = idempotency_key.as_deref() {
            if key.len() > MAX_KEY_LENGTH {
                return Err(ApiError::bad_request(format!(
                    "Idempotency-Key must be at most {MAX_KEY_LENGTH} bytes"
                ))
                .with_request_id(request_id));
            }
        }

        let ctx = Self {
            user_id: state.config.default_user_id.clone(),
            request_id,
            idempotency_key,
        };

        parts.extensions.insert(ctx.clone());
        Ok(ctx)
    }
}

fn request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    header_string(headers, "X-Request-Id").or_else(|| header_string(headers, "X-Request-ID"))
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?;
    value.to_str().ok().map(str::to_string)
}

/// Context middleware.
///
/// Injects a [`RequestContext`] into request extensions and stamps the
/// request ID on the response for correlation.
pub async fn context_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let (mut parts, body) = req.into_parts();

    let ctx = match RequestContext::from_request_parts(&mut parts, &state).await {
        Ok(ctx) => ctx,
        Err(err) => return err.into_response(),
    };

    let mut req = Request::from_parts(parts, body);
    let request_id = ctx.request_id.clone();
    req.extensions_mut().insert(ctx);

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}
