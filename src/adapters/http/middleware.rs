use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{ConnectInfo, OriginalUri, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::Response,
};
use chrono::SecondsFormat;

use crate::{
    adapters::http::app_error_impl::error_resp,
    app_error::{AppError, ErrorCode},
    infra::rate_limit::{RateLimitInfo, RateLimitPolicy, RateLimitStore},
};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Middleware state: one policy applied to a group of routes, backed by a shared store.
#[derive(Clone)]
pub struct RateLimiter {
    pub store: Arc<dyn RateLimitStore>,
    pub policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    // Nested routers see a stripped URI; key on the full path.
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let key = format!(
        "{path}:{}",
        (limiter.policy.key_generator)(request.headers(), peer)
    );

    let decision = limiter
        .store
        .check_and_increment(&key, &limiter.policy)
        .await?;

    let info = *decision.info();
    if decision.is_allowed() {
        let mut response = next.run(request).await;
        insert_rate_limit_headers(response.headers_mut(), &info);
        return Ok(response);
    }

    tracing::warn!(
        key = %key,
        limit = info.limit,
        retry_after_secs = info.retry_after_secs,
        "Rate limit exceeded"
    );
    let mut response = error_resp(
        StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::RateLimited,
        limiter.policy.message,
        None,
    );
    let headers = response.headers_mut();
    insert_rate_limit_headers(headers, &info);
    headers.insert(RETRY_AFTER, HeaderValue::from(info.retry_after_secs));
    Ok(response)
}

fn insert_rate_limit_headers(headers: &mut HeaderMap, info: &RateLimitInfo) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(info.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(info.remaining));
    let reset = info.reset_at.to_rfc3339_opts(SecondsFormat::Millis, true);
    if let Ok(value) = HeaderValue::from_str(&reset) {
        headers.insert(X_RATELIMIT_RESET, value);
    }
}
