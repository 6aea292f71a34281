pub mod entities;
pub mod stripe;
pub mod user;

use std::sync::Arc;

use axum::{Router, middleware};

use crate::{
    adapters::http::{
        app_state::AppState,
        middleware::{RateLimiter, rate_limit_middleware},
    },
    infra::rate_limit::{RateLimitPolicy, RateLimitStore},
};

pub fn router(rate_limit_store: Arc<dyn RateLimitStore>) -> Router<AppState> {
    let api_limiter = RateLimiter::new(rate_limit_store.clone(), RateLimitPolicy::api());
    let stripe_limiter = RateLimiter::new(rate_limit_store, RateLimitPolicy::stripe());

    Router::new()
        .nest(
            "/entities",
            entities::router().route_layer(middleware::from_fn_with_state(
                api_limiter.clone(),
                rate_limit_middleware,
            )),
        )
        .nest(
            "/user",
            user::router().route_layer(middleware::from_fn_with_state(
                api_limiter,
                rate_limit_middleware,
            )),
        )
        .nest("/stripe", stripe::router(stripe_limiter))
}
