use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::{
    adapters::http::{
        app_state::AppState,
        extract::{AppJson, CallerId},
        middleware::{RateLimiter, rate_limit_middleware},
    },
    app_error::{AppError, AppResult},
    application::use_cases::billing::CheckoutInput,
    domain::entities::stripe_event::WebhookEvent,
    infra::stripe_client::verify_webhook_signature,
};

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

/// Billing routes. Only the calls that reach Stripe on the caller's behalf sit behind
/// `limiter`; the webhook is authenticated by its signature instead.
pub fn router(limiter: RateLimiter) -> Router<AppState> {
    let limited = Router::new()
        .route("/checkout", post(create_checkout))
        .route("/portal", post(create_portal))
        .route("/subscription/cancel", post(cancel_subscription))
        .route("/subscription/resume", post(resume_subscription))
        .route_layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));

    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/subscription", get(get_subscription))
        .route("/plans", get(list_plans))
        .route("/payments", get(list_payments))
        .merge(limited)
}

#[derive(Serialize)]
struct RedirectResponse {
    url: String,
}

async fn create_checkout(
    State(app_state): State<AppState>,
    CallerId(user_id): CallerId,
    AppJson(payload): AppJson<CheckoutInput>,
) -> AppResult<impl IntoResponse> {
    let url = app_state
        .billing_use_cases
        .create_checkout(user_id, payload)
        .await?;
    Ok(Json(RedirectResponse { url }))
}

async fn create_portal(
    State(app_state): State<AppState>,
    CallerId(user_id): CallerId,
) -> AppResult<impl IntoResponse> {
    let url = app_state.billing_use_cases.create_portal(user_id).await?;
    Ok(Json(RedirectResponse { url }))
}

async fn cancel_subscription(
    State(app_state): State<AppState>,
    CallerId(user_id): CallerId,
) -> AppResult<impl IntoResponse> {
    let subscription = app_state.billing_use_cases.cancel(user_id).await?;
    Ok(Json(subscription))
}

async fn resume_subscription(
    State(app_state): State<AppState>,
    CallerId(user_id): CallerId,
) -> AppResult<impl IntoResponse> {
    let subscription = app_state.billing_use_cases.resume(user_id).await?;
    Ok(Json(subscription))
}

async fn get_subscription(
    State(app_state): State<AppState>,
    CallerId(user_id): CallerId,
) -> AppResult<impl IntoResponse> {
    let subscription = app_state
        .billing_use_cases
        .get_subscription(user_id)
        .await?;
    Ok(Json(subscription))
}

async fn list_payments(
    State(app_state): State<AppState>,
    CallerId(user_id): CallerId,
) -> AppResult<impl IntoResponse> {
    let payments = app_state.billing_use_cases.list_payments(user_id).await?;
    Ok(Json(payments))
}

async fn list_plans(State(app_state): State<AppState>) -> impl IntoResponse {
    Json(app_state.billing_use_cases.plans())
}

/// Stripe webhook. The signature is checked against the exact bytes received, before
/// the body is parsed.
async fn handle_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::InvalidSignature("missing stripe-signature header".into()))?;

    verify_webhook_signature(
        &body,
        signature,
        &app_state.config.stripe_webhook_secret,
        app_state.config.stripe_webhook_tolerance_secs,
        Utc::now().timestamp(),
    )
    .inspect_err(|e| tracing::warn!(error = %e, "Webhook signature rejected"))?;

    let event = WebhookEvent::parse(&body).map_err(|e| {
        tracing::warn!(error = %e, "Webhook body is not a Stripe event");
        AppError::validation("Invalid webhook payload")
    })?;

    app_state.billing_webhook_use_cases.handle(&event).await?;

    Ok(Json(json!({ "received": true })))
}
