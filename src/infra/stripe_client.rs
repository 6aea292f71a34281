use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, de::DeserializeOwned};
use sha2::Sha256;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_provider::{CheckoutUrls, PaymentProviderPort, RedirectSession},
    domain::entities::stripe_event::{Customer, Subscription, USER_ID_METADATA_KEY},
};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
/// API version the webhook payload types are written against.
const STRIPE_API_VERSION: &str = "2024-12-18.acacia";

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
    api_base: String,
}

impl StripeClient {
    pub fn new(secret_key: SecretString) -> Self {
        Self {
            client: Client::new(),
            secret_key,
            api_base: STRIPE_API_BASE.to_string(),
        }
    }

    fn auth_header(&self) -> String {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:", self.secret_key.expose_secret()));
        format!("Basic {}", encoded)
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> AppResult<T> {
        let response = self
            .client
            .post(format!("{}{}", self.api_base, path))
            .header("Authorization", self.auth_header())
            .header("Stripe-Version", STRIPE_API_VERSION)
            .form(params)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> AppResult<T> {
        let response = self
            .client
            .get(format!("{}{}", self.api_base, path))
            .header("Authorization", self.auth_header())
            .header("Stripe-Version", STRIPE_API_VERSION)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> AppResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<StripeErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error.message.or(e.error.error_type))
                .unwrap_or_else(|| status.to_string());
            return Err(map_stripe_error(status, message));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = %e, "Failed to parse Stripe response");
            AppError::Internal(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

/// Provider 404s are permanent misses; 429 and 5xx are worth retrying; any other client
/// error is reported back to the caller.
fn map_stripe_error(status: StatusCode, message: String) -> AppError {
    match status {
        StatusCode::NOT_FOUND => {
            tracing::warn!(status = %status, message = %message, "Stripe object not found");
            AppError::NotFound(Some(message))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            tracing::warn!(status = %status, "Stripe rate limited the request");
            AppError::RateLimited
        }
        s if s.is_client_error() => {
            tracing::error!(status = %status, message = %message, "Stripe API error");
            AppError::validation(format!("Stripe error: {}", message))
        }
        _ => AppError::Internal(format!("Stripe API error: {} - {}", status, message)),
    }
}

#[async_trait]
impl PaymentProviderPort for StripeClient {
    async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
        user_id: Uuid,
    ) -> AppResult<Customer> {
        let mut params = vec![
            ("email".to_string(), email.to_string()),
            (
                format!("metadata[{}]", USER_ID_METADATA_KEY),
                user_id.to_string(),
            ),
        ];
        if let Some(name) = name {
            params.push(("name".to_string(), name.to_string()));
        }

        self.post_form("/customers", &params).await
    }

    async fn retrieve_customer(&self, customer_id: &str) -> AppResult<Customer> {
        self.get(&format!("/customers/{}", customer_id)).await
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> AppResult<Subscription> {
        self.get(&format!("/subscriptions/{}", subscription_id)).await
    }

    async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        user_id: Uuid,
        urls: &CheckoutUrls,
    ) -> AppResult<RedirectSession> {
        let params = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("mode".to_string(), "subscription".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("line_items[0][price]".to_string(), price_id.to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), urls.success_url.clone()),
            ("cancel_url".to_string(), urls.cancel_url.clone()),
            ("client_reference_id".to_string(), user_id.to_string()),
            ("allow_promotion_codes".to_string(), "true".to_string()),
            ("billing_address_collection".to_string(), "auto".to_string()),
        ];

        let session: StripeCheckoutSession = self.post_form("/checkout/sessions", &params).await?;
        let url = session
            .url
            .ok_or_else(|| AppError::Internal("Checkout session has no URL".into()))?;
        Ok(RedirectSession {
            id: session.id,
            url,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> AppResult<RedirectSession> {
        let params = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("return_url".to_string(), return_url.to_string()),
        ];

        let session: StripePortalSession =
            self.post_form("/billing_portal/sessions", &params).await?;
        Ok(RedirectSession {
            id: session.id,
            url: session.url,
        })
    }

    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel_at_period_end: bool,
    ) -> AppResult<Subscription> {
        let params = vec![(
            "cancel_at_period_end".to_string(),
            cancel_at_period_end.to_string(),
        )];
        self.post_form(&format!("/subscriptions/{}", subscription_id), &params)
            .await
    }
}

// ============================================================================
// Webhook Signature Verification
// ============================================================================

/// `hex(hmac_sha256(secret, "<timestamp>.<payload>"))`, as found in `v1=` entries.
pub fn compute_signature(secret: &SecretString, timestamp: i64, payload: &[u8]) -> AppResult<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| AppError::Internal("HMAC error".into()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a `stripe-signature` header (`t=<unix>,v1=<hex>[,v1=<hex>...]`) against the raw
/// body. The timestamp must be within `tolerance_secs` of `now`.
pub fn verify_webhook_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &SecretString,
    tolerance_secs: i64,
    now: i64,
) -> AppResult<()> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = Some(value),
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let timestamp: i64 = timestamp
        .ok_or_else(|| AppError::InvalidSignature("Missing timestamp in signature".into()))?
        .parse()
        .map_err(|_| AppError::InvalidSignature("Invalid timestamp".into()))?;

    if signatures.is_empty() {
        return Err(AppError::InvalidSignature("Missing signature".into()));
    }

    let expected = compute_signature(secret, timestamp, payload)?;
    if !signatures
        .iter()
        .any(|sig| constant_time_compare(sig, &expected))
    {
        return Err(AppError::InvalidSignature("No matching signature".into()));
    }

    if (now - timestamp).abs() > tolerance_secs {
        return Err(AppError::InvalidSignature(
            "Timestamp outside tolerance".into(),
        ));
    }

    Ok(())
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

// ============================================================================
// Stripe Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripePortalSession {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: Option<String>,
}
