use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::stripe_event::{Customer, Subscription},
};

// ============================================================================
// Port Types
// ============================================================================

/// URLs for checkout redirects
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub cancel_url: String,
}

/// A hosted page the caller is redirected to (checkout or billing portal).
#[derive(Debug, Clone)]
pub struct RedirectSession {
    pub id: String,
    pub url: String,
}

// ============================================================================
// Port
// ============================================================================

/// Outbound calls to the payment provider.
///
/// Implementations map "object does not exist" responses to `AppError::NotFound` and
/// transport or unexpected failures to `AppError::Internal`, so callers can tell a
/// permanent miss from a failure worth retrying.
#[async_trait]
pub trait PaymentProviderPort: Send + Sync {
    /// Create a customer tagged with the tenant user id in its metadata.
    async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
        user_id: Uuid,
    ) -> AppResult<Customer>;

    async fn retrieve_customer(&self, customer_id: &str) -> AppResult<Customer>;

    async fn retrieve_subscription(&self, subscription_id: &str) -> AppResult<Subscription>;

    /// Create a subscription-mode checkout session for one unit of `price_id`.
    async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        user_id: Uuid,
        urls: &CheckoutUrls,
    ) -> AppResult<RedirectSession>;

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> AppResult<RedirectSession>;

    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel_at_period_end: bool,
    ) -> AppResult<Subscription>;
}
