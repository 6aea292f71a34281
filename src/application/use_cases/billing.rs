use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::payment_provider::{CheckoutUrls, PaymentProviderPort},
        use_cases::user::UserRepo,
    },
    domain::entities::{
        plan::{DEFAULT_PAID_PLAN_NAME, FREE_PLAN_NAME, Plan, catalog},
        stripe_event::Subscription,
        subscription::{BillingCycle, PaymentStatus, SubscriptionStatus},
    },
};

/// Length of the placeholder period given to the lazily created free subscription.
const FREE_PERIOD_DAYS: i64 = 30;

const BILLING_PATH: &str = "/dashboard/billing";

// ============================================================================
// Profile Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_name: String,
    /// Minor currency units.
    pub plan_price: i64,
    pub billing_cycle: BillingCycle,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Provider subscription state written onto a tenant's record after checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionSync {
    pub stripe_subscription_id: String,
    pub stripe_customer_id: Option<String>,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub plan_name: String,
    pub plan_price: i64,
    pub billing_cycle: BillingCycle,
    pub cancel_at_period_end: bool,
}

impl SubscriptionSync {
    pub fn from_provider(sub: &Subscription, now: DateTime<Utc>) -> Self {
        let price = sub.first_price();
        let (start, end) = sub.period();
        let start = start.unwrap_or(now);
        Self {
            stripe_subscription_id: sub.id.clone(),
            stripe_customer_id: sub.customer.as_ref().map(|c| c.id().to_string()),
            status: SubscriptionStatus::from_stripe(&sub.status),
            current_period_start: start,
            current_period_end: end.unwrap_or(start + Duration::days(FREE_PERIOD_DAYS)),
            plan_name: price
                .and_then(|p| p.nickname.clone())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| DEFAULT_PAID_PLAN_NAME.to_string()),
            plan_price: price.and_then(|p| p.unit_amount).unwrap_or(0),
            billing_cycle: BillingCycle::from_interval(
                price
                    .and_then(|p| p.recurring.as_ref())
                    .map(|r| r.interval.as_str()),
            ),
            cancel_at_period_end: sub.cancel_at_period_end,
        }
    }
}

/// Fields changed by subscription lifecycle events. `None` leaves the column as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionStatusUpdate {
    pub status: Option<SubscriptionStatus>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stripe_subscription_id: Option<String>,
    pub stripe_invoice_id: String,
    pub stripe_payment_intent_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub invoice_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: Uuid,
    pub stripe_subscription_id: Option<String>,
    pub stripe_invoice_id: String,
    pub stripe_payment_intent_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub invoice_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutInput {
    #[validate(length(min = 1, message = "Price ID is required"))]
    pub price_id: String,
}

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait SubscriptionRepo: Send + Sync {
    async fn get_by_user_id(&self, user_id: Uuid) -> AppResult<Option<SubscriptionProfile>>;
    async fn get_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
    ) -> AppResult<Option<SubscriptionProfile>>;
    /// Store the provider customer for `user_id`, creating the free subscription if the
    /// user has none yet.
    async fn attach_customer(
        &self,
        user_id: Uuid,
        stripe_customer_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<SubscriptionProfile>;
    /// Insert or overwrite the user's subscription with provider state. Fails with
    /// `NotFound` when `user_id` names no stored user.
    async fn upsert_for_user(
        &self,
        user_id: Uuid,
        sync: &SubscriptionSync,
    ) -> AppResult<SubscriptionProfile>;
    /// Returns whether a record matched.
    async fn update_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
        update: &SubscriptionStatusUpdate,
    ) -> AppResult<bool>;
    async fn set_cancel_at_period_end(
        &self,
        user_id: Uuid,
        cancel_at_period_end: bool,
    ) -> AppResult<Option<SubscriptionProfile>>;
}

#[async_trait]
pub trait PaymentRepo: Send + Sync {
    /// Returns `false` when a payment for the same invoice or payment intent already exists.
    /// Fails with `NotFound` when the payment's user is not stored.
    async fn insert_if_absent(&self, payment: &NewPayment) -> AppResult<bool>;
    async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<PaymentProfile>>;
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct BillingUseCases {
    user_repo: Arc<dyn UserRepo>,
    subscription_repo: Arc<dyn SubscriptionRepo>,
    payment_repo: Arc<dyn PaymentRepo>,
    provider: Arc<dyn PaymentProviderPort>,
    app_url: Url,
    pro_price_id: String,
    business_price_id: String,
}

impl BillingUseCases {
    pub fn new(
        user_repo: Arc<dyn UserRepo>,
        subscription_repo: Arc<dyn SubscriptionRepo>,
        payment_repo: Arc<dyn PaymentRepo>,
        provider: Arc<dyn PaymentProviderPort>,
        app_url: Url,
        pro_price_id: String,
        business_price_id: String,
    ) -> Self {
        Self {
            user_repo,
            subscription_repo,
            payment_repo,
            provider,
            app_url,
            pro_price_id,
            business_price_id,
        }
    }

    fn billing_url(&self, query: Option<&str>) -> String {
        let base = self.app_url.as_str().trim_end_matches('/');
        match query {
            Some(q) => format!("{base}{BILLING_PATH}?{q}"),
            None => format!("{base}{BILLING_PATH}"),
        }
    }

    /// Start a subscription checkout and return the hosted checkout URL.
    #[instrument(skip(self, input))]
    pub async fn create_checkout(&self, user_id: Uuid, input: CheckoutInput) -> AppResult<String> {
        input.validate()?;

        let user = self
            .user_repo
            .get_profile_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        let existing = self.subscription_repo.get_by_user_id(user_id).await?;
        let customer_id = match existing.and_then(|s| s.stripe_customer_id) {
            Some(id) => id,
            None => {
                let customer = self
                    .provider
                    .create_customer(&user.email, Some(&user.name), user_id)
                    .await?;
                self.subscription_repo
                    .attach_customer(user_id, &customer.id, Utc::now())
                    .await?;
                tracing::info!(customer_id = %customer.id, "Created payment customer");
                customer.id
            }
        };

        let urls = CheckoutUrls {
            success_url: self.billing_url(Some("success=true")),
            cancel_url: self.billing_url(Some("canceled=true")),
        };
        let session = self
            .provider
            .create_checkout_session(&customer_id, &input.price_id, user_id, &urls)
            .await?;

        tracing::info!(session_id = %session.id, "Checkout session created");
        Ok(session.url)
    }

    /// Open the provider's self-service billing portal for the caller.
    #[instrument(skip(self))]
    pub async fn create_portal(&self, user_id: Uuid) -> AppResult<String> {
        let customer_id = self
            .subscription_repo
            .get_by_user_id(user_id)
            .await?
            .and_then(|s| s.stripe_customer_id)
            .ok_or_else(no_subscription)?;

        let session = self
            .provider
            .create_portal_session(&customer_id, &self.billing_url(None))
            .await?;
        Ok(session.url)
    }

    #[instrument(skip(self))]
    pub async fn get_subscription(&self, user_id: Uuid) -> AppResult<SubscriptionProfile> {
        self.subscription_repo
            .get_by_user_id(user_id)
            .await?
            .ok_or_else(no_subscription)
    }

    #[instrument(skip(self))]
    pub async fn list_payments(&self, user_id: Uuid) -> AppResult<Vec<PaymentProfile>> {
        self.payment_repo.list_by_user(user_id).await
    }

    /// Cancel at the end of the current period.
    pub async fn cancel(&self, user_id: Uuid) -> AppResult<SubscriptionProfile> {
        self.set_cancel_at_period_end(user_id, true).await
    }

    /// Undo a pending cancellation.
    pub async fn resume(&self, user_id: Uuid) -> AppResult<SubscriptionProfile> {
        self.set_cancel_at_period_end(user_id, false).await
    }

    #[instrument(skip(self))]
    async fn set_cancel_at_period_end(
        &self,
        user_id: Uuid,
        cancel_at_period_end: bool,
    ) -> AppResult<SubscriptionProfile> {
        let stripe_subscription_id = self
            .subscription_repo
            .get_by_user_id(user_id)
            .await?
            .and_then(|s| s.stripe_subscription_id)
            .ok_or_else(no_subscription)?;

        self.provider
            .set_cancel_at_period_end(&stripe_subscription_id, cancel_at_period_end)
            .await?;

        self.subscription_repo
            .set_cancel_at_period_end(user_id, cancel_at_period_end)
            .await?
            .ok_or_else(no_subscription)
    }

    pub fn plans(&self) -> Vec<Plan> {
        catalog(&self.pro_price_id, &self.business_price_id)
    }
}

fn no_subscription() -> AppError {
    AppError::not_found("No subscription found")
}

/// Free plan row used when a user first reaches checkout.
pub fn free_subscription(
    user_id: Uuid,
    stripe_customer_id: &str,
    now: DateTime<Utc>,
) -> SubscriptionProfile {
    SubscriptionProfile {
        id: Uuid::new_v4(),
        user_id,
        plan_name: FREE_PLAN_NAME.to_string(),
        plan_price: 0,
        billing_cycle: BillingCycle::Monthly,
        status: SubscriptionStatus::Active,
        current_period_start: now,
        current_period_end: now + Duration::days(FREE_PERIOD_DAYS),
        cancel_at_period_end: false,
        stripe_customer_id: Some(stripe_customer_id.to_string()),
        stripe_subscription_id: None,
        created_at: now,
        updated_at: now,
    }
}
