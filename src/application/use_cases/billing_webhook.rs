//! Reconciles local billing records with Stripe webhook events.
//!
//! Every write is keyed by a provider identifier and is either an overwrite of status
//! fields or an insert that ignores duplicates, so a redelivered event converges on the
//! same end state. Events are applied in arrival order (last write wins).

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::payment_provider::PaymentProviderPort,
        use_cases::billing::{
            NewPayment, PaymentRepo, SubscriptionRepo, SubscriptionStatusUpdate, SubscriptionSync,
        },
    },
    domain::entities::{
        stripe_event::{CheckoutSession, Invoice, StripeEvent, Subscription, WebhookEvent},
        subscription::{PaymentStatus, SubscriptionStatus},
    },
};

/// What a webhook event did to local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum WebhookOutcome {
    /// A record was written.
    Applied,
    /// The event referenced nothing stored locally.
    NoMatch,
    /// The event type or payload is not something we act on.
    Ignored,
    /// The write was already recorded by an earlier delivery.
    Duplicate,
}

/// Whether a failure while processing a webhook should make Stripe redeliver it.
///
/// Transient failures return `true` (respond 5xx). Conditions a retry cannot change return
/// `false` (acknowledge and log).
pub fn is_retryable_error(error: &AppError) -> bool {
    match error {
        AppError::Database(_) => true,
        AppError::Internal(_) => true,
        AppError::RateLimited => true,

        AppError::NotFound(_) => false,
        AppError::ValidationError { .. } => false,
        AppError::Conflict(_) => false,
        AppError::Unauthorized => false,
        AppError::InvalidSignature(_) => false,
    }
}

/// A tenant id from customer metadata that names no stored user makes the write fail with
/// `NotFound`. The event is then a no-op rather than an error.
fn unknown_tenant<T>(result: &AppResult<T>, user_id: Uuid) -> bool {
    let missing = matches!(result, Err(AppError::NotFound(_)));
    if missing {
        tracing::warn!(user_id = %user_id, "Customer metadata names an unknown user");
    }
    missing
}

#[derive(Clone)]
pub struct BillingWebhookUseCases {
    subscription_repo: Arc<dyn SubscriptionRepo>,
    payment_repo: Arc<dyn PaymentRepo>,
    provider: Arc<dyn PaymentProviderPort>,
}

impl BillingWebhookUseCases {
    pub fn new(
        subscription_repo: Arc<dyn SubscriptionRepo>,
        payment_repo: Arc<dyn PaymentRepo>,
        provider: Arc<dyn PaymentProviderPort>,
    ) -> Self {
        Self {
            subscription_repo,
            payment_repo,
            provider,
        }
    }

    /// Apply a verified event.
    ///
    /// Returns `ValidationError` for a known event type whose payload could not be decoded,
    /// and a retryable error only when a write or provider call failed transiently.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn handle(&self, event: &WebhookEvent) -> AppResult<WebhookOutcome> {
        let result = match &event.event {
            StripeEvent::CheckoutSessionCompleted(session) => {
                self.on_checkout_completed(session).await
            }
            StripeEvent::SubscriptionUpdated(sub) => self.on_subscription_updated(sub).await,
            StripeEvent::SubscriptionDeleted(sub) => self.on_subscription_deleted(sub).await,
            StripeEvent::InvoicePaymentSucceeded(invoice) => {
                self.on_payment_succeeded(invoice).await
            }
            StripeEvent::InvoicePaymentFailed(invoice) => self.on_payment_failed(invoice).await,
            StripeEvent::Unhandled => {
                tracing::info!("Unhandled event type");
                Ok(WebhookOutcome::Ignored)
            }
            StripeEvent::Unparseable { reason } => {
                tracing::warn!(reason = %reason, "Webhook payload did not match its event type");
                return Err(AppError::validation(format!(
                    "Malformed payload for {}",
                    event.event_type
                )));
            }
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) if is_retryable_error(&e) => {
                tracing::error!(error = %e, retryable = true, "Webhook processing failed");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(error = %e, retryable = false, "Webhook processing skipped");
                WebhookOutcome::Ignored
            }
        };

        tracing::info!(outcome = outcome.as_ref(), "Webhook processed");
        Ok(outcome)
    }

    async fn on_checkout_completed(&self, session: &CheckoutSession) -> AppResult<WebhookOutcome> {
        if !session.is_subscription_mode() {
            return Ok(WebhookOutcome::Ignored);
        }
        let (Some(subscription), Some(customer)) = (&session.subscription, &session.customer)
        else {
            tracing::warn!(session_id = %session.id, "Checkout session without subscription or customer");
            return Ok(WebhookOutcome::Ignored);
        };

        let sub = self
            .provider
            .retrieve_subscription(subscription.id())
            .await?;
        let Some(user_id) = self.resolve_user_id(customer.id()).await? else {
            return Ok(WebhookOutcome::NoMatch);
        };

        let mut sync = SubscriptionSync::from_provider(&sub, Utc::now());
        sync.stripe_customer_id = Some(customer.id().to_string());
        let written = self.subscription_repo.upsert_for_user(user_id, &sync).await;
        if unknown_tenant(&written, user_id) {
            return Ok(WebhookOutcome::NoMatch);
        }
        written?;

        tracing::info!(
            user_id = %user_id,
            stripe_subscription_id = %sync.stripe_subscription_id,
            status = sync.status.as_ref(),
            "Subscription activated from checkout"
        );
        Ok(WebhookOutcome::Applied)
    }

    async fn on_subscription_updated(&self, sub: &Subscription) -> AppResult<WebhookOutcome> {
        let (start, end) = sub.period();
        let update = SubscriptionStatusUpdate {
            status: Some(SubscriptionStatus::from_stripe(&sub.status)),
            current_period_start: start,
            current_period_end: end,
            cancel_at_period_end: Some(sub.cancel_at_period_end),
        };
        self.update_subscription(&sub.id, &update).await
    }

    async fn on_subscription_deleted(&self, sub: &Subscription) -> AppResult<WebhookOutcome> {
        let update = SubscriptionStatusUpdate {
            status: Some(SubscriptionStatus::Cancelled),
            cancel_at_period_end: Some(false),
            ..Default::default()
        };
        self.update_subscription(&sub.id, &update).await
    }

    async fn on_payment_succeeded(&self, invoice: &Invoice) -> AppResult<WebhookOutcome> {
        let Some(stripe_subscription_id) = invoice.subscription_id() else {
            return Ok(WebhookOutcome::Ignored);
        };

        let mut user_id = match &invoice.customer {
            Some(customer) => self.resolve_user_id(customer.id()).await?,
            None => None,
        };
        if user_id.is_none() {
            user_id = self
                .subscription_repo
                .get_by_stripe_subscription_id(stripe_subscription_id)
                .await?
                .map(|s| s.user_id);
        }
        let Some(user_id) = user_id else {
            return Ok(WebhookOutcome::NoMatch);
        };

        let inserted = self
            .payment_repo
            .insert_if_absent(&NewPayment {
                user_id,
                stripe_subscription_id: Some(stripe_subscription_id.to_string()),
                stripe_invoice_id: invoice.id.clone(),
                stripe_payment_intent_id: invoice.payment_intent.as_ref().map(|p| p.id().to_string()),
                amount: invoice.amount_paid,
                currency: invoice.currency.clone(),
                status: PaymentStatus::Succeeded,
                invoice_url: invoice.hosted_invoice_url.clone(),
            })
            .await;
        if unknown_tenant(&inserted, user_id) {
            return Ok(WebhookOutcome::NoMatch);
        }

        Ok(if inserted? {
            WebhookOutcome::Applied
        } else {
            WebhookOutcome::Duplicate
        })
    }

    async fn on_payment_failed(&self, invoice: &Invoice) -> AppResult<WebhookOutcome> {
        let Some(stripe_subscription_id) = invoice.subscription_id() else {
            return Ok(WebhookOutcome::Ignored);
        };
        let update = SubscriptionStatusUpdate {
            status: Some(SubscriptionStatus::PastDue),
            ..Default::default()
        };
        self.update_subscription(stripe_subscription_id, &update)
            .await
    }

    async fn update_subscription(
        &self,
        stripe_subscription_id: &str,
        update: &SubscriptionStatusUpdate,
    ) -> AppResult<WebhookOutcome> {
        let matched = self
            .subscription_repo
            .update_by_stripe_subscription_id(stripe_subscription_id, update)
            .await?;
        if !matched {
            tracing::debug!(stripe_subscription_id, "No local subscription for event");
            return Ok(WebhookOutcome::NoMatch);
        }
        Ok(WebhookOutcome::Applied)
    }

    /// The tenant user id stored in the customer's metadata, if any.
    async fn resolve_user_id(&self, customer_id: &str) -> AppResult<Option<Uuid>> {
        let customer = self.provider.retrieve_customer(customer_id).await?;
        if customer.deleted {
            return Ok(None);
        }
        let user_id = customer.user_id().and_then(|raw| match Uuid::parse_str(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(customer_id, user_id = raw, "Customer metadata holds an invalid user id");
                None
            }
        });
        Ok(user_id)
    }
}
