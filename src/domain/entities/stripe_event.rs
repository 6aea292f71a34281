//! Typed view of the Stripe webhook events the reconciler acts on.
//!
//! Each known event type gets its own payload shape. Payloads are decoded once, at the
//! edge; a known type whose payload does not decode is kept as [`StripeEvent::Unparseable`]
//! instead of being inspected field by field later on.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";
pub const INVOICE_PAYMENT_SUCCEEDED: &str = "invoice.payment_succeeded";
pub const INVOICE_PAYMENT_FAILED: &str = "invoice.payment_failed";

/// Metadata key under which the tenant's user id is stored on the Stripe customer.
pub const USER_ID_METADATA_KEY: &str = "userId";

/// Convert a Unix timestamp (seconds) to a UTC timestamp.
pub fn timestamp_to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
}

/// A reference that Stripe either sends as a bare id or as the expanded object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    pub fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object { id } => id,
        }
    }
}

// ============================================================================
// Payload Types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub customer: Option<Expandable>,
    #[serde(default)]
    pub subscription: Option<Expandable>,
}

impl CheckoutSession {
    pub fn is_subscription_mode(&self) -> bool {
        self.mode.as_deref() == Some("subscription")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceRecurring {
    pub interval: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    pub id: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub unit_amount: Option<i64>,
    #[serde(default)]
    pub recurring: Option<PriceRecurring>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    pub price: Price,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub customer: Option<Expandable>,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub items: SubscriptionItems,
}

impl Subscription {
    pub fn first_price(&self) -> Option<&Price> {
        self.items.data.first().map(|item| &item.price)
    }

    /// Period bounds, read from the subscription and falling back to the first item
    /// (newer API versions only report them per item).
    pub fn period(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let item = self.items.data.first();
        let start = self
            .current_period_start
            .or_else(|| item.and_then(|i| i.current_period_start))
            .and_then(timestamp_to_datetime);
        let end = self
            .current_period_end
            .or_else(|| item.and_then(|i| i.current_period_end))
            .and_then(timestamp_to_datetime);
        (start, end)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub deleted: bool,
}

impl Customer {
    /// The tenant user id recorded when the customer was created.
    pub fn user_id(&self) -> Option<&str> {
        self.metadata
            .get(USER_ID_METADATA_KEY)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceSubscriptionDetails {
    #[serde(default)]
    pub subscription: Option<Expandable>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceParent {
    #[serde(default)]
    pub subscription_details: Option<InvoiceSubscriptionDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceLine {
    #[serde(default)]
    pub subscription: Option<Expandable>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceLines {
    #[serde(default)]
    pub data: Vec<InvoiceLine>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Invoice {
    pub id: String,
    #[serde(default)]
    pub customer: Option<Expandable>,
    #[serde(default)]
    pub subscription: Option<Expandable>,
    #[serde(default)]
    pub parent: Option<InvoiceParent>,
    #[serde(default)]
    pub lines: InvoiceLines,
    #[serde(default)]
    pub payment_intent: Option<Expandable>,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub hosted_invoice_url: Option<String>,
}

fn default_currency() -> String {
    "usd".to_string()
}

impl Invoice {
    /// The subscription this invoice bills for, wherever the API version put it.
    pub fn subscription_id(&self) -> Option<&str> {
        if let Some(sub) = &self.subscription {
            return Some(sub.id());
        }
        if let Some(sub) = self
            .parent
            .as_ref()
            .and_then(|p| p.subscription_details.as_ref())
            .and_then(|d| d.subscription.as_ref())
        {
            return Some(sub.id());
        }
        self.lines
            .data
            .iter()
            .find_map(|line| line.subscription.as_ref())
            .map(Expandable::id)
    }
}

// ============================================================================
// Event Union
// ============================================================================

#[derive(Debug, Clone)]
pub enum StripeEvent {
    CheckoutSessionCompleted(CheckoutSession),
    SubscriptionUpdated(Subscription),
    SubscriptionDeleted(Subscription),
    InvoicePaymentSucceeded(Invoice),
    InvoicePaymentFailed(Invoice),
    /// A type the reconciler does not act on.
    Unhandled,
    /// A known type whose payload did not match the expected shape.
    Unparseable { reason: String },
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    created: Option<i64>,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

/// A verified webhook delivery.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub created: Option<DateTime<Utc>>,
    pub event: StripeEvent,
}

impl WebhookEvent {
    /// Decode a raw webhook body. Fails only when the envelope itself is malformed.
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        let envelope: EventEnvelope = serde_json::from_slice(body)?;
        let object = envelope.data.object;

        let event = match envelope.event_type.as_str() {
            CHECKOUT_SESSION_COMPLETED => {
                decode(object, StripeEvent::CheckoutSessionCompleted)
            }
            SUBSCRIPTION_UPDATED => decode(object, StripeEvent::SubscriptionUpdated),
            SUBSCRIPTION_DELETED => decode(object, StripeEvent::SubscriptionDeleted),
            INVOICE_PAYMENT_SUCCEEDED => decode(object, StripeEvent::InvoicePaymentSucceeded),
            INVOICE_PAYMENT_FAILED => decode(object, StripeEvent::InvoicePaymentFailed),
            _ => StripeEvent::Unhandled,
        };

        Ok(Self {
            id: envelope.id,
            event_type: envelope.event_type,
            created: envelope.created.and_then(timestamp_to_datetime),
            event,
        })
    }
}

fn decode<T, F>(object: serde_json::Value, wrap: F) -> StripeEvent
where
    T: serde::de::DeserializeOwned,
    F: FnOnce(T) -> StripeEvent,
{
    match serde_json::from_value::<T>(object) {
        Ok(payload) => wrap(payload),
        Err(e) => StripeEvent::Unparseable {
            reason: e.to_string(),
        },
    }
}
