use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, AsRefStr, Display, EnumString,
)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    PastDue,
    Trialing,
}

impl SubscriptionStatus {
    /// Convert from a Stripe subscription status string.
    ///
    /// Stripe spells it `canceled`; locally it is `cancelled`. Statuses that do not
    /// grant access (`unpaid`, `incomplete`, `paused`, anything unknown) collapse into
    /// `past_due` so access is never granted by default.
    pub fn from_stripe(s: &str) -> Self {
        match s {
            "active" => SubscriptionStatus::Active,
            "trialing" => SubscriptionStatus::Trialing,
            "canceled" | "incomplete_expired" => SubscriptionStatus::Cancelled,
            "past_due" | "unpaid" | "incomplete" | "paused" => SubscriptionStatus::PastDue,
            other => {
                tracing::warn!(status = other, "Unknown Stripe subscription status");
                SubscriptionStatus::PastDue
            }
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, AsRefStr, Display, EnumString,
)]
#[sqlx(type_name = "billing_cycle", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    /// `yearly` iff the Stripe recurring interval is `year`.
    pub fn from_interval(interval: Option<&str>) -> Self {
        match interval {
            Some("year") => BillingCycle::Yearly,
            _ => BillingCycle::Monthly,
        }
    }
}

/// Status of a recorded charge. Only successful charges are recorded.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, AsRefStr, Display,
)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    Succeeded,
}
