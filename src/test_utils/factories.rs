//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::{
    application::use_cases::{billing::SubscriptionProfile, entity::EntityProfile, user::UserProfile},
    domain::entities::{
        entity::{EntityRole, EntityStatus},
        plan::FREE_PLAN_NAME,
        stripe_event::{Customer, Subscription, USER_ID_METADATA_KEY, WebhookEvent},
        subscription::{BillingCycle, SubscriptionStatus},
    },
};

/// Create a test user profile with the default preferences of a new account.
pub fn create_test_user(overrides: impl FnOnce(&mut UserProfile)) -> UserProfile {
    let id = Uuid::new_v4();
    let mut user = UserProfile {
        id,
        name: "Test User".to_string(),
        email: format!("user-{}@example.com", id.simple()),
        image: None,
        phone: None,
        company: None,
        location: None,
        theme: "system".to_string(),
        language: "en".to_string(),
        timezone: "UTC".to_string(),
        email_notifications: true,
        push_notifications: false,
        security_alerts: true,
        marketing_emails: false,
        weekly_reports: true,
        billing_updates: true,
        created_at: test_datetime(),
        updated_at: test_datetime(),
    };
    overrides(&mut user);
    user
}

/// Create a test entity with a unique email.
pub fn create_test_entity(overrides: impl FnOnce(&mut EntityProfile)) -> EntityProfile {
    let id = Uuid::new_v4();
    let mut entity = EntityProfile {
        id,
        name: "Test Entity".to_string(),
        email: format!("entity-{}@example.com", id.simple()),
        role: EntityRole::Viewer,
        status: EntityStatus::Pending,
        avatar: None,
        phone: None,
        company: None,
        last_login: None,
        created_at: test_datetime(),
        updated_at: test_datetime(),
        created_by: None,
    };
    overrides(&mut entity);
    entity
}

/// Create a free subscription for `user_id` with no provider ids attached.
pub fn create_test_subscription(
    user_id: Uuid,
    overrides: impl FnOnce(&mut SubscriptionProfile),
) -> SubscriptionProfile {
    let mut subscription = SubscriptionProfile {
        id: Uuid::new_v4(),
        user_id,
        plan_name: FREE_PLAN_NAME.to_string(),
        plan_price: 0,
        billing_cycle: BillingCycle::Monthly,
        status: SubscriptionStatus::Active,
        current_period_start: test_datetime(),
        current_period_end: test_datetime() + Duration::days(30),
        cancel_at_period_end: false,
        stripe_customer_id: None,
        stripe_subscription_id: None,
        created_at: test_datetime(),
        updated_at: test_datetime(),
    };
    overrides(&mut subscription);
    subscription
}

/// A provider customer, tagged with `user_id` in its metadata when given.
pub fn stripe_customer(id: &str, user_id: Option<Uuid>) -> Customer {
    let mut metadata = HashMap::new();
    if let Some(user_id) = user_id {
        metadata.insert(USER_ID_METADATA_KEY.to_string(), user_id.to_string());
    }
    Customer {
        id: id.to_string(),
        email: None,
        metadata,
        deleted: false,
    }
}

/// A provider subscription with a single recurring price.
pub fn stripe_subscription(
    id: &str,
    status: &str,
    nickname: Option<&str>,
    unit_amount: i64,
    interval: &str,
) -> Subscription {
    let start = test_datetime().timestamp();
    let days = if interval == "year" { 365 } else { 30 };
    let end = start + days * 24 * 60 * 60;
    serde_json::from_value(json!({
        "id": id,
        "status": status,
        "current_period_start": start,
        "current_period_end": end,
        "cancel_at_period_end": false,
        "items": { "data": [ {
            "price": {
                "id": format!("price_{id}"),
                "nickname": nickname,
                "unit_amount": unit_amount,
                "recurring": { "interval": interval }
            }
        } ] }
    }))
    .expect("test subscription should deserialize")
}

/// Wrap `object` in a webhook envelope and decode it the way the webhook route does.
pub fn webhook_event(event_type: &str, object: serde_json::Value) -> WebhookEvent {
    let body = json!({
        "id": "evt_test",
        "type": event_type,
        "created": test_datetime().timestamp(),
        "data": { "object": object }
    });
    WebhookEvent::parse(body.to_string().as_bytes()).expect("test envelope should parse")
}

/// Returns a fixed datetime for reproducible tests.
pub fn test_datetime() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .expect("valid test datetime")
        .with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factories_produce_unique_emails() {
        let a = create_test_entity(|_| {});
        let b = create_test_entity(|_| {});
        assert_ne!(a.email, b.email);
        assert_ne!(create_test_user(|_| {}).email, create_test_user(|_| {}).email);
    }

    #[test]
    fn stripe_subscription_carries_price_details() {
        let sub = stripe_subscription("sub_1", "active", Some("Team"), 9900, "year");
        let price = sub.first_price().unwrap();
        assert_eq!(price.nickname.as_deref(), Some("Team"));
        assert_eq!(price.unit_amount, Some(9900));
        assert_eq!(price.recurring.as_ref().unwrap().interval, "year");
        let (start, end) = sub.period();
        assert_eq!((end.unwrap() - start.unwrap()).num_days(), 365);
    }

    #[test]
    fn customer_metadata_holds_user_id() {
        let user_id = Uuid::new_v4();
        assert_eq!(
            stripe_customer("cus_1", Some(user_id)).user_id(),
            Some(user_id.to_string().as_str())
        );
        assert_eq!(stripe_customer("cus_2", None).user_id(), None);
    }
}
