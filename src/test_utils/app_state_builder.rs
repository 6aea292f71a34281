//! Test app state builder for HTTP-level testing.
//!
//! `TestAppStateBuilder` wires every use case to in-memory repositories and the
//! mock payment provider, so routes can be exercised without Postgres or Stripe.

use std::sync::Arc;

use axum::http::HeaderValue;
use secrecy::SecretString;
use url::Url;

use crate::{
    adapters::http::app_state::AppState,
    application::use_cases::{
        billing::{BillingUseCases, SubscriptionProfile},
        billing_webhook::BillingWebhookUseCases,
        entity::{EntityProfile, EntityUseCases},
        user::{UserProfile, UserUseCases},
    },
    infra::{
        config::AppConfig,
        rate_limit::{InMemoryRateLimitStore, RateLimitStore},
    },
    test_utils::{
        InMemoryEntityRepo, InMemoryPaymentRepo, InMemorySubscriptionRepo, InMemoryUserRepo,
        MockPaymentProvider,
    },
};

pub const TEST_JWT_SECRET: &str = "test_jwt_secret";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test";

/// Configuration with fixed secrets and the `price_pro` / `price_biz` catalog ids.
pub fn create_test_config() -> AppConfig {
    AppConfig {
        jwt_secret: SecretString::new(TEST_JWT_SECRET.into()),
        database_url: "postgres://localhost/saas_kit_test".to_string(),
        stripe_secret_key: SecretString::new("sk_test_123".into()),
        stripe_webhook_secret: SecretString::new(TEST_WEBHOOK_SECRET.into()),
        app_url: Url::parse("https://app.example.com").unwrap(),
        stripe_pro_price_id: "price_pro".to_string(),
        stripe_business_price_id: "price_biz".to_string(),
        cors_origin: HeaderValue::from_static("http://localhost:3000"),
        bind_addr: "127.0.0.1:3001".parse().unwrap(),
        redis_url: None,
        rate_limit_sweep_secs: 300,
        stripe_webhook_tolerance_secs: 300,
    }
}

/// Handles to the billing mocks behind an `AppState`, for assertions after a request.
pub struct TestBillingMocks {
    pub subscriptions: Arc<InMemorySubscriptionRepo>,
    pub payments: Arc<InMemoryPaymentRepo>,
    pub provider: Arc<MockPaymentProvider>,
}

/// Builder for creating `AppState` with in-memory mocks for testing.
///
/// # Example
///
/// ```ignore
/// let user = create_test_user(|u| u.name = "Ada".into());
///
/// let app_state = TestAppStateBuilder::new()
///     .with_user(user)
///     .build();
/// ```
#[derive(Default)]
pub struct TestAppStateBuilder {
    users: Vec<UserProfile>,
    entities: Vec<EntityProfile>,
    subscriptions: Vec<SubscriptionProfile>,
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: UserProfile) -> Self {
        self.users.push(user);
        self
    }

    pub fn with_entity(mut self, entity: EntityProfile) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn with_subscription(mut self, subscription: SubscriptionProfile) -> Self {
        self.subscriptions.push(subscription);
        self
    }

    pub fn build(self) -> AppState {
        self.build_with_mocks().0
    }

    /// Build the `AppState` and return the billing mocks it shares.
    pub fn build_with_mocks(self) -> (AppState, TestBillingMocks) {
        let config = create_test_config();

        let user_repo = Arc::new(InMemoryUserRepo::with_users(self.users));
        let entity_repo = Arc::new(InMemoryEntityRepo::with_entities(self.entities));
        let subscriptions = Arc::new(InMemorySubscriptionRepo::with_subscriptions(
            user_repo.clone(),
            self.subscriptions,
        ));
        let payments = Arc::new(InMemoryPaymentRepo::new(user_repo.clone()));
        let provider = Arc::new(MockPaymentProvider::new());
        let rate_limit_store: Arc<dyn RateLimitStore> = Arc::new(InMemoryRateLimitStore::new());

        let billing_use_cases = BillingUseCases::new(
            user_repo.clone(),
            subscriptions.clone(),
            payments.clone(),
            provider.clone(),
            config.app_url.clone(),
            config.stripe_pro_price_id.clone(),
            config.stripe_business_price_id.clone(),
        );
        let billing_webhook_use_cases = BillingWebhookUseCases::new(
            subscriptions.clone(),
            payments.clone(),
            provider.clone(),
        );

        let app_state = AppState {
            config: Arc::new(config),
            entity_use_cases: Arc::new(EntityUseCases::new(entity_repo)),
            user_use_cases: Arc::new(UserUseCases::new(user_repo)),
            billing_use_cases: Arc::new(billing_use_cases),
            billing_webhook_use_cases: Arc::new(billing_webhook_use_cases),
            rate_limit_store,
        };

        (
            app_state,
            TestBillingMocks {
                subscriptions,
                payments,
                provider,
            },
        )
    }
}
