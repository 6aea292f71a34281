use std::sync::Arc;

use crate::{
    application::use_cases::{
        billing::BillingUseCases, billing_webhook::BillingWebhookUseCases, entity::EntityUseCases,
        user::UserUseCases,
    },
    infra::{config::AppConfig, rate_limit::RateLimitStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub entity_use_cases: Arc<EntityUseCases>,
    pub user_use_cases: Arc<UserUseCases>,
    pub billing_use_cases: Arc<BillingUseCases>,
    pub billing_webhook_use_cases: Arc<BillingWebhookUseCases>,
    pub rate_limit_store: Arc<dyn RateLimitStore>,
}
