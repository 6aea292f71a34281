use std::{fs::File, sync::Arc, time::Duration};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::http::app_state::AppState,
    application::{
        ports::payment_provider::PaymentProviderPort,
        use_cases::{
            billing::{BillingUseCases, PaymentRepo, SubscriptionRepo},
            billing_webhook::BillingWebhookUseCases,
            entity::{EntityRepo, EntityUseCases},
            user::{UserRepo, UserUseCases},
        },
    },
    infra::{
        InfraError,
        config::AppConfig,
        postgres_persistence,
        rate_limit::{InMemoryRateLimitStore, RateLimitStore, RedisRateLimitStore},
        stripe_client::StripeClient,
    },
};

pub async fn init_app_state() -> Result<AppState, InfraError> {
    let config = AppConfig::from_env()?;

    let postgres_arc = Arc::new(postgres_persistence(&config.database_url).await?);

    let rate_limit_store: Arc<dyn RateLimitStore> = match &config.redis_url {
        Some(url) => {
            tracing::info!("Using Redis rate-limit store");
            Arc::new(RedisRateLimitStore::new(url).await?)
        }
        None => {
            tracing::info!("Using in-process rate-limit store");
            Arc::new(InMemoryRateLimitStore::new())
        }
    };

    let provider: Arc<dyn PaymentProviderPort> =
        Arc::new(StripeClient::new(config.stripe_secret_key.clone()));

    let user_repo_arc = postgres_arc.clone() as Arc<dyn UserRepo>;
    let entity_repo_arc = postgres_arc.clone() as Arc<dyn EntityRepo>;
    let subscription_repo_arc = postgres_arc.clone() as Arc<dyn SubscriptionRepo>;
    let payment_repo_arc = postgres_arc.clone() as Arc<dyn PaymentRepo>;

    let billing_use_cases = BillingUseCases::new(
        user_repo_arc.clone(),
        subscription_repo_arc.clone(),
        payment_repo_arc.clone(),
        provider.clone(),
        config.app_url.clone(),
        config.stripe_pro_price_id.clone(),
        config.stripe_business_price_id.clone(),
    );

    let billing_webhook_use_cases =
        BillingWebhookUseCases::new(subscription_repo_arc, payment_repo_arc, provider);

    Ok(AppState {
        config: Arc::new(config),
        entity_use_cases: Arc::new(EntityUseCases::new(entity_repo_arc)),
        user_use_cases: Arc::new(UserUseCases::new(user_repo_arc)),
        billing_use_cases: Arc::new(billing_use_cases),
        billing_webhook_use_cases: Arc::new(billing_webhook_use_cases),
        rate_limit_store,
    })
}

pub fn init_tracing() -> Result<(), InfraError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "saas_kit=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .pretty();

    // File (structured JSON logs)
    let file = File::create("app.log").map_err(InfraError::LogFile)?;
    let json_layer = fmt::layer()
        .json()
        .with_writer(file)
        .with_current_span(true)
        .with_span_list(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();

    Ok(())
}

/// Periodically drop expired rate-limit windows so the store stays bounded.
pub fn spawn_rate_limit_sweep(store: Arc<dyn RateLimitStore>, every_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(every_secs.max(1)));
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = store.sweep_expired().await;
            if removed > 0 {
                tracing::debug!(removed, "Swept expired rate-limit windows");
            }
        }
    });
}
