use std::{net::SocketAddr, str::FromStr};

use axum::http::HeaderValue;
use env_helpers::get_env_opt;
use secrecy::SecretString;
use url::Url;

use super::InfraError;

pub struct AppConfig {
    pub jwt_secret: SecretString,
    pub database_url: String,
    pub stripe_secret_key: SecretString,
    pub stripe_webhook_secret: SecretString,
    /// Public base URL of the dashboard, used for checkout and portal redirects.
    pub app_url: Url,
    pub stripe_pro_price_id: String,
    pub stripe_business_price_id: String,
    pub cors_origin: HeaderValue,
    pub bind_addr: SocketAddr,
    /// When set, rate-limit counters live in Redis and are shared between instances.
    pub redis_url: Option<String>,
    pub rate_limit_sweep_secs: u64,
    /// Maximum age of a signed webhook before it is rejected.
    pub stripe_webhook_tolerance_secs: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, InfraError> {
        Self::from_lookup(get_env_opt)
    }

    /// Build the config from any variable source; `lookup` returns `None` for unset names.
    pub fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, InfraError> {
        let env = Env { lookup };

        let jwt_secret = SecretString::new(env.required("JWT_SECRET")?.into());
        let database_url = env.required("DATABASE_URL")?;
        let stripe_secret_key = SecretString::new(env.required("STRIPE_SECRET_KEY")?.into());
        let stripe_webhook_secret =
            SecretString::new(env.required("STRIPE_WEBHOOK_SECRET")?.into());

        let app_url: Url = env.required_parsed("APP_URL")?;
        let stripe_pro_price_id = env.required("STRIPE_PRO_PRICE_ID")?;
        let stripe_business_price_id = env.required("STRIPE_BUSINESS_PRICE_ID")?;

        let cors_origin: HeaderValue = env.parsed_or(
            "CORS_ORIGIN",
            HeaderValue::from_static("http://localhost:3000"),
        )?;
        let bind_addr: SocketAddr =
            env.parsed_or("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3001)))?;
        let redis_url = env.optional("REDIS_URL");
        let rate_limit_sweep_secs: u64 = env.parsed_or("RATE_LIMIT_SWEEP_SECS", 300)?;
        let stripe_webhook_tolerance_secs: i64 =
            env.parsed_or("STRIPE_WEBHOOK_TOLERANCE_SECS", 300)?;

        Ok(Self {
            jwt_secret,
            database_url,
            stripe_secret_key,
            stripe_webhook_secret,
            app_url,
            stripe_pro_price_id,
            stripe_business_price_id,
            cors_origin,
            bind_addr,
            redis_url,
            rate_limit_sweep_secs,
            stripe_webhook_tolerance_secs,
        })
    }
}

/// Variable reads that report missing or malformed values instead of panicking.
struct Env<F> {
    lookup: F,
}

impl<F: Fn(&'static str) -> Option<String>> Env<F> {
    /// Blank values count as unset.
    fn optional(&self, var: &'static str) -> Option<String> {
        (self.lookup)(var).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, var: &'static str) -> Result<String, InfraError> {
        self.optional(var).ok_or(InfraError::ConfigMissing { var })
    }

    fn required_parsed<T: FromStr>(&self, var: &'static str) -> Result<T, InfraError> {
        self.required(var)?
            .trim()
            .parse()
            .map_err(|_| InfraError::ConfigInvalid { var })
    }

    fn parsed_or<T: FromStr>(&self, var: &'static str, default: T) -> Result<T, InfraError> {
        match self.optional(var) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| InfraError::ConfigInvalid { var }),
            None => Ok(default),
        }
    }
}
