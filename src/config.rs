use std::env;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub frontend_url: String,
    pub payment: PaymentConfig,
}

/// Settings for the payment gateway and the checkout capture policy.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub gateway_url: String,
    pub gateway_secret: String,
    pub timeout_secs: u64,
    pub currency: String,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub idempotency_bucket_secs: i64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_or("APP_PORT", 3000);
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET is not set")?;
        let jwt_ttl_hours = parse_or("JWT_TTL_HOURS", 24);
        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:7777".to_string());

        let payment = PaymentConfig {
            gateway_url: env::var("PAYMENT_GATEWAY_URL")
                .context("PAYMENT_GATEWAY_URL is not set")?,
            gateway_secret: env::var("PAYMENT_GATEWAY_SECRET")
                .context("PAYMENT_GATEWAY_SECRET is not set")?,
            timeout_secs: parse_or("PAYMENT_TIMEOUT_SECS", 15),
            currency: env::var("CHECKOUT_CURRENCY").unwrap_or_else(|_| "USD".to_string()),
            max_attempts: parse_or("CAPTURE_MAX_ATTEMPTS", 3_u32).max(1),
            backoff_ms: parse_or("CAPTURE_BACKOFF_MS", 200),
            idempotency_bucket_secs: parse_or("IDEMPOTENCY_BUCKET_SECS", 600_i64).max(1),
        };

        Ok(Self {
            port,
            database_url,
            host,
            jwt_secret,
            jwt_ttl_hours,
            frontend_url,
            payment,
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
