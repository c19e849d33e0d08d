use std::{sync::Arc, time::Duration};

use crate::{
    checkout::{
        CheckoutLocks, CheckoutOrchestrator, CheckoutSettings, HttpPaymentGateway,
        PaymentCaptureClient, PaymentGateway, PgCheckoutStore, RetryPolicy,
    },
    config::AppConfig,
    db::{DbPool, OrmConn},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
    pub store: PgCheckoutStore,
    pub gateway: Arc<dyn PaymentGateway>,
    pub checkout_locks: CheckoutLocks,
}

impl AppState {
    pub fn new(config: AppConfig, pool: DbPool, orm: OrmConn) -> anyhow::Result<Self> {
        let gateway = HttpPaymentGateway::new(
            config.payment.gateway_url.clone(),
            config.payment.gateway_secret.clone(),
            Duration::from_secs(config.payment.timeout_secs),
        )?;
        Ok(Self::with_gateway(config, pool, orm, Arc::new(gateway)))
    }

    pub fn with_gateway(
        config: AppConfig,
        pool: DbPool,
        orm: OrmConn,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let store = PgCheckoutStore::new(pool.clone(), orm.clone());
        Self {
            pool,
            orm,
            config: Arc::new(config),
            store,
            gateway,
            checkout_locks: CheckoutLocks::new(),
        }
    }

    /// Wires a request-scoped orchestrator over the Postgres store.
    pub fn checkout_orchestrator(&self) -> CheckoutOrchestrator {
        let payment = &self.config.payment;
        let store = Arc::new(self.store.clone());
        CheckoutOrchestrator::new(
            store.clone(),
            PaymentCaptureClient::new(
                Arc::clone(&self.gateway),
                RetryPolicy::new(
                    payment.max_attempts,
                    Duration::from_millis(payment.backoff_ms),
                ),
            ),
            store.clone(),
            store.clone(),
            store,
            self.checkout_locks.clone(),
            CheckoutSettings {
                currency: payment.currency.clone(),
                idempotency_bucket_secs: payment.idempotency_bucket_secs,
            },
        )
    }
}
