use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use super::{error::CheckoutError, snapshot::BagSnapshot};

const IDEMPOTENCY_DOMAIN: &str = "storefront:checkout:v1";
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Deterministic key sent with every capture attempt of one logical checkout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Derives the key from everything that identifies a checkout: the user,
    /// the snapshot contents, the amount, the payment source and a coarse time
    /// bucket. A double submission inside the bucket yields the same key; a
    /// retry with a different card after a decline does not.
    pub fn derive(
        snapshot: &BagSnapshot,
        amount: i64,
        currency: &str,
        source_token: &str,
        bucket_secs: i64,
    ) -> Self {
        let bucket = snapshot.taken_at.timestamp().div_euclid(bucket_secs.max(1));

        let mut lines: Vec<_> = snapshot.lines.iter().collect();
        lines.sort_by_key(|line| line.bag_entry_id);

        let mut hasher = Sha256::new();
        hash_field(&mut hasher, IDEMPOTENCY_DOMAIN.as_bytes());
        hash_field(&mut hasher, snapshot.user_id.as_bytes());
        hash_field(&mut hasher, &bucket.to_be_bytes());
        hash_field(&mut hasher, currency.to_ascii_uppercase().as_bytes());
        hash_field(&mut hasher, &amount.to_be_bytes());
        hash_field(&mut hasher, source_token.as_bytes());
        for line in lines {
            hash_field(&mut hasher, line.bag_entry_id.as_bytes());
            hash_field(&mut hasher, line.item.item_id.as_bytes());
            hash_field(&mut hasher, &line.item.price.to_be_bytes());
            hash_field(&mut hasher, &line.quantity.to_be_bytes());
        }

        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn hash_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub amount: i64,
    pub currency: String,
    pub source_token: String,
    pub idempotency_key: IdempotencyKey,
}

/// Proof of a successful capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ChargeReceipt {
    pub external_id: String,
    pub captured_amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("card declined: {0}")]
    CardDeclined(String),

    #[error("invalid payment source: {0}")]
    InvalidSource(String),

    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// The gateway refused the request for a reason retrying cannot fix
    /// (bad credentials, malformed request). No funds moved.
    #[error("payment gateway rejected the request: {0}")]
    Rejected(String),
}

impl CaptureError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CaptureError::GatewayUnavailable(_))
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Captures `request.amount` from the payment source. Repeating a call
    /// with the same idempotency key must not charge twice.
    async fn capture(&self, request: &CaptureRequest) -> Result<ChargeReceipt, CaptureError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    /// Delay before attempt `attempt + 1`, doubling from `base_backoff`.
    fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

/// Capture boundary of the checkout: retries transient gateway failures with
/// the same idempotency key and classifies the terminal outcome.
#[derive(Clone)]
pub struct PaymentCaptureClient {
    gateway: Arc<dyn PaymentGateway>,
    policy: RetryPolicy,
}

impl PaymentCaptureClient {
    pub fn new(gateway: Arc<dyn PaymentGateway>, policy: RetryPolicy) -> Self {
        Self { gateway, policy }
    }

    pub async fn capture(&self, request: &CaptureRequest) -> Result<ChargeReceipt, CheckoutError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.gateway.capture(request).await {
                Ok(receipt) => {
                    tracing::info!(
                        charge_id = %receipt.external_id,
                        amount = receipt.captured_amount,
                        attempt,
                        "payment captured"
                    );
                    return Ok(receipt);
                }
                Err(err) if err.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff_after(attempt);
                    tracing::warn!(
                        error = %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        idempotency_key = %request.idempotency_key,
                        "capture failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::warn!(error = %err, attempt, "capture failed");
                    return Err(match err {
                        CaptureError::CardDeclined(reason) => CheckoutError::CardDeclined(reason),
                        CaptureError::InvalidSource(reason) => {
                            CheckoutError::InvalidSource(reason)
                        }
                        CaptureError::GatewayUnavailable(reason) | CaptureError::Rejected(reason) => {
                            CheckoutError::PaymentFailed {
                                attempts: attempt,
                                reason,
                            }
                        }
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::checkout::snapshot::{ItemFields, SnapshotLine};

    fn snapshot_at(secs: i64, lines: Vec<SnapshotLine>) -> BagSnapshot {
        let user = Uuid::from_u128(7);
        BagSnapshot::new(user, lines, Utc.timestamp_opt(secs, 0).unwrap())
    }

    fn line(id: u128, price: i64, quantity: i32) -> SnapshotLine {
        SnapshotLine {
            bag_entry_id: Uuid::from_u128(id),
            item: ItemFields {
                item_id: Uuid::from_u128(id + 1000),
                title: "widget".into(),
                description: "".into(),
                price,
                image: None,
                large_image: None,
            },
            quantity,
        }
    }

    #[test]
    fn key_is_stable_within_a_bucket_and_ignores_line_order() {
        let a = snapshot_at(1_200, vec![line(1, 500, 2), line(2, 1200, 1)]);
        let b = snapshot_at(1_799, vec![line(2, 1200, 1), line(1, 500, 2)]);

        assert_eq!(
            IdempotencyKey::derive(&a, 2200, "USD", "tok_visa", 600),
            IdempotencyKey::derive(&b, 2200, "usd", "tok_visa", 600)
        );
    }

    #[test]
    fn key_changes_with_bucket_source_and_contents() {
        let base = snapshot_at(1_200, vec![line(1, 500, 2)]);
        let key = IdempotencyKey::derive(&base, 1000, "USD", "tok_visa", 600);

        let next_bucket = snapshot_at(1_800, vec![line(1, 500, 2)]);
        assert_ne!(key, IdempotencyKey::derive(&next_bucket, 1000, "USD", "tok_visa", 600));
        assert_ne!(key, IdempotencyKey::derive(&base, 1000, "USD", "tok_other", 600));

        let more = snapshot_at(1_200, vec![line(1, 500, 3)]);
        assert_ne!(key, IdempotencyKey::derive(&more, 1500, "USD", "tok_visa", 600));
    }

    #[test]
    fn key_is_hex_sha256() {
        let key = IdempotencyKey::derive(&snapshot_at(0, vec![]), 0, "USD", "t", 600);
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let policy = RetryPolicy::new(5, Duration::from_millis(200));
        assert_eq!(policy.backoff_after(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_after(2), Duration::from_millis(400));
        assert_eq!(policy.backoff_after(3), Duration::from_millis(800));
        assert_eq!(policy.backoff_after(40), MAX_BACKOFF);
    }

    #[test]
    fn only_gateway_unavailable_is_retryable() {
        assert!(CaptureError::GatewayUnavailable("timeout".into()).is_retryable());
        assert!(!CaptureError::CardDeclined("no".into()).is_retryable());
        assert!(!CaptureError::InvalidSource("no".into()).is_retryable());
        assert!(!CaptureError::Rejected("401".into()).is_retryable());
    }
}
