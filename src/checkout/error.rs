use thiserror::Error;

use super::payment::ChargeReceipt;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    #[error("You must be signed in to complete this order.")]
    Unauthenticated,

    #[error("A checkout is already in progress for this user")]
    CheckoutInProgress,

    #[error("Your bag is empty")]
    EmptyBag,

    #[error("Bag could not be read: {0}")]
    SnapshotUnavailable(String),

    #[error("Bag contains invalid data: {0}")]
    InvalidSnapshot(String),

    #[error("Card declined: {0}")]
    CardDeclined(String),

    #[error("Invalid payment source: {0}")]
    InvalidSource(String),

    #[error("Payment failed after {attempts} attempt(s): {reason}")]
    PaymentFailed { attempts: u32, reason: String },

    /// Funds were captured but the order could not be recorded.
    #[error("Payment {} was captured but the order could not be saved: {reason}", .receipt.external_id)]
    PostChargePersistenceFailure {
        receipt: ChargeReceipt,
        reason: String,
    },

    /// Funds were captured for an amount other than the one requested.
    #[error(
        "Payment {} captured {} but {expected} was expected",
        .receipt.external_id,
        .receipt.captured_amount
    )]
    CaptureAmountMismatch {
        receipt: ChargeReceipt,
        expected: i64,
    },
}

impl CheckoutError {
    /// Stable machine-readable code for API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            CheckoutError::Unauthenticated => "unauthenticated",
            CheckoutError::CheckoutInProgress => "checkout_in_progress",
            CheckoutError::EmptyBag => "empty_bag",
            CheckoutError::SnapshotUnavailable(_) => "snapshot_unavailable",
            CheckoutError::InvalidSnapshot(_) => "invalid_snapshot",
            CheckoutError::CardDeclined(_) => "card_declined",
            CheckoutError::InvalidSource(_) => "invalid_source",
            CheckoutError::PaymentFailed { .. } => "payment_failed",
            CheckoutError::PostChargePersistenceFailure { .. } => {
                "post_charge_persistence_failure"
            }
            CheckoutError::CaptureAmountMismatch { .. } => "capture_amount_mismatch",
        }
    }

    /// Receipt of a capture that happened even though the checkout failed.
    pub fn charge_receipt(&self) -> Option<&ChargeReceipt> {
        match self {
            CheckoutError::PostChargePersistenceFailure { receipt, .. }
            | CheckoutError::CaptureAmountMismatch { receipt, .. } => Some(receipt),
            _ => None,
        }
    }

    /// Money moved and no order exists: must go to reconciliation, never to a retry.
    pub fn requires_reconciliation(&self) -> bool {
        self.charge_receipt().is_some()
    }

    /// Whether the caller may simply try the checkout again.
    pub fn is_retryable(&self) -> bool {
        !self.requires_reconciliation() && !matches!(self, CheckoutError::InvalidSnapshot(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_charge_failures_carry_receipt_and_are_not_retryable() {
        let receipt = ChargeReceipt {
            external_id: "ch_123".into(),
            captured_amount: 2200,
        };
        let err = CheckoutError::PostChargePersistenceFailure {
            receipt: receipt.clone(),
            reason: "connection reset".into(),
        };

        assert_eq!(err.charge_receipt(), Some(&receipt));
        assert!(err.requires_reconciliation());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("ch_123"));
    }

    #[test]
    fn decline_is_retryable_without_reconciliation() {
        let err = CheckoutError::CardDeclined("insufficient funds".into());
        assert!(err.is_retryable());
        assert!(!err.requires_reconciliation());
        assert_eq!(err.code(), "card_declined");
    }
}
