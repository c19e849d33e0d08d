use std::sync::Arc;

use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{
    error::CheckoutError,
    lock::CheckoutLocks,
    payment::{CaptureRequest, IdempotencyKey, PaymentCaptureClient},
    ports::{BagClearer, BagSnapshotReader, CheckoutJournal, OrderDraft, OrderMaterializer},
    pricing::charge_total,
};
use crate::{dto::orders::OrderWithItems, middleware::auth::Actor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStage {
    Start,
    Authenticated,
    Snapshotted,
    Priced,
    Charged,
    OrderRecorded,
    BagCleared,
}

impl CheckoutStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStage::Start => "start",
            CheckoutStage::Authenticated => "authenticated",
            CheckoutStage::Snapshotted => "snapshotted",
            CheckoutStage::Priced => "priced",
            CheckoutStage::Charged => "charged",
            CheckoutStage::OrderRecorded => "order_recorded",
            CheckoutStage::BagCleared => "bag_cleared",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    pub idempotency_bucket_secs: i64,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            idempotency_bucket_secs: 600,
        }
    }
}

/// Turns a user's bag into a paid, recorded order.
///
/// Only the capture moves money. Everything after it is arranged so a
/// successful capture is never lost: a failed order write surfaces the receipt
/// for reconciliation, and a failed bag clear is logged and tolerated.
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    reader: Arc<dyn BagSnapshotReader>,
    payments: PaymentCaptureClient,
    materializer: Arc<dyn OrderMaterializer>,
    clearer: Arc<dyn BagClearer>,
    journal: Arc<dyn CheckoutJournal>,
    locks: CheckoutLocks,
    settings: CheckoutSettings,
}

impl CheckoutOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reader: Arc<dyn BagSnapshotReader>,
        payments: PaymentCaptureClient,
        materializer: Arc<dyn OrderMaterializer>,
        clearer: Arc<dyn BagClearer>,
        journal: Arc<dyn CheckoutJournal>,
        locks: CheckoutLocks,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            reader,
            payments,
            materializer,
            clearer,
            journal,
            locks,
            settings,
        }
    }

    /// Runs the checkout on its own task.
    ///
    /// Dropping the returned handle does not cancel the checkout, so a caller
    /// that goes away mid-capture still ends with a recorded order or a
    /// reconciliation entry.
    pub fn spawn(
        self,
        actor: Option<Actor>,
        source_token: String,
    ) -> JoinHandle<Result<OrderWithItems, CheckoutError>> {
        tokio::spawn(async move { self.checkout(actor.as_ref(), &source_token).await })
    }

    pub async fn checkout(
        &self,
        actor: Option<&Actor>,
        source_token: &str,
    ) -> Result<OrderWithItems, CheckoutError> {
        let user_id = match actor {
            Some(actor) if !actor.user_id.is_nil() => actor.user_id,
            _ => return Err(CheckoutError::Unauthenticated),
        };

        let result = self.run(user_id, source_token).await;
        match &result {
            Ok(order) => self.journal.completed(order).await,
            Err(err) if err.requires_reconciliation() => {
                self.journal.needs_reconciliation(user_id, err).await
            }
            Err(_) => {}
        }
        result
    }

    async fn run(&self, user_id: Uuid, source_token: &str) -> Result<OrderWithItems, CheckoutError> {
        let mut stage = CheckoutStage::Start;
        advance(&mut stage, CheckoutStage::Authenticated, user_id);

        let _guard = self
            .locks
            .try_acquire(user_id)
            .ok_or(CheckoutError::CheckoutInProgress)?;

        let snapshot = self.reader.snapshot(user_id).await.map_err(|err| {
            tracing::warn!(user_id = %user_id, error = %err, "bag snapshot failed");
            CheckoutError::SnapshotUnavailable(err.to_string())
        })?;
        if snapshot.is_empty() {
            return Err(CheckoutError::EmptyBag);
        }
        advance(&mut stage, CheckoutStage::Snapshotted, user_id);

        let amount = charge_total(&snapshot)?;
        advance(&mut stage, CheckoutStage::Priced, user_id);

        let source_token = source_token.trim();
        if source_token.is_empty() {
            return Err(CheckoutError::InvalidSource(
                "a payment source token is required".into(),
            ));
        }

        let request = CaptureRequest {
            amount,
            currency: self.settings.currency.clone(),
            source_token: source_token.to_string(),
            idempotency_key: IdempotencyKey::derive(
                &snapshot,
                amount,
                &self.settings.currency,
                source_token,
                self.settings.idempotency_bucket_secs,
            ),
        };
        tracing::info!(
            user_id = %user_id,
            amount,
            currency = %request.currency,
            lines = snapshot.lines.len(),
            "charging"
        );

        let receipt = self.payments.capture(&request).await?;
        advance(&mut stage, CheckoutStage::Charged, user_id);

        if receipt.captured_amount != amount {
            tracing::error!(
                user_id = %user_id,
                charge_id = %receipt.external_id,
                captured = receipt.captured_amount,
                expected = amount,
                "captured amount differs from bag total, reconciliation required"
            );
            return Err(CheckoutError::CaptureAmountMismatch {
                receipt,
                expected: amount,
            });
        }

        let draft = OrderDraft {
            user_id,
            currency: request.currency,
            receipt,
            snapshot,
        };

        let order = match self.materializer.materialize(&draft).await {
            Ok(order) => order,
            Err(err) => {
                tracing::error!(
                    user_id = %user_id,
                    charge_id = %draft.receipt.external_id,
                    amount = draft.receipt.captured_amount,
                    error = %err,
                    "order write failed after capture, reconciliation required"
                );
                return Err(CheckoutError::PostChargePersistenceFailure {
                    receipt: draft.receipt,
                    reason: err.to_string(),
                });
            }
        };
        advance(&mut stage, CheckoutStage::OrderRecorded, user_id);

        match self.clearer.clear(&order).await {
            Ok(removed) => {
                tracing::debug!(user_id = %user_id, removed, "bag cleared");
                advance(&mut stage, CheckoutStage::BagCleared, user_id);
            }
            Err(err) => {
                // The order's lines stay unsettled: later snapshots subtract
                // them and the next bag access settles them.
                tracing::warn!(
                    user_id = %user_id,
                    order_id = %order.order.id,
                    error = %err,
                    "bag clear failed after checkout"
                );
            }
        }

        tracing::info!(
            user_id = %user_id,
            order_id = %order.order.id,
            charge_id = %order.order.charge_id,
            total = order.order.total,
            stage = stage.as_str(),
            "checkout complete"
        );
        Ok(order)
    }
}

fn advance(stage: &mut CheckoutStage, next: CheckoutStage, user_id: Uuid) {
    tracing::debug!(
        user_id = %user_id,
        from = stage.as_str(),
        to = next.as_str(),
        "checkout stage"
    );
    *stage = next;
}
