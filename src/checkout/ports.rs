//! Store-facing seams of the checkout. The orchestrator only talks to the
//! persistent store through these traits.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::{error::CheckoutError, payment::ChargeReceipt, snapshot::BagSnapshot};
use crate::dto::orders::OrderWithItems;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("orm error: {0}")]
    Orm(#[from] sea_orm::DbErr),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Everything needed to write an order once the charge has succeeded.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub user_id: Uuid,
    pub currency: String,
    pub receipt: ChargeReceipt,
    pub snapshot: BagSnapshot,
}

#[async_trait]
pub trait BagSnapshotReader: Send + Sync {
    /// Reads the user's bag joined with current item data in one consistent view.
    ///
    /// Quantities already claimed by an order whose bag has not been settled
    /// yet are subtracted, so a unit is never offered to two checkouts.
    async fn snapshot(&self, user_id: Uuid) -> StoreResult<BagSnapshot>;
}

#[async_trait]
pub trait OrderMaterializer: Send + Sync {
    /// Writes the order header and its items atomically.
    ///
    /// Materializing a receipt whose charge already has an order returns that
    /// order instead of writing a second one.
    async fn materialize(&self, draft: &OrderDraft) -> StoreResult<OrderWithItems>;
}

#[async_trait]
pub trait BagClearer: Send + Sync {
    /// Takes each order line's quantity out of the bag entry it came from and
    /// deletes entries that reach zero. Units added to an entry after the
    /// snapshot stay in the bag. Settling an order twice is a no-op.
    async fn clear(&self, order: &OrderWithItems) -> StoreResult<u64>;

    /// Settles every order of the user whose clear step never completed.
    async fn sweep_consumed(&self, user_id: Uuid) -> StoreResult<u64>;
}

/// Durable trail of checkout outcomes. Implementations swallow their own
/// failures; the trail must never change the checkout result.
#[async_trait]
pub trait CheckoutJournal: Send + Sync {
    async fn completed(&self, order: &OrderWithItems);

    /// Money moved but no order exists for it.
    async fn needs_reconciliation(&self, user_id: Uuid, error: &CheckoutError);
}
