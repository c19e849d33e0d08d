use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    SqlErr, TransactionTrait,
};
use sqlx::FromRow;
use uuid::Uuid;

use super::{
    error::CheckoutError,
    ports::{
        BagClearer, BagSnapshotReader, CheckoutJournal, OrderDraft, OrderMaterializer, StoreError,
        StoreResult,
    },
    snapshot::{BagSnapshot, ItemFields, SnapshotLine},
};
use crate::{
    audit::record_audit,
    db::{DbPool, OrmConn},
    dto::orders::OrderWithItems,
    entity::{
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
    },
    models::OrderItem,
};

/// Postgres implementation of the checkout store seams.
#[derive(Clone)]
pub struct PgCheckoutStore {
    pool: DbPool,
    orm: OrmConn,
}

impl PgCheckoutStore {
    pub fn new(pool: DbPool, orm: OrmConn) -> Self {
        Self { pool, orm }
    }

    async fn find_by_charge<C: ConnectionTrait>(
        conn: &C,
        charge_id: &str,
    ) -> StoreResult<Option<OrderWithItems>> {
        let Some(order) = Orders::find()
            .filter(OrderCol::ChargeId.eq(charge_id))
            .one(conn)
            .await?
        else {
            return Ok(None);
        };
        let items = load_items(conn, &order).await?;
        Ok(Some(OrderWithItems {
            order: order.into(),
            items,
        }))
    }

    /// Claims the order's unsettled lines and takes their quantities out of
    /// the originating bag entries, all in one transaction. Returns the number
    /// of bag entries touched.
    async fn settle_order(&self, order_id: Uuid, user_id: Uuid) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;

        // Row locks on the claimed lines keep a concurrent settle of the same
        // order from subtracting twice.
        let claimed: Vec<(Uuid, i32)> = sqlx::query_as(
            r#"
            UPDATE order_items
            SET bag_settled = TRUE
            WHERE order_id = $1 AND NOT bag_settled AND bag_entry_id IS NOT NULL
            RETURNING bag_entry_id, quantity
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut touched = 0;
        for (entry_id, quantity) in claimed {
            let deleted = sqlx::query(
                "DELETE FROM bag_entries WHERE id = $1 AND user_id = $2 AND quantity <= $3",
            )
            .bind(entry_id)
            .bind(user_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            let affected = if deleted > 0 {
                deleted
            } else {
                sqlx::query(
                    "UPDATE bag_entries SET quantity = quantity - $3 WHERE id = $1 AND user_id = $2",
                )
                .bind(entry_id)
                .bind(user_id)
                .bind(quantity)
                .execute(&mut *tx)
                .await?
                .rows_affected()
            };
            touched += affected;
        }

        tx.commit().await?;
        Ok(touched)
    }
}

#[derive(FromRow)]
struct SnapshotRow {
    bag_entry_id: Uuid,
    quantity: i32,
    item_id: Uuid,
    title: String,
    description: String,
    price: i64,
    image: Option<String>,
    large_image: Option<String>,
}

#[async_trait]
impl BagSnapshotReader for PgCheckoutStore {
    async fn snapshot(&self, user_id: Uuid) -> StoreResult<BagSnapshot> {
        // A single statement sees one consistent snapshot of all three tables.
        // Unsettled order lines are leftovers of a failed clear.
        let rows = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT be.id AS bag_entry_id,
                   (be.quantity - COALESCE(pending.quantity, 0))::INT4 AS quantity,
                   i.id AS item_id, i.title, i.description, i.price, i.image, i.large_image
            FROM bag_entries be
            JOIN items i ON i.id = be.item_id
            LEFT JOIN (
                SELECT oi.bag_entry_id, SUM(oi.quantity) AS quantity
                FROM order_items oi
                WHERE NOT oi.bag_settled AND oi.bag_entry_id IS NOT NULL
                GROUP BY oi.bag_entry_id
            ) pending ON pending.bag_entry_id = be.id
            WHERE be.user_id = $1
              AND (pending.quantity IS NULL OR be.quantity > pending.quantity)
            ORDER BY be.created_at, be.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let lines = rows
            .into_iter()
            .map(|row| SnapshotLine {
                bag_entry_id: row.bag_entry_id,
                item: ItemFields {
                    item_id: row.item_id,
                    title: row.title,
                    description: row.description,
                    price: row.price,
                    image: row.image,
                    large_image: row.large_image,
                },
                quantity: row.quantity,
            })
            .collect();

        Ok(BagSnapshot::new(user_id, lines, Utc::now()))
    }
}

#[async_trait]
impl OrderMaterializer for PgCheckoutStore {
    async fn materialize(&self, draft: &OrderDraft) -> StoreResult<OrderWithItems> {
        let charge_id = draft.receipt.external_id.as_str();
        let txn = self.orm.begin().await?;

        if let Some(existing) = Self::find_by_charge(&txn, charge_id).await? {
            txn.commit().await?;
            tracing::info!(
                order_id = %existing.order.id,
                charge_id,
                "order already recorded for charge"
            );
            return Ok(existing);
        }

        let inserted = OrderActive {
            id: Set(Uuid::new_v4()),
            user_id: Set(draft.user_id),
            total: Set(draft.receipt.captured_amount),
            currency: Set(draft.currency.clone()),
            charge_id: Set(charge_id.to_string()),
            created_at: NotSet,
        }
        .insert(&txn)
        .await;

        let order = match inserted {
            Ok(order) => order,
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                // A concurrent request recorded the same charge first.
                txn.rollback().await?;
                return Self::find_by_charge(&self.orm, charge_id)
                    .await?
                    .ok_or(StoreError::Orm(err));
            }
            Err(err) => return Err(err.into()),
        };

        let mut items = Vec::with_capacity(draft.snapshot.lines.len());
        for (position, line) in (0_i32..).zip(&draft.snapshot.lines) {
            let item = OrderItemActive {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                position: Set(position),
                item_id: Set(Some(line.item.item_id)),
                bag_entry_id: Set(Some(line.bag_entry_id)),
                title: Set(line.item.title.clone()),
                description: Set(line.item.description.clone()),
                price: Set(line.item.price),
                image: Set(line.item.image.clone()),
                large_image: Set(line.item.large_image.clone()),
                quantity: Set(line.quantity),
                bag_settled: Set(false),
                created_at: NotSet,
            }
            .insert(&txn)
            .await?;
            items.push(OrderItem::from(item));
        }

        txn.commit().await?;

        Ok(OrderWithItems {
            order: order.into(),
            items,
        })
    }
}

#[async_trait]
impl BagClearer for PgCheckoutStore {
    async fn clear(&self, order: &OrderWithItems) -> StoreResult<u64> {
        self.settle_order(order.order.id, order.order.user_id).await
    }

    async fn sweep_consumed(&self, user_id: Uuid) -> StoreResult<u64> {
        let pending: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT oi.order_id
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE o.user_id = $1 AND NOT oi.bag_settled AND oi.bag_entry_id IS NOT NULL
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut touched = 0;
        for (order_id,) in pending {
            touched += self.settle_order(order_id, user_id).await?;
        }
        if touched > 0 {
            tracing::info!(user_id = %user_id, touched, "settled stale bag entries");
        }
        Ok(touched)
    }
}

#[async_trait]
impl CheckoutJournal for PgCheckoutStore {
    async fn completed(&self, order: &OrderWithItems) {
        record_audit(
            &self.pool,
            Some(order.order.user_id),
            "checkout",
            "orders",
            serde_json::json!({
                "order_id": order.order.id,
                "charge_id": order.order.charge_id,
                "total": order.order.total,
            }),
        )
        .await;
    }

    async fn needs_reconciliation(&self, user_id: Uuid, error: &CheckoutError) {
        let Some(receipt) = error.charge_receipt() else {
            return;
        };
        record_audit(
            &self.pool,
            Some(user_id),
            "checkout_reconciliation_required",
            "orders",
            serde_json::json!({
                "charge_id": receipt.external_id,
                "captured_amount": receipt.captured_amount,
                "code": error.code(),
                "reason": error.to_string(),
            }),
        )
        .await;
    }
}

pub(crate) async fn load_items<C: ConnectionTrait>(
    conn: &C,
    order: &OrderModel,
) -> Result<Vec<OrderItem>, sea_orm::DbErr> {
    Ok(OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .order_by_asc(OrderItemCol::Position)
        .all(conn)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect())
}
