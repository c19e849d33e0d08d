use chrono::{DateTime, Utc};
use sea_orm::EntityTrait;
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::record_audit,
    checkout::BagClearer,
    dto::bag::{AddToBagRequest, BagEntryDto, BagList},
    entity::{bag_entries::Entity as BagEntries, items::Entity as Items},
    error::{AppError, AppResult},
    middleware::auth::Actor,
    models::{BagEntry, Item},
    response::{ApiResponse, Meta},
    state::AppState,
};

#[derive(FromRow)]
struct BagWithItemRow {
    entry_id: Uuid,
    quantity: i32,
    item_id: Uuid,
    owner_id: Uuid,
    title: String,
    description: String,
    price: i64,
    image: Option<String>,
    large_image: Option<String>,
    item_created_at: DateTime<Utc>,
    item_updated_at: DateTime<Utc>,
}

pub async fn list_bag(state: &AppState, actor: &Actor) -> AppResult<ApiResponse<BagList>> {
    if let Err(err) = state.store.sweep_consumed(actor.user_id).await {
        tracing::warn!(user_id = %actor.user_id, error = %err, "bag sweep failed");
    }

    let rows = sqlx::query_as::<_, BagWithItemRow>(
        r#"
        SELECT be.id AS entry_id,
               (be.quantity - COALESCE(pending.quantity, 0))::INT4 AS quantity,
               i.id AS item_id, i.owner_id, i.title, i.description, i.price,
               i.image, i.large_image,
               i.created_at AS item_created_at, i.updated_at AS item_updated_at
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
    .bind(actor.user_id)
    .fetch_all(&state.pool)
    .await?;

    let subtotal = rows
        .iter()
        .map(|row| row.price.saturating_mul(i64::from(row.quantity)))
        .fold(0_i64, i64::saturating_add);
    let total = rows.len() as i64;

    let items = rows
        .into_iter()
        .map(|row| BagEntryDto {
            id: row.entry_id,
            item: Item {
                id: row.item_id,
                owner_id: row.owner_id,
                title: row.title,
                description: row.description,
                price: row.price,
                image: row.image,
                large_image: row.large_image,
                created_at: row.item_created_at,
                updated_at: row.item_updated_at,
            },
            quantity: row.quantity,
        })
        .collect();

    Ok(ApiResponse::success(
        "OK",
        BagList { items, subtotal },
        Some(Meta::new(1, total, total)),
    ))
}

/// Adds one unit of an item to the actor's bag.
///
/// The oldest entry for the item is incremented in place. A checkout that
/// already snapshotted that entry only subtracts the quantity it charged for,
/// so the extra unit stays in the bag. If the entry vanished in the meantime a
/// fresh one is inserted.
pub async fn add_to_bag(
    state: &AppState,
    actor: &Actor,
    payload: AddToBagRequest,
) -> AppResult<ApiResponse<BagEntry>> {
    Items::find_by_id(payload.item_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest("item not found".to_string()))?;

    state.store.sweep_consumed(actor.user_id).await?;

    let bumped = sqlx::query_as::<_, BagEntry>(
        r#"
        UPDATE bag_entries
        SET quantity = quantity + 1
        WHERE id = (
            SELECT id FROM bag_entries
            WHERE user_id = $1 AND item_id = $2
            ORDER BY created_at, id
            LIMIT 1
        )
        RETURNING id, user_id, item_id, quantity, created_at
        "#,
    )
    .bind(actor.user_id)
    .bind(payload.item_id)
    .fetch_optional(&state.pool)
    .await?;

    let entry = match bumped {
        Some(entry) => entry,
        None => {
            sqlx::query_as::<_, BagEntry>(
                r#"
                INSERT INTO bag_entries (id, user_id, item_id, quantity)
                VALUES ($1, $2, $3, 1)
                RETURNING id, user_id, item_id, quantity, created_at
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(actor.user_id)
            .bind(payload.item_id)
            .fetch_one(&state.pool)
            .await?
        }
    };

    record_audit(
        &state.pool,
        Some(actor.user_id),
        "bag_add",
        "bag_entries",
        serde_json::json!({ "item_id": payload.item_id, "quantity": entry.quantity }),
    )
    .await;

    Ok(ApiResponse::success("OK", entry, None))
}

pub async fn remove_from_bag(
    state: &AppState,
    actor: &Actor,
    entry_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let entry = BagEntries::find_by_id(entry_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if entry.user_id != actor.user_id {
        return Err(AppError::Forbidden);
    }

    BagEntries::delete_by_id(entry_id).exec(&state.orm).await?;

    record_audit(
        &state.pool,
        Some(actor.user_id),
        "bag_remove",
        "bag_entries",
        serde_json::json!({ "entry_id": entry_id, "item_id": entry.item_id }),
    )
    .await;

    Ok(ApiResponse::single(
        "Removed from bag",
        serde_json::json!({ "id": entry_id }),
    ))
}
