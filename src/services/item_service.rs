use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, EntityTrait, PaginatorTrait, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::record_audit,
    dto::items::{CreateItemRequest, ItemList, UpdateItemRequest},
    entity::items::{ActiveModel, Column, Entity as Items},
    error::{AppError, AppResult},
    middleware::auth::{Actor, Permission, ensure_any},
    models::Item,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

pub async fn list_items(state: &AppState, pagination: Pagination) -> AppResult<ApiResponse<ItemList>> {
    let (page, limit, offset) = pagination.normalize();
    let finder = Items::find().order_by_desc(Column::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Item::from)
        .collect();

    Ok(ApiResponse::success(
        "Items",
        ItemList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_item(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Item>> {
    let item = Items::find_by_id(id)
        .one(&state.orm)
        .await?
        .map(Item::from)
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("Item", item, None))
}

/// Any signed-in user may list an item; they become its owner.
pub async fn create_item(
    state: &AppState,
    actor: &Actor,
    payload: CreateItemRequest,
) -> AppResult<ApiResponse<Item>> {
    if payload.title.trim().is_empty() {
        return Err(AppError::BadRequest("title is required".into()));
    }
    validate_price(payload.price)?;

    let item = ActiveModel {
        id: Set(Uuid::new_v4()),
        owner_id: Set(actor.user_id),
        title: Set(payload.title),
        description: Set(payload.description),
        price: Set(payload.price),
        image: Set(payload.image),
        large_image: Set(payload.large_image),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    record_audit(
        &state.pool,
        Some(actor.user_id),
        "item_create",
        "items",
        serde_json::json!({ "item_id": item.id }),
    )
    .await;

    Ok(ApiResponse::single("Item created", Item::from(item)))
}

pub async fn update_item(
    state: &AppState,
    actor: &Actor,
    id: Uuid,
    payload: UpdateItemRequest,
) -> AppResult<ApiResponse<Item>> {
    ensure_any(actor, &[Permission::Admin, Permission::ItemUpdate])?;

    let existing = Items::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: ActiveModel = existing.into();
    if let Some(title) = payload.title {
        active.title = Set(title);
    }
    if let Some(description) = payload.description {
        active.description = Set(description);
    }
    if let Some(price) = payload.price {
        validate_price(price)?;
        active.price = Set(price);
    }
    active.updated_at = Set(Utc::now().into());

    let item = active.update(&state.orm).await?;

    record_audit(
        &state.pool,
        Some(actor.user_id),
        "item_update",
        "items",
        serde_json::json!({ "item_id": item.id }),
    )
    .await;

    Ok(ApiResponse::single("Updated", Item::from(item)))
}

/// Owners may delete their own items; anyone else needs `ADMIN` or `ITEMDELETE`.
pub async fn delete_item(
    state: &AppState,
    actor: &Actor,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let item = Items::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if item.owner_id != actor.user_id {
        ensure_any(actor, &[Permission::Admin, Permission::ItemDelete])?;
    }

    Items::delete_by_id(id).exec(&state.orm).await?;

    record_audit(
        &state.pool,
        Some(actor.user_id),
        "item_delete",
        "items",
        serde_json::json!({ "item_id": id, "title": item.title }),
    )
    .await;

    Ok(ApiResponse::single("Deleted", serde_json::json!({ "id": id })))
}

fn validate_price(price: i64) -> AppResult<()> {
    if price < 0 {
        return Err(AppError::BadRequest("price must not be negative".into()));
    }
    Ok(())
}
