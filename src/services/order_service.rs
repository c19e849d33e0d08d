use sea_orm::{
    ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use uuid::Uuid;

use crate::{
    checkout::pg_store::load_items,
    dto::orders::{CheckoutRequest, OrderList, OrderWithItems},
    entity::orders::{Column as OrderCol, Entity as Orders},
    error::{AppError, AppResult},
    middleware::auth::Actor,
    models::Order,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

/// Runs the checkout detached from the request so a client disconnect after
/// the capture cannot stop the order write or its audit trail.
pub async fn checkout(
    state: &AppState,
    actor: Option<&Actor>,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = state
        .checkout_orchestrator()
        .spawn(actor.cloned(), payload.token)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "checkout task did not finish");
            AppError::Internal(anyhow::anyhow!("checkout task failed: {err}"))
        })??;

    Ok(ApiResponse::single("Checkout success", order))
}

pub async fn list_orders(
    state: &AppState,
    actor: &Actor,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut finder = Orders::find().filter(OrderCol::UserId.eq(actor.user_id));
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_order(
    state: &AppState,
    actor: &Actor,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(actor.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let items = load_items(&state.orm, &order).await?;

    Ok(ApiResponse::single(
        "OK",
        OrderWithItems {
            order: order.into(),
            items,
        },
    ))
}

