use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::orders::{CheckoutRequest, OrderList, OrderWithItems},
    error::{AppResult, ErrorData},
    middleware::auth::Actor,
    response::ApiResponse,
    routes::params::OrderListQuery,
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_order))
        .route("/checkout", post(checkout))
        .route("/{id}", get(get_order))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders of the signed-in user", body = ApiResponse<OrderList>),
        (status = 401, description = "Not signed in")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_order(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = order_service::list_orders(&state, &actor, query).await?;
    Ok(Json(resp))
}

/// Charges the current bag and turns it into an order.
///
/// Authentication is checked by the checkout itself so that an anonymous
/// request gets the checkout error shape rather than the generic one.
#[utoipa::path(
    post,
    path = "/api/orders/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Order created", body = ApiResponse<OrderWithItems>),
        (status = 400, description = "Payment source token missing or rejected", body = ApiResponse<ErrorData>),
        (status = 401, description = "Not signed in", body = ApiResponse<ErrorData>),
        (status = 402, description = "Card declined", body = ApiResponse<ErrorData>),
        (status = 409, description = "Checkout already in progress", body = ApiResponse<ErrorData>),
        (status = 422, description = "Bag is empty or invalid", body = ApiResponse<ErrorData>),
        (status = 500, description = "Charged but order not recorded; carries the charge reference", body = ApiResponse<ErrorData>),
        (status = 503, description = "Payment failed after retries or bag could not be read", body = ApiResponse<ErrorData>)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn checkout(
    State(state): State<AppState>,
    actor: Option<Actor>,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::checkout(&state, actor.as_ref(), payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with its items", body = ApiResponse<OrderWithItems>),
        (status = 404, description = "Order not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::get_order(&state, &actor, id).await?;
    Ok(Json(resp))
}
