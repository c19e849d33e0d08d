use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get},
};
use uuid::Uuid;

use crate::{
    dto::bag::{AddToBagRequest, BagList},
    error::AppResult,
    middleware::auth::Actor,
    models::BagEntry,
    response::ApiResponse,
    services::bag_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(bag_list).post(add_to_bag))
        .route("/{entry_id}", delete(remove_from_bag))
}

#[utoipa::path(
    get,
    path = "/api/bag",
    responses(
        (status = 200, description = "Current bag contents", body = ApiResponse<BagList>),
        (status = 401, description = "Not signed in")
    ),
    security(("bearer_auth" = [])),
    tag = "Bag"
)]
pub async fn bag_list(
    State(state): State<AppState>,
    actor: Actor,
) -> AppResult<Json<ApiResponse<BagList>>> {
    let resp = bag_service::list_bag(&state, &actor).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/bag",
    request_body = AddToBagRequest,
    responses(
        (status = 200, description = "Item added", body = ApiResponse<BagEntry>),
        (status = 400, description = "Unknown item"),
        (status = 401, description = "Not signed in")
    ),
    security(("bearer_auth" = [])),
    tag = "Bag"
)]
pub async fn add_to_bag(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<AddToBagRequest>,
) -> AppResult<Json<ApiResponse<BagEntry>>> {
    let resp = bag_service::add_to_bag(&state, &actor, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/bag/{entry_id}",
    params(("entry_id" = Uuid, Path, description = "Bag entry id")),
    responses(
        (status = 200, description = "Entry removed"),
        (status = 403, description = "Entry belongs to another user"),
        (status = 404, description = "Entry not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Bag"
)]
pub async fn remove_from_bag(
    State(state): State<AppState>,
    actor: Actor,
    Path(entry_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = bag_service::remove_from_bag(&state, &actor, entry_id).await?;
    Ok(Json(resp))
}
