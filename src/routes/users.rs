use axum::{
    Json, Router,
    extract::{Path, State},
    routing::put,
};
use uuid::Uuid;

use crate::{
    dto::users::UpdatePermissionsRequest,
    error::AppResult,
    middleware::auth::Actor,
    models::User,
    response::ApiResponse,
    services::user_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/{id}/permissions", put(update_permissions))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}/permissions",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UpdatePermissionsRequest,
    responses(
        (status = 200, description = "Permissions replaced", body = ApiResponse<User>),
        (status = 403, description = "Missing ADMIN or PERMISSIONUPDATE"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_permissions(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePermissionsRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = user_service::update_permissions(&state, &actor, id, payload).await?;
    Ok(Json(resp))
}
