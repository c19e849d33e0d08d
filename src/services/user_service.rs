use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use uuid::Uuid;

use crate::{
    audit::record_audit,
    dto::users::UpdatePermissionsRequest,
    entity::users::{ActiveModel as UserActive, Entity as Users},
    error::{AppError, AppResult},
    middleware::auth::{Actor, Permission, ensure_any},
    models::User,
    response::ApiResponse,
    state::AppState,
};

/// Replaces a user's role set. Requires `ADMIN` or `PERMISSIONUPDATE`.
///
/// Takes effect on the user's next request; the extractor reads roles from
/// the store rather than from the token.
pub async fn update_permissions(
    state: &AppState,
    actor: &Actor,
    user_id: Uuid,
    payload: UpdatePermissionsRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_any(actor, &[Permission::Admin, Permission::PermissionUpdate])?;

    let mut permissions: Vec<String> = Vec::with_capacity(payload.permissions.len());
    for permission in payload.permissions {
        let name = permission.as_str().to_string();
        if !permissions.contains(&name) {
            permissions.push(name);
        }
    }

    let user = Users::find_by_id(user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: UserActive = user.into();
    active.permissions = Set(permissions.clone());
    let user = active.update(&state.orm).await?;

    tracing::info!(actor = %actor.user_id, user_id = %user.id, ?permissions, "permissions updated");
    record_audit(
        &state.pool,
        Some(actor.user_id),
        "permissions_update",
        "users",
        serde_json::json!({ "user_id": user.id, "permissions": permissions }),
    )
    .await;

    Ok(ApiResponse::single("Permissions updated", User::from(user)))
}
