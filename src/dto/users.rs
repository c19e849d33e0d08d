use serde::Deserialize;
use utoipa::ToSchema;

use crate::middleware::auth::Permission;

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePermissionsRequest {
    pub permissions: Vec<Permission>,
}
