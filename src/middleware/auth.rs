use std::fmt;

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::auth::Claims,
    entity::users::{Entity as Users, Model as UserModel},
    error::AppError,
    state::AppState,
};

pub const TOKEN_COOKIE: &str = "token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    Admin,
    User,
    #[serde(rename = "ITEMCREATE")]
    ItemCreate,
    #[serde(rename = "ITEMUPDATE")]
    ItemUpdate,
    #[serde(rename = "ITEMDELETE")]
    ItemDelete,
    #[serde(rename = "PERMISSIONUPDATE")]
    PermissionUpdate,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Admin => "ADMIN",
            Permission::User => "USER",
            Permission::ItemCreate => "ITEMCREATE",
            Permission::ItemUpdate => "ITEMUPDATE",
            Permission::ItemDelete => "ITEMDELETE",
            Permission::PermissionUpdate => "PERMISSIONUPDATE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ADMIN" => Some(Permission::Admin),
            "USER" => Some(Permission::User),
            "ITEMCREATE" => Some(Permission::ItemCreate),
            "ITEMUPDATE" => Some(Permission::ItemUpdate),
            "ITEMDELETE" => Some(Permission::ItemDelete),
            "PERMISSIONUPDATE" => Some(Permission::PermissionUpdate),
            _ => None,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub permissions: Vec<Permission>,
}

impl Actor {
    pub fn has_any(&self, wanted: &[Permission]) -> bool {
        self.permissions.iter().any(|p| wanted.contains(p))
    }
}

pub fn ensure_any(actor: &Actor, wanted: &[Permission]) -> Result<(), AppError> {
    if !actor.has_any(wanted) {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn issue_token(
    user_id: Uuid,
    permissions: &[String],
    secret: &str,
    ttl_hours: i64,
) -> Result<String, AppError> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(ttl_hours))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        permissions: permissions.to_vec(),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

/// Verifies a signed credential and resolves the actor it names.
pub fn resolve_actor(token: &str, secret: &str) -> Result<Actor, AppError> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

    let user_id = Uuid::parse_str(&decoded.claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid user id in token".into()))?;
    if user_id.is_nil() {
        return Err(AppError::Unauthorized("Invalid user id in token".into()));
    }

    Ok(Actor {
        user_id,
        permissions: parse_permissions(&decoded.claims.permissions),
    })
}

fn parse_permissions(names: &[String]) -> Vec<Permission> {
    names.iter().filter_map(|p| Permission::parse(p)).collect()
}

/// Builds the actor from the stored user row. Roles changed after the token
/// was issued take effect here.
fn actor_from_user(user: &UserModel) -> Actor {
    Actor {
        user_id: user.id,
        permissions: parse_permissions(&user.permissions),
    }
}

/// Verifies the credential, then reloads the user so revoked roles and
/// deleted accounts stop working before the token expires.
pub async fn authenticate(state: &AppState, token: &str) -> Result<Actor, AppError> {
    let claimed = resolve_actor(token, &state.config.jwt_secret)?;
    let user = Users::find_by_id(claimed.user_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".into()))?;
    Ok(actor_from_user(&user))
}

/// Pulls the raw credential from the `Authorization` header or the token cookie.
fn credential(parts: &Parts) -> Result<Option<String>, AppError> {
    if let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::BadRequest("Invalid Authorization header".into()))?;
        let Some(token) = auth_str.strip_prefix("Bearer ") else {
            return Err(AppError::BadRequest("Invalid Authorization scheme".into()));
        };
        return Ok(Some(token.trim().to_string()));
    }

    let cookie_token = parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty());
    Ok(cookie_token)
}

impl FromRequestParts<AppState> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = credential(parts)?
            .ok_or_else(|| AppError::Unauthorized("You must be logged in to do that!".into()))?;
        authenticate(state, &token).await
    }
}

impl OptionalFromRequestParts<AppState> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        match credential(parts)? {
            Some(token) => authenticate(state, &token).await.map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn issued_token_resolves_to_same_actor() {
        let user_id = Uuid::new_v4();
        let token = issue_token(
            user_id,
            &["USER".to_string(), "ITEMCREATE".to_string(), "BOGUS".to_string()],
            SECRET,
            1,
        )
        .unwrap();

        let actor = resolve_actor(&token, SECRET).unwrap();
        assert_eq!(actor.user_id, user_id);
        assert_eq!(
            actor.permissions,
            vec![Permission::User, Permission::ItemCreate]
        );
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = issue_token(Uuid::new_v4(), &[], "other", 1).unwrap();
        assert!(matches!(
            resolve_actor(&token, SECRET),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn ensure_any_requires_one_matching_permission() {
        let actor = Actor {
            user_id: Uuid::new_v4(),
            permissions: vec![Permission::User, Permission::ItemUpdate],
        };
        assert!(ensure_any(&actor, &[Permission::Admin, Permission::ItemUpdate]).is_ok());
        assert!(matches!(
            ensure_any(&actor, &[Permission::Admin, Permission::PermissionUpdate]),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn stored_permissions_replace_token_claims() {
        let user_id = Uuid::new_v4();
        let token = issue_token(user_id, &["ADMIN".to_string()], SECRET, 1).unwrap();
        assert!(resolve_actor(&token, SECRET).unwrap().has_any(&[Permission::Admin]));

        let revoked = UserModel {
            id: user_id,
            name: "Former Admin".into(),
            email: "former@example.com".into(),
            password_hash: "x".into(),
            permissions: vec!["USER".into()],
            reset_token: None,
            reset_token_expiry: None,
            created_at: Utc::now().into(),
        };
        let actor = actor_from_user(&revoked);
        assert_eq!(actor.user_id, user_id);
        assert_eq!(actor.permissions, vec![Permission::User]);
        assert!(ensure_any(&actor, &[Permission::Admin]).is_err());
    }

    #[test]
    fn cookie_credential_is_used_without_header() {
        let request = axum::http::Request::builder()
            .header(header::COOKIE, "theme=dark; token=abc.def.ghi")
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();
        assert_eq!(credential(&parts).unwrap().as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn permission_names_round_trip() {
        for p in [
            Permission::Admin,
            Permission::User,
            Permission::ItemCreate,
            Permission::ItemUpdate,
            Permission::ItemDelete,
            Permission::PermissionUpdate,
        ] {
            assert_eq!(Permission::parse(p.as_str()), Some(p));
        }
    }
}
