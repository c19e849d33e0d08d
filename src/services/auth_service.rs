use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use password_hash::rand_core::{OsRng, RngCore};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::{
    audit::record_audit,
    dto::auth::{
        AuthResponse, MessageResponse, RequestResetRequest, ResetPasswordRequest, SigninRequest,
        SignupRequest,
    },
    entity::users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    error::{AppError, AppResult},
    middleware::auth::{Permission, issue_token},
    models::User,
    response::ApiResponse,
    state::AppState,
};

const RESET_TOKEN_TTL_HOURS: i64 = 1;

pub async fn signup(state: &AppState, payload: SignupRequest) -> AppResult<ApiResponse<AuthResponse>> {
    let SignupRequest {
        name,
        email,
        password,
    } = payload;
    let email = email.trim().to_lowercase();
    if name.trim().is_empty() || email.is_empty() || password.is_empty() {
        return Err(AppError::BadRequest(
            "name, email and password are required".into(),
        ));
    }

    let exist = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;
    if exist.is_some() {
        return Err(AppError::BadRequest("Email is already taken".to_string()));
    }

    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.trim().to_string()),
        email: Set(email),
        password_hash: Set(hash_password(&password)?),
        permissions: Set(vec![Permission::User.as_str().to_string()]),
        reset_token: Set(None),
        reset_token_expiry: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    record_audit(
        &state.pool,
        Some(user.id),
        "user_signup",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    let resp = authenticated(state, user)?;
    Ok(ApiResponse::single("User created", resp))
}

pub async fn signin(state: &AppState, payload: SigninRequest) -> AppResult<ApiResponse<AuthResponse>> {
    let SigninRequest { email, password } = payload;
    let user = Users::find()
        .filter(UserCol::Email.eq(email.trim().to_lowercase()))
        .one(&state.orm)
        .await?;

    let user = match user {
        Some(u) => u,
        None => return Err(AppError::BadRequest("Invalid email or password".into())),
    };

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;

    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(AppError::BadRequest("Invalid email or password".into()));
    }

    record_audit(
        &state.pool,
        Some(user.id),
        "user_signin",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    let resp = authenticated(state, user)?;
    Ok(ApiResponse::single("Signed in", resp))
}

pub async fn request_reset(
    state: &AppState,
    payload: RequestResetRequest,
) -> AppResult<ApiResponse<MessageResponse>> {
    let email = payload.email.trim().to_lowercase();
    let user = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest("No user found with that email.".into()))?;

    let mut bytes = [0_u8; 20];
    OsRng.fill_bytes(&mut bytes);
    let reset_token = hex::encode(bytes);
    let expiry = Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS);

    let user_id = user.id;
    let mut active: UserActive = user.into();
    active.reset_token = Set(Some(reset_token.clone()));
    active.reset_token_expiry = Set(Some(expiry.into()));
    active.update(&state.orm).await?;

    // Delivery is handled outside this service; the link is only emitted at debug level.
    tracing::info!(user_id = %user_id, "password reset requested");
    tracing::debug!(
        user_id = %user_id,
        link = %format!("{}/reset?resetToken={}", state.config.frontend_url, reset_token),
        "password reset link"
    );

    Ok(ApiResponse::single(
        "OK",
        MessageResponse {
            message: "Reset request successful!".into(),
        },
    ))
}

pub async fn reset_password(
    state: &AppState,
    payload: ResetPasswordRequest,
) -> AppResult<ApiResponse<AuthResponse>> {
    if payload.password != payload.confirm_password {
        return Err(AppError::BadRequest("Passwords do not match.".into()));
    }
    if payload.password.is_empty() {
        return Err(AppError::BadRequest("password is required".into()));
    }

    let user = Users::find()
        .filter(UserCol::ResetToken.eq(payload.reset_token.as_str()))
        .filter(UserCol::ResetTokenExpiry.gte(Utc::now()))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest("This token is either invalid or expired.".into()))?;

    let mut active: UserActive = user.into();
    active.password_hash = Set(hash_password(&payload.password)?);
    active.reset_token = Set(None);
    active.reset_token_expiry = Set(None);
    let user = active.update(&state.orm).await?;

    record_audit(
        &state.pool,
        Some(user.id),
        "password_reset",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    let resp = authenticated(state, user)?;
    Ok(ApiResponse::single("Password reset", resp))
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

fn authenticated(state: &AppState, user: UserModel) -> AppResult<AuthResponse> {
    let token = issue_token(
        user.id,
        &user.permissions,
        &state.config.jwt_secret,
        state.config.jwt_ttl_hours,
    )?;
    Ok(AuthResponse {
        user: User::from(user),
        token,
    })
}
