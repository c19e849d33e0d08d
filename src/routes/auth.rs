use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
    routing::post,
};

use crate::{
    dto::auth::{
        AuthResponse, MessageResponse, RequestResetRequest, ResetPasswordRequest, SigninRequest,
        SignupRequest,
    },
    error::AppResult,
    middleware::auth::TOKEN_COOKIE,
    response::ApiResponse,
    services::auth_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/signin", post(signin))
        .route("/signout", post(signout))
        .route("/request-reset", post(request_reset))
        .route("/reset-password", post(reset_password))
}

fn session_cookie(token: &str, ttl_hours: i64) -> String {
    format!(
        "{TOKEN_COOKIE}={token}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        ttl_hours.max(0) * 3600
    )
}

fn cleared_cookie() -> String {
    format!("{TOKEN_COOKIE}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0")
}

#[utoipa::path(
    post,
    path = "/api/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created and signed in", body = ApiResponse<AuthResponse>),
        (status = 400, description = "Missing fields or email taken")
    ),
    tag = "Auth"
)]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> AppResult<impl IntoResponse> {
    let resp = auth_service::signup(&state, payload).await?;
    let cookie = resp
        .data
        .as_ref()
        .map(|auth| session_cookie(&auth.token, state.config.jwt_ttl_hours))
        .unwrap_or_else(cleared_cookie);
    Ok((StatusCode::CREATED, AppendHeaders([(SET_COOKIE, cookie)]), Json(resp)))
}

#[utoipa::path(
    post,
    path = "/api/auth/signin",
    request_body = SigninRequest,
    responses(
        (status = 200, description = "Signed in", body = ApiResponse<AuthResponse>),
        (status = 400, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
pub async fn signin(
    State(state): State<AppState>,
    Json(payload): Json<SigninRequest>,
) -> AppResult<impl IntoResponse> {
    let resp = auth_service::signin(&state, payload).await?;
    let cookie = resp
        .data
        .as_ref()
        .map(|auth| session_cookie(&auth.token, state.config.jwt_ttl_hours))
        .unwrap_or_else(cleared_cookie);
    Ok((AppendHeaders([(SET_COOKIE, cookie)]), Json(resp)))
}

#[utoipa::path(
    post,
    path = "/api/auth/signout",
    responses(
        (status = 200, description = "Session cookie cleared", body = ApiResponse<MessageResponse>)
    ),
    tag = "Auth"
)]
pub async fn signout() -> impl IntoResponse {
    (
        AppendHeaders([(SET_COOKIE, cleared_cookie())]),
        Json(ApiResponse::single(
            "OK",
            MessageResponse {
                message: "Goodbye!".into(),
            },
        )),
    )
}

#[utoipa::path(
    post,
    path = "/api/auth/request-reset",
    request_body = RequestResetRequest,
    responses(
        (status = 200, description = "Reset token issued", body = ApiResponse<MessageResponse>),
        (status = 400, description = "Unknown email")
    ),
    tag = "Auth"
)]
pub async fn request_reset(
    State(state): State<AppState>,
    Json(payload): Json<RequestResetRequest>,
) -> AppResult<Json<ApiResponse<MessageResponse>>> {
    let resp = auth_service::request_reset(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password changed and signed in", body = ApiResponse<AuthResponse>),
        (status = 400, description = "Token invalid, expired, or passwords differ")
    ),
    tag = "Auth"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AppResult<impl IntoResponse> {
    let resp = auth_service::reset_password(&state, payload).await?;
    let cookie = resp
        .data
        .as_ref()
        .map(|auth| session_cookie(&auth.token, state.config.jwt_ttl_hours))
        .unwrap_or_else(cleared_cookie);
    Ok((AppendHeaders([(SET_COOKIE, cookie)]), Json(resp)))
}
