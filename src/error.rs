use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::{
    checkout::{CheckoutError, StoreError},
    response::{ApiResponse, Meta},
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("You have insufficient permissions to do that.")]
    Forbidden,

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Query(e) => AppError::DbError(e),
            StoreError::Orm(e) => AppError::OrmError(e),
            StoreError::Unavailable(msg) => AppError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

/// Body carried in `data` for every error response.
#[derive(Serialize, ToSchema)]
pub struct ErrorData {
    pub error: String,
    #[schema(value_type = String)]
    pub code: &'static str,
    pub retryable: bool,
    /// Gateway charge id, present only when money was taken but no order exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_reference: Option<String>,
}

fn checkout_status(err: &CheckoutError) -> StatusCode {
    match err {
        CheckoutError::Unauthenticated => StatusCode::UNAUTHORIZED,
        CheckoutError::CheckoutInProgress => StatusCode::CONFLICT,
        CheckoutError::EmptyBag | CheckoutError::InvalidSnapshot(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CheckoutError::CardDeclined(_) => StatusCode::PAYMENT_REQUIRED,
        CheckoutError::InvalidSource(_) => StatusCode::BAD_REQUEST,
        CheckoutError::PaymentFailed { .. } | CheckoutError::SnapshotUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        CheckoutError::PostChargePersistenceFailure { .. }
        | CheckoutError::CaptureAmountMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, retryable) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "not_found", false),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request", false),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized", false),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", false),
            AppError::Checkout(err) => (checkout_status(err), err.code(), err.is_retryable()),
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                tracing::error!(error = ?self, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", false)
            }
        };

        let (message, charge_reference) = match &self {
            AppError::Checkout(err) if err.requires_reconciliation() => (
                "Your payment was received but the order could not be completed. \
                 Please contact support with the charge reference; do not retry."
                    .to_string(),
                err.charge_receipt().map(|r| r.external_id.clone()),
            ),
            _ => (self.to_string(), None),
        };

        let body = ApiResponse {
            message,
            data: Some(ErrorData {
                error: self.to_string(),
                code,
                retryable,
                charge_reference,
            }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::ChargeReceipt;

    #[test]
    fn reconciliation_failures_render_as_contact_support_with_reference() {
        let err = AppError::from(CheckoutError::PostChargePersistenceFailure {
            receipt: ChargeReceipt {
                external_id: "ch_42".into(),
                captured_amount: 2200,
            },
            reason: "db down".into(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn checkout_errors_map_to_distinct_statuses() {
        assert_eq!(
            checkout_status(&CheckoutError::CardDeclined("x".into())),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            checkout_status(&CheckoutError::EmptyBag),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            checkout_status(&CheckoutError::Unauthenticated),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            checkout_status(&CheckoutError::CheckoutInProgress),
            StatusCode::CONFLICT
        );
        assert_eq!(
            checkout_status(&CheckoutError::InvalidSource("tok".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            checkout_status(&CheckoutError::PaymentFailed {
                attempts: 3,
                reason: "down".into()
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
