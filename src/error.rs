//! Unified error handling.
//!
//! Handlers return `Result<T, AppError>`. Server-side failures are logged and
//! answered with a generic message; client errors carry their message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

use crate::auth::AuthError;
use crate::domain::aggregates::{CartError, OrderError, PaymentError, ProductError};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self { Self::NotFound(what.into()) }
    pub fn bad_request(message: impl Into<String>) -> Self { Self::BadRequest(message.into()) }
    pub fn forbidden() -> Self { Self::Forbidden("You do not have permission to perform this action".into()) }
    pub fn unauthorized() -> Self { Self::Unauthorized("Authentication required".into()) }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Store(_) | Self::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound(capitalize(what)),
            StoreError::Conflict(message) => Self::Conflict(message),
            StoreError::InsufficientStock { .. } => Self::BadRequest(e.to_string()),
            other => Self::Store(other),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(e: ValidationErrors) -> Self { Self::Validation(flatten_validation_errors(&e)) }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => Self::Unauthorized(e.to_string()),
            AuthError::TokenExpired | AuthError::InvalidToken(_) => Self::Unauthorized(e.to_string()),
            AuthError::WeakPassword(_) => Self::Validation(e.to_string()),
            AuthError::PasswordHash | AuthError::TokenGeneration(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(e: OrderError) -> Self { Self::BadRequest(e.to_string()) }
}

impl From<PaymentError> for AppError {
    fn from(e: PaymentError) -> Self { Self::BadRequest(e.to_string()) }
}

impl From<CartError> for AppError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::ItemNotFound => Self::NotFound("Cart item".into()),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

impl From<ProductError> for AppError {
    fn from(e: ProductError) -> Self { Self::BadRequest(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Joins every field error into one message, sorted by field name:
/// `"email: must be a valid email; username: length"`. Nested structs are
/// reported with a dotted path (`shipping_address.phone`).
pub fn flatten_validation_errors(errors: &ValidationErrors) -> String {
    let mut fields = Vec::new();
    collect_field_errors(errors, "", &mut fields);
    fields.sort();
    fields.join("; ")
}

fn collect_field_errors(errors: &ValidationErrors, prefix: &str, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() { (*field).to_string() } else { format!("{prefix}.{field}") };
        match kind {
            ValidationErrorsKind::Field(errs) => {
                let detail = errs
                    .iter()
                    .map(|e| e.message.as_ref().map_or_else(|| e.code.to_string(), ToString::to_string))
                    .collect::<Vec<_>>()
                    .join(", ");
                out.push(format!("{path}: {detail}"));
            }
            ValidationErrorsKind::Struct(nested) => collect_field_errors(nested, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_field_errors(nested, &format!("{path}[{index}]"), out);
                }
            }
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
