use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{permissions, CurrentUser};
use crate::domain::aggregates::{Payment, PaymentStatus};
use crate::error::{AppError, Result};
use crate::routes::{authenticated, permitted, PaginatedResponse, Pagination, ValidJson};
use crate::services::payments;
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    let owner = Router::new().route("/api/payments/order/:order_id", get(payment_for_order));
    let staff = Router::new()
        .route("/api/payments", get(list_payments))
        .route("/api/payments/:id/status", put(update_status));
    authenticated(owner, state).merge(permitted(staff, state, permissions::PAYMENTS_MANAGE))
}

/// No field rules; taken through `ValidJson` so an unknown status gets the
/// same 400 `{message}` body as every other malformed request.
#[derive(Debug, Deserialize, Validate)]
pub struct PaymentStatusRequest {
    pub status: PaymentStatus,
}

async fn list_payments(
    State(state): State<AppState>,
    Query(paging): Query<Pagination>,
) -> Result<Json<PaginatedResponse<Payment>>> {
    let (page, limit) = (paging.page(), paging.limit());
    let found = state.store().list_payments(page, limit).await?;
    Ok(Json(PaginatedResponse::new(found, page, limit)))
}

async fn payment_for_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Payment>> {
    let store = state.store();
    let order = store.order_by_id(order_id).await?.ok_or_else(|| AppError::not_found("Order"))?;
    if !user.can_access(order.user_id, permissions::PAYMENTS_MANAGE) {
        return Err(AppError::forbidden());
    }
    let payment = store.payment_for_order(order.id).await?.ok_or_else(|| AppError::not_found("Payment"))?;
    Ok(Json(payment))
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<PaymentStatusRequest>,
) -> Result<Json<Payment>> {
    Ok(Json(payments::update_payment_status(&state, id, req.status).await?))
}
