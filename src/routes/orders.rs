use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{permissions, CurrentUser};
use crate::domain::aggregates::{Order, OrderStatus, Payment, PaymentMethod, ShippingAddress};
use crate::error::Result;
use crate::routes::{authenticated, permitted, PaginatedResponse, Pagination, ValidJson};
use crate::services::orders::{self, NewOrder, RequestedLine};
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    let customer = Router::new()
        .route("/api/orders", post(create_order))
        .route("/api/orders/my", get(my_orders))
        .route("/api/orders/:id", get(get_order))
        .route("/api/orders/:id/cancel", put(cancel_order));
    let staff = Router::new()
        .route("/api/orders", get(list_orders))
        .route("/api/orders/:id/status", put(update_status));
    authenticated(customer, state).merge(permitted(staff, state, permissions::ORDERS_MANAGE))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "must contain at least one item"))]
    pub items: Vec<OrderItemRequest>,
    #[validate]
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Price the client saw; rejected when it no longer matches the catalog.
    pub price: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct OrderListParams {
    pub status: Option<OrderStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StatusRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub status: String,
}

/// An order together with its payment record.
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub payment: Option<Payment>,
}

async fn create_order(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidJson(req): ValidJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>)> {
    let input = NewOrder {
        items: req
            .items
            .into_iter()
            .map(|i| RequestedLine { product_id: i.product_id, quantity: i.quantity, price: i.price })
            .collect(),
        shipping_address: req.shipping_address,
        payment_method: req.payment_method,
    };
    let order = orders::place_order(&state, &user, input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn my_orders(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.store().orders_for_user(user.id).await?))
}

async fn get_order(State(state): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>) -> Result<Json<OrderDetail>> {
    let order = orders::visible_order(&state, &user, id).await?;
    let payment = state.store().payment_for_order(order.id).await?;
    Ok(Json(OrderDetail { order, payment }))
}

async fn cancel_order(State(state): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(orders::cancel_order(&state, &user, id, Utc::now()).await?))
}

async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<OrderListParams>,
) -> Result<Json<PaginatedResponse<Order>>> {
    let paging = Pagination { page: params.page, limit: params.limit };
    let (page, limit) = (paging.page(), paging.limit());
    let found = state.store().list_orders(params.status, page, limit).await?;
    Ok(Json(PaginatedResponse::new(found, page, limit)))
}

async fn update_status(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<StatusRequest>,
) -> Result<Json<Order>> {
    let next: OrderStatus = req.status.trim().parse()?;
    Ok(Json(orders::update_status(&state, &user, id, next, Utc::now()).await?))
}
