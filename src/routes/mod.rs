//! HTTP routes, one module per resource.

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod chatbot;
pub mod orders;
pub mod payments;
pub mod recommendations;
pub mod reviews;
pub mod roles;
pub mod users;
pub mod vnpay;

use axum::{
    extract::{FromRequest, Request},
    middleware,
    routing::get,
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use validator::Validate;

use crate::auth::{require_auth, require_permission};
use crate::error::AppError;
use crate::state::AppState;
use crate::store::Page;

pub const DEFAULT_PAGE_SIZE: u32 = 12;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Every API route, with state attached.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(auth::router())
        .merge(users::router(&state))
        .merge(roles::router(&state))
        .merge(catalog::router(&state))
        .merge(reviews::router())
        .merge(cart::router(&state))
        .merge(orders::router(&state))
        .merge(payments::router(&state))
        .merge(vnpay::router(&state))
        .merge(recommendations::router(&state))
        .merge(chatbot::router())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy", "service": "storefront-api" }))
}

/// Routes that need a logged-in caller.
pub(crate) fn authenticated(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
}

/// Routes that need a logged-in caller holding `permission`.
pub(crate) fn permitted(router: Router<AppState>, state: &AppState, permission: &'static str) -> Router<AppState> {
    authenticated(router.route_layer(middleware::from_fn(require_permission(permission))), state)
}

/// JSON body that has passed `validator` checks. Malformed bodies and
/// failed checks both answer 400 with a `{"message"}` body.
pub struct ValidJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| AppError::BadRequest(e.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl Pagination {
    pub fn page(&self) -> u32 { self.page.unwrap_or(1).max(1) }
    pub fn limit(&self) -> u32 { self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE) }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub total_pages: u32,
}

impl<T> PaginatedResponse<T> {
    pub fn new(page: Page<T>, current: u32, limit: u32) -> Self {
        let total_pages = u32::try_from((page.total + i64::from(limit) - 1) / i64::from(limit.max(1))).unwrap_or(u32::MAX);
        Self { data: page.items, total: page.total, page: current, total_pages }
    }
}
