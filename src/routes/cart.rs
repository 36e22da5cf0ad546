//! The caller's shopping cart. Every user has one, created on first use.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::CurrentUser;
use crate::domain::aggregates::Cart;
use crate::error::{AppError, Result};
use crate::routes::{authenticated, ValidJson};
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    let routes = Router::new()
        .route("/api/cart", get(get_cart).delete(clear_cart))
        .route("/api/cart/items", post(add_item))
        .route("/api/cart/items/:product_id", put(update_item).delete(remove_item));
    authenticated(routes, state)
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 1000, message = "must be between 1 and 1000"))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateItemRequest {
    #[validate(range(min = 0, max = 1000, message = "must be between 0 and 1000"))]
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub id: Uuid,
    pub items: Vec<CartLineView>,
    pub total: i64,
    pub item_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineView {
    pub product_id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub unit_price: i64,
    pub quantity: i32,
    pub line_total: i64,
    pub stock: i32,
}

async fn get_cart(State(state): State<AppState>, user: CurrentUser) -> Result<Json<CartView>> {
    let cart = load_cart(&state, user.id).await?;
    view(&state, cart).await.map(Json)
}

async fn add_item(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidJson(req): ValidJson<AddItemRequest>,
) -> Result<Json<CartView>> {
    let store = state.store();
    let product = store.product_by_id(req.product_id).await?.ok_or_else(|| AppError::not_found("Product"))?;
    let mut cart = load_cart(&state, user.id).await?;
    cart.add_item(product.id, req.quantity, product.price, product.stock)?;
    store.save_cart(&cart).await?;
    view(&state, cart).await.map(Json)
}

async fn update_item(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(product_id): Path<Uuid>,
    ValidJson(req): ValidJson<UpdateItemRequest>,
) -> Result<Json<CartView>> {
    let store = state.store();
    let mut cart = load_cart(&state, user.id).await?;
    let available = store.product_by_id(product_id).await?.map_or(0, |p| p.stock);
    cart.update_quantity(product_id, req.quantity, available)?;
    store.save_cart(&cart).await?;
    view(&state, cart).await.map(Json)
}

async fn remove_item(State(state): State<AppState>, user: CurrentUser, Path(product_id): Path<Uuid>) -> Result<Json<CartView>> {
    let mut cart = load_cart(&state, user.id).await?;
    cart.remove_item(product_id)?;
    state.store().save_cart(&cart).await?;
    view(&state, cart).await.map(Json)
}

async fn clear_cart(State(state): State<AppState>, user: CurrentUser) -> Result<Json<CartView>> {
    let mut cart = load_cart(&state, user.id).await?;
    cart.clear();
    state.store().save_cart(&cart).await?;
    view(&state, cart).await.map(Json)
}

async fn load_cart(state: &AppState, user_id: Uuid) -> Result<Cart> {
    Ok(state.store().cart_for_user(user_id).await?.unwrap_or_else(|| Cart::new(user_id)))
}

/// Prices lines at the current catalog price; lines whose product has
/// been deleted are left out.
async fn view(state: &AppState, cart: Cart) -> Result<CartView> {
    let ids: Vec<Uuid> = cart.items.iter().map(|i| i.product_id).collect();
    let products: HashMap<Uuid, _> = state.store().products_by_ids(&ids).await?.into_iter().map(|p| (p.id, p)).collect();

    let items: Vec<CartLineView> = cart
        .items
        .iter()
        .filter_map(|item| {
            let product = products.get(&item.product_id)?;
            Some(CartLineView {
                product_id: product.id,
                name: product.name.clone(),
                image: product.images.first().cloned(),
                unit_price: product.price,
                quantity: item.quantity,
                line_total: product.price * i64::from(item.quantity),
                stock: product.stock,
            })
        })
        .collect();
    let total = items.iter().map(|i| i.line_total).sum();
    Ok(CartView { id: cart.id, item_count: items.len(), total, items })
}
