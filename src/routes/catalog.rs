//! Categories and products.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::permissions;
use crate::domain::aggregates::{Category, Product, ProductDraft, RatingSummary};
use crate::error::{AppError, Result};
use crate::routes::{permitted, PaginatedResponse, ValidJson, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::state::AppState;
use crate::store::ProductQuery;

pub fn router(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/api/categories", get(list_categories))
        .route("/api/categories/:id", get(get_category))
        .route("/api/products", get(list_products))
        .route("/api/products/:id", get(get_product));
    let categories = Router::new()
        .route("/api/categories", post(create_category))
        .route("/api/categories/:id", put(update_category).delete(delete_category));
    let products = Router::new()
        .route("/api/products", post(create_product))
        .route("/api/products/:id", put(update_product).delete(delete_product));

    public
        .merge(permitted(categories, state, permissions::CATEGORIES_MANAGE))
        .merge(permitted(products, state, permissions::PRODUCTS_MANAGE))
}

// ---- categories ----

#[derive(Debug, Deserialize, Validate)]
pub struct CategoryRequest {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(state.store().list_categories().await?))
}

async fn get_category(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Category>> {
    let category = state.store().category_by_id(id).await?.ok_or_else(|| AppError::not_found("Category"))?;
    Ok(Json(category))
}

async fn create_category(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<CategoryRequest>,
) -> Result<(StatusCode, Json<Category>)> {
    let category = Category::create(req.name.trim(), req.description);
    state.store().insert_category(&category).await?;
    tracing::info!(category_id = %category.id, name = %category.name, "Category created");
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<CategoryRequest>,
) -> Result<Json<Category>> {
    let store = state.store();
    let mut category = store.category_by_id(id).await?.ok_or_else(|| AppError::not_found("Category"))?;
    category.name = req.name.trim().to_string();
    category.description = req.description;
    store.update_category(&category).await?;
    Ok(Json(category))
}

async fn delete_category(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    if !state.store().delete_category(id).await? {
        return Err(AppError::not_found("Category"));
    }
    tracing::info!(category_id = %id, "Category deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---- products ----

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListParams {
    pub category: Option<Uuid>,
    pub search: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub in_stock: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl From<ProductListParams> for ProductQuery {
    fn from(p: ProductListParams) -> Self {
        ProductQuery {
            category_id: p.category,
            search: p.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            min_price: p.min_price,
            max_price: p.max_price,
            in_stock_only: p.in_stock.unwrap_or(false),
            page: p.page.unwrap_or(1).max(1),
            limit: p.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequest {
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub name: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub price: i64,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub stock: i32,
    pub category_id: Option<Uuid>,
    #[validate(length(max = 100))]
    pub brand: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

impl From<ProductRequest> for ProductDraft {
    fn from(r: ProductRequest) -> Self {
        ProductDraft {
            name: r.name.trim().to_string(),
            description: r.description,
            price: r.price,
            stock: r.stock,
            category_id: r.category_id,
            brand: r.brand,
            images: r.images,
        }
    }
}

/// A product with its rating summary.
#[derive(Debug, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    #[serde(flatten)]
    pub rating: RatingSummary,
}

async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ProductListParams>,
) -> Result<Json<PaginatedResponse<Product>>> {
    let query = ProductQuery::from(params);
    if let (Some(min), Some(max)) = (query.min_price, query.max_price) {
        if min > max {
            return Err(AppError::bad_request("minPrice must not exceed maxPrice"));
        }
    }
    let page = state.store().search_products(&query).await?;
    Ok(Json(PaginatedResponse::new(page, query.page, query.limit)))
}

async fn get_product(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ProductDetail>> {
    let store = state.store();
    let product = store.product_by_id(id).await?.ok_or_else(|| AppError::not_found("Product"))?;
    let rating = store.rating_summary(id).await?;
    Ok(Json(ProductDetail { product, rating }))
}

async fn create_product(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<ProductRequest>,
) -> Result<(StatusCode, Json<Product>)> {
    ensure_category(&state, req.category_id).await?;
    let product = Product::create(req.into());
    state.store().insert_product(&product).await?;
    tracing::info!(product_id = %product.id, name = %product.name, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<ProductRequest>,
) -> Result<Json<Product>> {
    let store = state.store();
    let mut product = store.product_by_id(id).await?.ok_or_else(|| AppError::not_found("Product"))?;
    ensure_category(&state, req.category_id).await?;
    product.apply(req.into());
    store.update_product(&product).await?;
    tracing::info!(product_id = %product.id, "Product updated");
    Ok(Json(product))
}

async fn delete_product(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    if !state.store().delete_product(id).await? {
        return Err(AppError::not_found("Product"));
    }
    tracing::info!(product_id = %id, "Product deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn ensure_category(state: &AppState, category_id: Option<Uuid>) -> Result<()> {
    let Some(id) = category_id else { return Ok(()) };
    match state.store().category_by_id(id).await? {
        Some(_) => Ok(()),
        None => Err(AppError::bad_request("Category does not exist")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_params_defaults() {
        let query = ProductQuery::from(ProductListParams { search: Some("  ".into()), limit: Some(1000), ..Default::default() });
        assert_eq!(query.search, None);
        assert_eq!((query.page, query.limit), (1, 100));
        assert!(!query.in_stock_only);
    }
}
