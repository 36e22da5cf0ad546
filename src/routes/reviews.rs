use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{permissions, CurrentUser};
use crate::domain::aggregates::Review;
use crate::error::{AppError, Result};
use crate::routes::ValidJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/products/:id/reviews", get(list_reviews).post(create_review))
        .route("/api/reviews/:id", delete(delete_review))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewRequest {
    #[validate(range(min = 1, max = 5, message = "must be between 1 and 5"))]
    pub rating: i16,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}

async fn list_reviews(State(state): State<AppState>, Path(product_id): Path<Uuid>) -> Result<Json<Vec<Review>>> {
    let store = state.store();
    if store.product_by_id(product_id).await?.is_none() {
        return Err(AppError::not_found("Product"));
    }
    Ok(Json(store.reviews_for_product(product_id).await?))
}

async fn create_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(product_id): Path<Uuid>,
    ValidJson(req): ValidJson<ReviewRequest>,
) -> Result<(StatusCode, Json<Review>)> {
    let store = state.store();
    if store.product_by_id(product_id).await?.is_none() {
        return Err(AppError::not_found("Product"));
    }
    let comment = req.comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
    let review = Review::create(product_id, user.id, req.rating, comment);
    store.insert_review(&review).await?;
    tracing::info!(review_id = %review.id, product_id = %product_id, rating = review.rating, "Review added");
    Ok((StatusCode::CREATED, Json(review)))
}

/// Authors may delete their own reviews; moderators any review.
async fn delete_review(State(state): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    let store = state.store();
    let review = store.review_by_id(id).await?.ok_or_else(|| AppError::not_found("Review"))?;
    if !user.can_access(review.user_id, permissions::REVIEWS_MANAGE) {
        return Err(AppError::forbidden());
    }
    store.delete_review(id).await?;
    tracing::info!(review_id = %id, deleted_by = %user.id, "Review deleted");
    Ok(StatusCode::NO_CONTENT)
}
