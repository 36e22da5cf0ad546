use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::Result;
use crate::routes::authenticated;
use crate::services::recommendations::{self, Recommendations, DEFAULT_LIMIT, MAX_LIMIT};
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    authenticated(Router::new().route("/api/recommendations", get(for_user)), state)
        .route("/api/recommendations/similar/:product_id", get(similar))
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

impl LimitParams {
    fn limit(&self) -> usize { self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT) }
}

async fn for_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<LimitParams>,
) -> Result<Json<Recommendations>> {
    Ok(Json(recommendations::recommend_for_user(&state, user.id, params.limit()).await?))
}

async fn similar(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Recommendations>> {
    Ok(Json(recommendations::similar_products(&state, product_id, params.limit()).await?))
}
