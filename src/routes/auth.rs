use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Deserialize;
use validator::Validate;

use crate::error::Result;
use crate::routes::ValidJson;
use crate::services::accounts::{self, Registration, Session};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 30, message = "must be 3-30 characters"))]
    pub username: String,
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "must be 8-128 characters"))]
    pub password: String,
    #[validate(length(max = 100))]
    pub full_name: Option<String>,
}

/// `login` accepts an email or a username.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(alias = "email", alias = "username")]
    #[validate(length(min = 1, message = "is required"))]
    pub login: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

/// Registers a customer and logs them in.
async fn register(State(state): State<AppState>, ValidJson(req): ValidJson<RegisterRequest>) -> Result<(StatusCode, Json<Session>)> {
    let registration = Registration { username: req.username, email: req.email, password: req.password, full_name: req.full_name };
    let profile = accounts::register(&state, registration).await?;
    let session = accounts::issue_session(&state, profile.user).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn login(State(state): State<AppState>, ValidJson(req): ValidJson<LoginRequest>) -> Result<Json<Session>> {
    Ok(Json(accounts::login(&state, req.login.trim(), &req.password).await?))
}
