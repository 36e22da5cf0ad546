use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{permissions, CurrentUser};
use crate::domain::value_objects::Email;
use crate::error::{AppError, Result};
use crate::routes::{authenticated, permitted, ValidJson};
use crate::services::accounts::{self, UserProfile};
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    let me = Router::new()
        .route("/api/users/me", get(me).put(update_me))
        .route("/api/users/me/password", put(change_password));
    let admin = Router::new()
        .route("/api/users", get(list_users))
        .route("/api/users/:id", get(get_user).delete(delete_user))
        .route("/api/users/:id/roles", put(set_roles));
    authenticated(me, state).merge(permitted(admin, state, permissions::USERS_MANAGE))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(email(message = "must be a valid email"))]
    pub email: Option<String>,
    #[validate(length(max = 100))]
    pub full_name: Option<String>,
    #[validate(length(max = 20))]
    pub phone: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub current_password: String,
    #[validate(length(min = 8, max = 128, message = "must be 8-128 characters"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetRolesRequest {
    pub role_ids: Vec<Uuid>,
}

async fn me(State(state): State<AppState>, user: CurrentUser) -> Result<Json<UserProfile>> {
    load_profile(&state, user.id).await.map(Json)
}

async fn update_me(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidJson(req): ValidJson<UpdateProfileRequest>,
) -> Result<Json<UserProfile>> {
    let store = state.store();
    let mut account = store.user_by_id(user.id).await?.ok_or_else(|| AppError::not_found("User"))?;

    if let Some(email) = req.email {
        let email = Email::parse(&email).map_err(|e| AppError::Validation(e.to_string()))?;
        if email.as_str() != account.email {
            if store.user_by_login(email.as_str()).await?.is_some() {
                return Err(AppError::bad_request("Email already exists"));
            }
            account.email = email.into_inner();
        }
    }
    let blank_to_none = |v: String| Some(v.trim().to_string()).filter(|v| !v.is_empty());
    if let Some(full_name) = req.full_name { account.full_name = blank_to_none(full_name); }
    if let Some(phone) = req.phone { account.phone = blank_to_none(phone); }
    if let Some(address) = req.address { account.address = blank_to_none(address); }
    account.touch();

    store.update_user(&account).await?;
    tracing::info!(user_id = %account.id, "Profile updated");
    Ok(Json(accounts::profile(store, account).await?))
}

async fn change_password(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidJson(req): ValidJson<ChangePasswordRequest>,
) -> Result<StatusCode> {
    accounts::change_password(&state, user.id, &req.current_password, &req.new_password).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserProfile>>> {
    let store = state.store();
    let mut profiles = Vec::new();
    for user in store.list_users().await? {
        profiles.push(accounts::profile(store, user).await?);
    }
    Ok(Json(profiles))
}

async fn get_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<UserProfile>> {
    load_profile(&state, id).await.map(Json)
}

async fn delete_user(State(state): State<AppState>, caller: CurrentUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    if caller.id == id {
        return Err(AppError::bad_request("You cannot delete your own account"));
    }
    if !state.store().delete_user(id).await? {
        return Err(AppError::not_found("User"));
    }
    tracing::info!(user_id = %id, deleted_by = %caller.id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Replaces the user's roles. Takes effect at their next login.
async fn set_roles(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<SetRolesRequest>,
) -> Result<Json<UserProfile>> {
    let store = state.store();
    let mut user = store.user_by_id(id).await?.ok_or_else(|| AppError::not_found("User"))?;

    let mut role_ids = req.role_ids;
    role_ids.sort();
    role_ids.dedup();
    let roles = store.roles_by_ids(&role_ids).await?;
    if roles.len() != role_ids.len() {
        return Err(AppError::bad_request("One or more roles do not exist"));
    }

    user.role_ids = role_ids;
    user.touch();
    store.update_user(&user).await?;
    tracing::info!(user_id = %user.id, roles = ?roles.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), "User roles updated");
    Ok(Json(accounts::profile(store, user).await?))
}

async fn load_profile(state: &AppState, id: Uuid) -> Result<UserProfile> {
    let store = state.store();
    let user = store.user_by_id(id).await?.ok_or_else(|| AppError::not_found("User"))?;
    Ok(accounts::profile(store, user).await?)
}
