use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::permissions;
use crate::domain::aggregates::{Permission, Role};
use crate::domain::value_objects::PermissionKey;
use crate::error::{AppError, Result};
use crate::routes::{permitted, ValidJson};
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    let routes = Router::new()
        .route("/api/permissions", get(list_permissions).post(create_permission))
        .route("/api/permissions/:id", put(update_permission).delete(delete_permission))
        .route("/api/roles", get(list_roles).post(create_role))
        .route("/api/roles/:id", get(get_role).put(update_role).delete(delete_role));
    permitted(routes, state, permissions::ROLES_MANAGE)
}

#[derive(Debug, Deserialize, Validate)]
pub struct PermissionRequest {
    #[validate(length(min = 1, max = 100, message = "is required"))]
    pub key: String,
    #[validate(length(max = 255))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RoleRequest {
    #[validate(length(min = 2, max = 50, message = "must be 2-50 characters"))]
    pub name: String,
    #[validate(length(max = 255))]
    pub description: Option<String>,
    #[serde(default)]
    pub permission_ids: Vec<Uuid>,
}

async fn list_permissions(State(state): State<AppState>) -> Result<Json<Vec<Permission>>> {
    Ok(Json(state.store().list_permissions().await?))
}

async fn create_permission(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<PermissionRequest>,
) -> Result<(StatusCode, Json<Permission>)> {
    let key = PermissionKey::parse(&req.key).map_err(|e| AppError::Validation(e.to_string()))?;
    let permission = Permission::create(key, req.description);
    state.store().insert_permission(&permission).await?;
    tracing::info!(key = %permission.key, "Permission created");
    Ok((StatusCode::CREATED, Json(permission)))
}

async fn update_permission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<PermissionRequest>,
) -> Result<Json<Permission>> {
    let store = state.store();
    let mut permission = store.permissions_by_ids(&[id]).await?.pop().ok_or_else(|| AppError::not_found("Permission"))?;
    let key = PermissionKey::parse(&req.key).map_err(|e| AppError::Validation(e.to_string()))?;
    permission.key = key.as_str().to_string();
    permission.description = req.description;
    store.update_permission(&permission).await?;
    Ok(Json(permission))
}

async fn delete_permission(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    if !state.store().delete_permission(id).await? {
        return Err(AppError::not_found("Permission"));
    }
    tracing::info!(permission_id = %id, "Permission deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_roles(State(state): State<AppState>) -> Result<Json<Vec<Role>>> {
    Ok(Json(state.store().list_roles().await?))
}

async fn get_role(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Role>> {
    let role = state.store().role_by_id(id).await?.ok_or_else(|| AppError::not_found("Role"))?;
    Ok(Json(role))
}

async fn create_role(State(state): State<AppState>, ValidJson(req): ValidJson<RoleRequest>) -> Result<(StatusCode, Json<Role>)> {
    let permission_ids = existing_permissions(&state, req.permission_ids).await?;
    let role = Role::create(req.name.trim().to_lowercase(), req.description, permission_ids);
    state.store().insert_role(&role).await?;
    tracing::info!(role = %role.name, "Role created");
    Ok((StatusCode::CREATED, Json(role)))
}

async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<RoleRequest>,
) -> Result<Json<Role>> {
    let store = state.store();
    let mut role = store.role_by_id(id).await?.ok_or_else(|| AppError::not_found("Role"))?;
    let name = req.name.trim().to_lowercase();
    if is_builtin(&role.name) && name != role.name {
        return Err(AppError::bad_request("Built-in roles cannot be renamed"));
    }
    role.permission_ids = existing_permissions(&state, req.permission_ids).await?;
    role.name = name;
    role.description = req.description;
    store.update_role(&role).await?;
    tracing::info!(role = %role.name, "Role updated");
    Ok(Json(role))
}

async fn delete_role(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    let store = state.store();
    let role = store.role_by_id(id).await?.ok_or_else(|| AppError::not_found("Role"))?;
    if is_builtin(&role.name) {
        return Err(AppError::bad_request("Built-in roles cannot be deleted"));
    }
    store.delete_role(id).await?;
    tracing::info!(role = %role.name, "Role deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn is_builtin(name: &str) -> bool { [Role::ADMIN, Role::STAFF, Role::CUSTOMER].contains(&name) }

/// Dedups `ids` and checks every one refers to a stored permission.
async fn existing_permissions(state: &AppState, mut ids: Vec<Uuid>) -> Result<Vec<Uuid>> {
    ids.sort();
    ids.dedup();
    let found = state.store().permissions_by_ids(&ids).await?;
    if found.len() != ids.len() {
        return Err(AppError::bad_request("One or more permissions do not exist"));
    }
    Ok(ids)
}
