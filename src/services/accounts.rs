//! Registration, login and access-control seeding.

use std::collections::BTreeSet;

use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::auth::password::{hash_password, validate_password, verify_password};
use crate::auth::{permissions, AuthError};
use crate::config::BootstrapAdmin;
use crate::domain::aggregates::{Permission, Role, User};
use crate::domain::value_objects::{Email, PermissionKey, Username};
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::store::{Store, StoreError, StoreResult};

pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: UserProfile,
}

/// A user with role names and effective permissions resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

#[instrument(skip(state, input), fields(username = %input.username))]
pub async fn register(state: &AppState, input: Registration) -> Result<UserProfile> {
    let username = Username::parse(&input.username).map_err(|e| AppError::Validation(e.to_string()))?;
    let email = Email::parse(&input.email).map_err(|e| AppError::Validation(e.to_string()))?;
    validate_password(&input.password)?;

    let store = state.store();
    if store.user_by_login(username.as_str()).await?.is_some() {
        return Err(AppError::bad_request("Username already exists"));
    }
    if store.user_by_login(email.as_str()).await?.is_some() {
        return Err(AppError::bad_request("Email already exists"));
    }

    let role_ids = match store.role_by_name(Role::CUSTOMER).await? {
        Some(role) => vec![role.id],
        None => {
            tracing::warn!("Customer role missing, registering user without roles");
            vec![]
        }
    };
    let password_hash = hash_password(&input.password)?;
    let full_name = input.full_name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    let user = User::register(username, email, password_hash, full_name, role_ids);

    // a concurrent registration can still win the race on the unique indexes
    store.insert_user(&user).await.map_err(|e| match e {
        StoreError::Conflict(message) => AppError::BadRequest(capitalize_first(&message)),
        other => other.into(),
    })?;
    tracing::info!(user_id = %user.id, "User registered");

    let display_name = user.full_name.clone().unwrap_or_else(|| user.username.clone());
    state.notifier().welcome(user.email.clone(), display_name);

    profile(store, user).await.map_err(Into::into)
}

#[instrument(skip(state, password))]
pub async fn login(state: &AppState, login: &str, password: &str) -> Result<Session> {
    let user = state.store().user_by_login(login).await?.ok_or(AuthError::InvalidCredentials)?;
    verify_password(password, &user.password_hash)?;
    tracing::info!(user_id = %user.id, "User logged in");
    issue_session(state, user).await
}

pub async fn issue_session(state: &AppState, user: User) -> Result<Session> {
    let profile = profile(state.store(), user).await?;
    let token = state.jwt().generate_token(
        profile.user.id,
        &profile.user.username,
        profile.roles.clone(),
        profile.permissions.clone(),
    )?;
    Ok(Session { token, token_type: "Bearer", expires_in: state.jwt().expiration_seconds(), user: profile })
}

pub async fn change_password(state: &AppState, user_id: Uuid, current: &str, new: &str) -> Result<()> {
    let mut user = state.store().user_by_id(user_id).await?.ok_or_else(|| AppError::not_found("User"))?;
    verify_password(current, &user.password_hash)
        .map_err(|_| AppError::bad_request("Current password is incorrect"))?;
    validate_password(new)?;
    user.password_hash = hash_password(new)?;
    user.touch();
    state.store().update_user(&user).await?;
    tracing::info!(user_id = %user.id, "Password changed");
    Ok(())
}

/// Resolves role names and the union of their permission keys.
pub async fn profile(store: &dyn Store, user: User) -> StoreResult<UserProfile> {
    let roles = store.roles_by_ids(&user.role_ids).await?;
    let permission_ids: BTreeSet<Uuid> = roles.iter().flat_map(|r| r.permission_ids.iter().copied()).collect();
    let permission_ids: Vec<Uuid> = permission_ids.into_iter().collect();
    let mut permissions: Vec<String> =
        store.permissions_by_ids(&permission_ids).await?.into_iter().map(|p| p.key).collect();
    permissions.sort();
    permissions.dedup();
    Ok(UserProfile { roles: roles.into_iter().map(|r| r.name).collect(), permissions, user })
}

/// Creates the permission catalogue and built-in roles that are missing.
/// Existing rows are left untouched, so edits made by admins survive restarts.
pub async fn seed_access_control(store: &dyn Store) -> Result<()> {
    let mut existing = store.list_permissions().await?;
    for (key, description) in permissions::CATALOGUE {
        if existing.iter().any(|p| p.key == *key) { continue; }
        let key = PermissionKey::parse(key).map_err(|e| AppError::Internal(e.to_string()))?;
        let permission = Permission::create(key, Some((*description).to_string()));
        store.insert_permission(&permission).await?;
        tracing::info!(key = %permission.key, "Seeded permission");
        existing.push(permission);
    }

    for (name, description, grants) in permissions::default_roles() {
        if store.role_by_name(name).await?.is_some() { continue; }
        let permission_ids =
            existing.iter().filter(|p| grants.contains(&p.key.as_str())).map(|p| p.id).collect();
        let role = Role::create(name, Some(description.to_string()), permission_ids);
        store.insert_role(&role).await?;
        tracing::info!(role = name, "Seeded role");
    }
    Ok(())
}

/// Creates the configured administrator unless the login is already taken.
pub async fn ensure_bootstrap_admin(store: &dyn Store, admin: &BootstrapAdmin) -> Result<()> {
    if store.user_by_login(&admin.username).await?.is_some() || store.user_by_login(&admin.email).await?.is_some() {
        tracing::debug!(username = %admin.username, "Bootstrap admin already exists");
        return Ok(());
    }
    let role = store.role_by_name(Role::ADMIN).await?.ok_or_else(|| AppError::Internal("admin role missing".into()))?;
    let username = Username::parse(&admin.username).map_err(|e| AppError::Internal(format!("ADMIN_USERNAME: {e}")))?;
    let email = Email::parse(&admin.email).map_err(|e| AppError::Internal(format!("ADMIN_EMAIL: {e}")))?;
    let password = admin.password.expose_secret();
    validate_password(password)?;

    let user = User::register(username, email, hash_password(password)?, None, vec![role.id]);
    store.insert_user(&user).await?;
    tracing::info!(user_id = %user.id, username = %user.username, "Bootstrap admin created");
    Ok(())
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map(|c| c.to_uppercase().chain(chars).collect()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AccessStore, MemoryStore, UserStore};
    use secrecy::SecretString;

    #[tokio::test]
    async fn test_seeding_is_idempotent() {
        let store = MemoryStore::new();
        seed_access_control(&store).await.unwrap();
        seed_access_control(&store).await.unwrap();

        assert_eq!(store.list_permissions().await.unwrap().len(), permissions::CATALOGUE.len());
        assert_eq!(store.list_roles().await.unwrap().len(), 3);

        let staff = store.role_by_name(Role::STAFF).await.unwrap().unwrap();
        assert_eq!(staff.permission_ids.len(), permissions::DEFAULT_STAFF_PERMISSIONS.len());
        let customer = store.role_by_name(Role::CUSTOMER).await.unwrap().unwrap();
        assert!(customer.permission_ids.is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_admin_gets_admin_role() {
        let store = MemoryStore::new();
        seed_access_control(&store).await.unwrap();
        let admin = BootstrapAdmin {
            username: "root".into(),
            email: "root@example.com".into(),
            password: SecretString::from("super-secret-pw".to_string()),
        };
        ensure_bootstrap_admin(&store, &admin).await.unwrap();
        ensure_bootstrap_admin(&store, &admin).await.unwrap();

        let user = store.user_by_login("root").await.unwrap().unwrap();
        let profile = profile(&store, user).await.unwrap();
        assert_eq!(profile.roles, vec!["admin".to_string()]);
        assert_eq!(profile.permissions, vec!["all".to_string()]);
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }
}
