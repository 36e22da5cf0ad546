//! Users, roles and permissions

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::value_objects::{Email, PermissionKey, Username};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn register(username: Username, email: Email, password_hash: String, full_name: Option<String>, role_ids: Vec<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), username: username.into_inner(), email: email.into_inner(), password_hash,
            full_name, phone: None, address: None, role_ids, created_at: now, updated_at: now,
        }
    }

    pub fn has_role(&self, role_id: Uuid) -> bool { self.role_ids.contains(&role_id) }

    pub fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub permission_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Role {
    pub const ADMIN: &'static str = "admin";
    pub const STAFF: &'static str = "staff";
    pub const CUSTOMER: &'static str = "customer";

    pub fn create(name: impl Into<String>, description: Option<String>, permission_ids: Vec<Uuid>) -> Self {
        Self { id: Uuid::now_v7(), name: name.into(), description, permission_ids, created_at: Utc::now() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: Uuid,
    pub key: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    pub fn create(key: PermissionKey, description: Option<String>) -> Self {
        Self { id: Uuid::now_v7(), key: key.as_str().to_string(), description, created_at: Utc::now() }
    }
}
