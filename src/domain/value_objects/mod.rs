//! Value Objects for the storefront

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalised email address
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Email(String);

impl Email {
    pub fn parse(value: impl AsRef<str>) -> Result<Self, EmailError> {
        let value = value.as_ref().trim().to_lowercase();
        if value.is_empty() { return Err(EmailError::Empty); }
        if !validator::validate_email(&value) { return Err(EmailError::Invalid(value)); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_inner(self) -> String { self.0 }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmailError {
    #[error("email is empty")]
    Empty,
    #[error("invalid email: {0}")]
    Invalid(String),
}

/// Login name: 3-30 characters of letters, digits, `_` and `.`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Username(String);

impl Username {
    pub const MIN_LEN: usize = 3;
    pub const MAX_LEN: usize = 30;

    pub fn parse(value: impl AsRef<str>) -> Result<Self, UsernameError> {
        let value = value.as_ref().trim();
        let len = value.chars().count();
        if len < Self::MIN_LEN { return Err(UsernameError::TooShort); }
        if len > Self::MAX_LEN { return Err(UsernameError::TooLong); }
        if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
            return Err(UsernameError::InvalidCharacter);
        }
        Ok(Self(value.to_string()))
    }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_inner(self) -> String { self.0 }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsernameError {
    #[error("username must be at least 3 characters")]
    TooShort,
    #[error("username must be at most 30 characters")]
    TooLong,
    #[error("username may only contain letters, digits, '_' and '.'")]
    InvalidCharacter,
}

/// Permission key in `resource:action` form.
///
/// `all` grants everything and `resource:*` grants every action on a resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionKey(String);

impl PermissionKey {
    pub const ALL: &'static str = "all";

    pub fn parse(value: impl AsRef<str>) -> Result<Self, PermissionKeyError> {
        let value = value.as_ref().trim().to_lowercase();
        if value == Self::ALL { return Ok(Self(value)); }
        let (resource, action) = value.split_once(':').ok_or(PermissionKeyError::MissingAction)?;
        let valid_part = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_lowercase() || c == '_' || c == '*');
        if !valid_part(resource) || !valid_part(action) || resource.contains('*') {
            return Err(PermissionKeyError::Invalid(value));
        }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }

    /// Whether holding `self` satisfies a check for `required`.
    pub fn grants(&self, required: &str) -> bool {
        grants(&self.0, required)
    }
}

/// String form of [`PermissionKey::grants`], used on token claims.
pub fn grants(held: &str, required: &str) -> bool {
    if held == PermissionKey::ALL || held == required { return true; }
    match (held.split_once(':'), required.split_once(':')) {
        (Some((resource, "*")), Some((required_resource, _))) => resource == required_resource,
        _ => false,
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionKeyError {
    #[error("permission key must look like 'resource:action'")]
    MissingAction,
    #[error("invalid permission key: {0}")]
    Invalid(String),
}
