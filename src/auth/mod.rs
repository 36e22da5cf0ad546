//! Authentication and authorization: argon2 passwords, HS256 bearer tokens
//! and permission-gating middleware.

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod permissions;

use thiserror::Error;

pub use jwt::{Claims, CurrentUser, JwtService};
pub use middleware::{require_auth, require_permission, MaybeUser};

#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong password or unknown login.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("{0}")]
    WeakPassword(String),

    #[error("password hashing error")]
    PasswordHash,

    #[error("token generation failed: {0}")]
    TokenGeneration(String),
}
