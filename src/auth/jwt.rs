//! Bearer token issuing and validation (HS256).

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthError;
use crate::config::JwtSettings;
use crate::domain::aggregates::Role;
use crate::domain::value_objects::grants;

/// Claims carried by every access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub username: String,
    /// Role names
    pub roles: Vec<String>,
    /// Permission keys granted through the roles
    pub permissions: Vec<String>,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
    pub aud: String,
}

#[derive(Clone)]
pub struct JwtService {
    expiration_minutes: i64,
    issuer: String,
    audience: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(settings: &JwtSettings) -> Self {
        let secret = settings.secret.expose_secret().as_bytes();
        Self {
            expiration_minutes: settings.expiration_minutes,
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    pub fn expiration_seconds(&self) -> i64 { self.expiration_minutes * 60 }

    pub fn generate_token(
        &self,
        user_id: Uuid,
        username: &str,
        roles: Vec<String>,
        permissions: Vec<String>,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            roles,
            permissions,
            exp: (now + Duration::minutes(self.expiration_minutes)).timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenGeneration(e.to_string()))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss", "aud"]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }

    /// Extracts the token from an `Authorization: Bearer <token>` header value.
    pub fn extract_from_header(header: &str) -> Option<&str> {
        header.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty())
    }
}

/// The authenticated caller, built from validated claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: Uuid,
    pub username: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl TryFrom<Claims> for CurrentUser {
    type Error = AuthError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&claims.sub).map_err(|e| AuthError::InvalidToken(format!("bad subject: {e}")))?;
        Ok(Self { id, username: claims.username, roles: claims.roles, permissions: claims.permissions })
    }
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool { self.roles.iter().any(|r| r == Role::ADMIN) }

    /// Admins pass every check; `all` and `resource:*` act as wildcards.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.is_admin() || self.permissions.iter().any(|held| grants(held, permission))
    }

    /// Owner of the resource, or holder of `permission`.
    pub fn can_access(&self, owner_id: Uuid, permission: &str) -> bool {
        self.id == owner_id || self.has_permission(permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn service(expiration_minutes: i64) -> JwtService {
        JwtService::new(&JwtSettings {
            secret: SecretString::from("a-test-secret-that-is-long-enough-123".to_string()),
            expiration_minutes,
            issuer: "storefront-api".into(),
            audience: "storefront-clients".into(),
        })
    }

    #[test]
    fn test_jwt_generation_and_validation() {
        let jwt = service(60);
        let id = Uuid::now_v7();
        let token = jwt.generate_token(id, "john_doe", vec!["customer".into()], vec!["reviews:manage".into()]).unwrap();

        let user = CurrentUser::try_from(jwt.validate_token(&token).unwrap()).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.username, "john_doe");
        assert!(user.has_permission("reviews:manage"));
        assert!(!user.has_permission("orders:manage"));
    }

    #[test]
    fn test_expired_token() {
        let jwt = service(-5);
        let token = jwt.generate_token(Uuid::now_v7(), "late", vec![], vec![]).unwrap();
        assert!(matches!(jwt.validate_token(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_token_from_other_audience_rejected() {
        let token = service(60).generate_token(Uuid::now_v7(), "u", vec![], vec![]).unwrap();
        let other = JwtService { audience: "someone-else".into(), ..service(60) };
        assert!(matches!(other.validate_token(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_extract_from_header() {
        assert_eq!(JwtService::extract_from_header("Bearer abc.def"), Some("abc.def"));
        assert_eq!(JwtService::extract_from_header("Basic abc"), None);
        assert_eq!(JwtService::extract_from_header("Bearer "), None);
    }

    #[test]
    fn test_admin_and_wildcards() {
        let user = |roles: &[&str], perms: &[&str]| CurrentUser {
            id: Uuid::now_v7(),
            username: "u".into(),
            roles: roles.iter().map(ToString::to_string).collect(),
            permissions: perms.iter().map(ToString::to_string).collect(),
        };
        assert!(user(&["admin"], &[]).has_permission("users:manage"));
        assert!(user(&[], &["all"]).has_permission("roles:manage"));
        assert!(user(&[], &["orders:*"]).has_permission("orders:manage"));
        assert!(!user(&[], &["orders:*"]).has_permission("payments:manage"));

        let owner = user(&["customer"], &[]);
        assert!(owner.can_access(owner.id, "orders:manage"));
        assert!(!owner.can_access(Uuid::now_v7(), "orders:manage"));
    }
}
