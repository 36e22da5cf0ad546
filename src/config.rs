//! Configuration loaded from environment variables (`.env` is read first).
//!
//! # Environment Variables
//!
//! ## Server
//! - `HOST` - Bind address (default: 0.0.0.0)
//! - `PORT` - Listen port (default: 8083)
//! - `DATABASE_URL` - PostgreSQL connection string. When unset the service
//!   runs on the in-memory store and loses data on restart.
//! - `DATABASE_MAX_CONNECTIONS` - Pool size (default: 10)
//!
//! ## Auth
//! - `JWT_SECRET` - HS256 signing secret, at least 32 characters. Required
//!   when `DATABASE_URL` is set.
//! - `JWT_EXPIRATION_MINUTES` - Token lifetime (default: 1440)
//! - `JWT_ISSUER` / `JWT_AUDIENCE` - Token issuer and audience
//! - `ADMIN_USERNAME`, `ADMIN_EMAIL`, `ADMIN_PASSWORD` - Optional bootstrap
//!   administrator created at startup when missing
//!
//! ## VNPay (all of code and secret enable the gateway)
//! - `VNPAY_TMN_CODE`, `VNPAY_HASH_SECRET`
//! - `VNPAY_URL` (default: sandbox payment URL)
//! - `VNPAY_RETURN_URL` (default: http://localhost:3000/payment/vnpay-return)
//!
//! ## Generative AI
//! - `GEMINI_API_KEY` - Enables recommendations and chatbot replies
//! - `GEMINI_MODEL` (default: gemini-1.5-flash)
//!
//! ## Email (SMTP_HOST enables mail)
//! - `SMTP_HOST`, `SMTP_PORT` (default: 587), `SMTP_USERNAME`,
//!   `SMTP_PASSWORD`, `SMTP_FROM`
//!
//! ## Events
//! - `NATS_URL` - Publish order events when set

use std::net::{IpAddr, SocketAddr};

use secrecy::SecretString;
use thiserror::Error;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const DEFAULT_PORT: u16 = 8083;
const DEFAULT_VNPAY_URL: &str = "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html";
const DEFAULT_VNPAY_RETURN_URL: &str = "http://localhost:3000/payment/vnpay-return";
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    pub database_url: Option<SecretString>,
    pub database_max_connections: u32,
    pub jwt: JwtSettings,
    pub vnpay: Option<VnpayConfig>,
    pub gemini: Option<GeminiConfig>,
    pub email: Option<EmailConfig>,
    pub nats_url: Option<String>,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone)]
pub struct JwtSettings {
    pub secret: SecretString,
    pub expiration_minutes: i64,
    pub issuer: String,
    pub audience: String,
}

#[derive(Debug, Clone)]
pub struct VnpayConfig {
    pub tmn_code: String,
    pub hash_secret: SecretString,
    pub payment_url: String,
    pub return_url: String,
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: SecretString,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
    pub from_address: String,
}

#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: SecretString,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a variable is malformed or a required one is missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_source(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = parse_or(&get, "HOST", IpAddr::from([0, 0, 0, 0]))?;
        let port = parse_or(&get, "PORT", DEFAULT_PORT)?;
        let database_url = get("DATABASE_URL").map(SecretString::from);
        let database_max_connections = parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10u32)?;

        let secret = match get("JWT_SECRET") {
            Some(secret) if secret.len() < MIN_JWT_SECRET_LENGTH => {
                return Err(ConfigError::InvalidEnvVar(
                    "JWT_SECRET".into(),
                    format!("must be at least {MIN_JWT_SECRET_LENGTH} characters"),
                ));
            }
            Some(secret) => secret,
            None if database_url.is_some() => return Err(ConfigError::MissingEnvVar("JWT_SECRET".into())),
            None => {
                tracing::warn!("JWT_SECRET not set, generating a temporary development secret");
                format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
            }
        };
        let jwt = JwtSettings {
            secret: SecretString::from(secret),
            expiration_minutes: parse_or(&get, "JWT_EXPIRATION_MINUTES", 1440i64)?,
            issuer: get("JWT_ISSUER").unwrap_or_else(|| "storefront-api".to_string()),
            audience: get("JWT_AUDIENCE").unwrap_or_else(|| "storefront-clients".to_string()),
        };

        let vnpay = match (get("VNPAY_TMN_CODE"), get("VNPAY_HASH_SECRET")) {
            (Some(tmn_code), Some(hash_secret)) => Some(VnpayConfig {
                tmn_code,
                hash_secret: SecretString::from(hash_secret),
                payment_url: get("VNPAY_URL").unwrap_or_else(|| DEFAULT_VNPAY_URL.to_string()),
                return_url: get("VNPAY_RETURN_URL").unwrap_or_else(|| DEFAULT_VNPAY_RETURN_URL.to_string()),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::MissingEnvVar("VNPAY_HASH_SECRET".into())),
            (None, Some(_)) => return Err(ConfigError::MissingEnvVar("VNPAY_TMN_CODE".into())),
        };

        let gemini = get("GEMINI_API_KEY").map(|key| GeminiConfig {
            api_key: SecretString::from(key),
            model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
        });

        let email = match get("SMTP_HOST") {
            Some(smtp_host) => Some(EmailConfig {
                smtp_host,
                smtp_port: parse_or(&get, "SMTP_PORT", 587u16)?,
                smtp_username: require(&get, "SMTP_USERNAME")?,
                smtp_password: SecretString::from(require(&get, "SMTP_PASSWORD")?),
                from_address: require(&get, "SMTP_FROM")?,
            }),
            None => None,
        };

        let bootstrap_admin = match (get("ADMIN_USERNAME"), get("ADMIN_EMAIL"), get("ADMIN_PASSWORD")) {
            (Some(username), Some(email), Some(password)) => {
                Some(BootstrapAdmin { username, email, password: SecretString::from(password) })
            }
            (None, None, None) => None,
            _ => {
                return Err(ConfigError::InvalidEnvVar(
                    "ADMIN_*".into(),
                    "ADMIN_USERNAME, ADMIN_EMAIL and ADMIN_PASSWORD must be set together".into(),
                ));
            }
        };

        Ok(Self {
            host,
            port,
            database_url,
            database_max_connections,
            jwt,
            vnpay,
            gemini,
            email,
            nats_url: get("NATS_URL"),
            bootstrap_admin,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr { SocketAddr::new(self.host, self.port) }
}

fn require(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        AppConfig::from_source(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_database() {
        let config = load(&[]).unwrap();
        assert_eq!(config.port, 8083);
        assert!(config.database_url.is_none());
        assert!(config.jwt.secret.expose_secret().len() >= MIN_JWT_SECRET_LENGTH);
        assert!(config.vnpay.is_none() && config.gemini.is_none() && config.email.is_none());
    }

    #[test]
    fn test_database_requires_jwt_secret() {
        let err = load(&[("DATABASE_URL", "postgres://localhost/shop")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "JWT_SECRET"));
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        assert!(matches!(load(&[("JWT_SECRET", "short")]), Err(ConfigError::InvalidEnvVar(..))));
    }

    #[test]
    fn test_invalid_port() {
        assert!(matches!(load(&[("PORT", "eighty")]), Err(ConfigError::InvalidEnvVar(..))));
    }

    #[test]
    fn test_vnpay_needs_both_values() {
        assert!(load(&[("VNPAY_TMN_CODE", "ABC")]).is_err());
        let config = load(&[("VNPAY_TMN_CODE", "ABC"), ("VNPAY_HASH_SECRET", "s3cr3t")]).unwrap();
        let vnpay = config.vnpay.unwrap();
        assert_eq!(vnpay.payment_url, DEFAULT_VNPAY_URL);
    }

    #[test]
    fn test_smtp_requires_credentials() {
        assert!(matches!(load(&[("SMTP_HOST", "smtp.example.com")]), Err(ConfigError::MissingEnvVar(_))));
    }
}
