//! Authentication middleware and the `CurrentUser` extractor.

use std::future::Future;
use std::pin::Pin;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::auth::{CurrentUser, JwtService};
use crate::error::AppError;
use crate::state::AppState;

/// Requires a valid bearer token and stores the caller in request extensions.
///
/// | Failure | Status |
/// |---------|--------|
/// | missing or malformed header | 401 |
/// | expired or invalid token | 401 |
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, AppError> {
    let user = authenticate(&state, req.headers().get(AUTHORIZATION).and_then(|h| h.to_str().ok()))?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Requires `permission` on top of [`require_auth`]. Layer it inside the auth layer:
///
/// ```ignore
/// Router::new()
///     .route("/api/orders", get(list_orders))
///     .route_layer(middleware::from_fn(require_permission(permissions::ORDERS_MANAGE)))
///     .route_layer(middleware::from_fn_with_state(state, require_auth));
/// ```
pub fn require_permission(
    permission: &'static str,
) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Result<Response, AppError>> + Send>> + Clone {
    move |req: Request, next: Next| {
        Box::pin(async move {
            let user = req.extensions().get::<CurrentUser>().ok_or_else(AppError::unauthorized)?;
            if !user.has_permission(permission) {
                tracing::warn!(user_id = %user.id, username = %user.username, permission, "Permission denied");
                return Err(AppError::forbidden());
            }
            Ok(next.run(req).await)
        })
    }
}

fn authenticate(state: &AppState, header: Option<&str>) -> Result<CurrentUser, AppError> {
    let header = header.ok_or_else(AppError::unauthorized)?;
    let token = JwtService::extract_from_header(header)
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization header".into()))?;
    let claims = state.jwt().validate_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Token rejected");
        e
    })?;
    Ok(CurrentUser::try_from(claims)?)
}

/// Uses the caller stored by [`require_auth`] when present, otherwise
/// validates the bearer token itself.
#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }
        let user = authenticate(state, parts.headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok()))?;
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

/// The caller if a valid token was sent, `None` for anonymous requests.
/// A token that is present but invalid is still rejected.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<CurrentUser>);

#[axum::async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Ok(Self(None));
        }
        CurrentUser::from_request_parts(parts, state).await.map(|u| Self(Some(u)))
    }
}

