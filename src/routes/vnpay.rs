//! VNPay redirect and callbacks.
//!
//! The return and IPN endpoints are public; trust comes from the signature.
//! Both answer with vendor response codes instead of HTTP errors.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::CurrentUser;
use crate::domain::aggregates::{OrderStatus, PaymentMethod};
use crate::error::{AppError, Result};
use crate::routes::{authenticated, ValidJson};
use crate::services::{orders, payments};
use crate::services::vnpay::PaymentRequest;
use crate::state::AppState;

const DEFAULT_CLIENT_IP: &str = "127.0.0.1";

pub fn router(state: &AppState) -> Router<AppState> {
    let create = Router::new().route("/api/vnpay/create_payment_url", post(create_payment_url));
    authenticated(create, state)
        .route("/api/vnpay/return", get(vnpay_return))
        .route("/api/vnpay/ipn", get(vnpay_ipn))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentUrlRequest {
    pub order_id: Uuid,
    #[validate(length(max = 20))]
    pub bank_code: Option<String>,
    #[validate(length(max = 5))]
    pub locale: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentUrlResponse {
    pub payment_url: String,
}

#[derive(Debug, Serialize)]
pub struct IpnResponse {
    #[serde(rename = "RspCode")]
    pub rsp_code: &'static str,
    #[serde(rename = "Message")]
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnResponse {
    pub success: bool,
    pub code: &'static str,
    pub message: &'static str,
    pub order_id: Option<Uuid>,
}

async fn create_payment_url(
    State(state): State<AppState>,
    user: CurrentUser,
    headers: HeaderMap,
    ValidJson(req): ValidJson<CreatePaymentUrlRequest>,
) -> Result<Json<PaymentUrlResponse>> {
    let vnpay = state.vnpay().ok_or_else(|| AppError::ServiceUnavailable("VNPay is not configured".into()))?;
    let order = orders::visible_order(&state, &user, req.order_id).await?;
    if !order.is_owned_by(user.id) {
        return Err(AppError::forbidden());
    }
    if order.payment_method != PaymentMethod::Vnpay {
        return Err(AppError::bad_request("Order is not paid with VNPay"));
    }
    if order.status != OrderStatus::Pending {
        return Err(AppError::bad_request(format!("Order is already {}", order.status)));
    }
    if state.store().payment_for_order(order.id).await?.is_some_and(|p| p.is_paid()) {
        return Err(AppError::bad_request("Order is already paid"));
    }

    let ip_addr = client_ip(&headers);
    let order_info = format!("Payment for order {}", order.id);
    let payment_url = vnpay.build_payment_url(&PaymentRequest {
        order_id: order.id,
        amount: order.total_amount,
        order_info: &order_info,
        ip_addr: &ip_addr,
        locale: req.locale.as_deref(),
        bank_code: req.bank_code.as_deref(),
        created_at: Utc::now(),
    });
    tracing::info!(order_id = %order.id, amount = order.total_amount, "VNPay payment URL created");
    Ok(Json(PaymentUrlResponse { payment_url }))
}

async fn vnpay_ipn(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Json<IpnResponse> {
    let outcome = payments::process_vnpay_callback(&state, &params, Utc::now()).await;
    Json(IpnResponse { rsp_code: outcome.code, message: outcome.message })
}

/// Browser redirect. Processed like the IPN so the order is settled even
/// when the IPN is delayed; a later IPN answers `02`.
async fn vnpay_return(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Json<ReturnResponse> {
    let outcome = payments::process_vnpay_callback(&state, &params, Utc::now()).await;
    Json(ReturnResponse { success: outcome.success, code: outcome.code, message: outcome.message, order_id: outcome.order_id })
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`.
fn client_ip(headers: &HeaderMap) -> String {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .or_else(|| header("x-real-ip"))
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(DEFAULT_CLIENT_IP)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "127.0.0.1");
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers), "10.0.0.2");
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ip(&headers), "203.0.113.7");
    }
}
