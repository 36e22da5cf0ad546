//! Payment gateway callbacks and manual payment updates.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::aggregates::{OrderStatus, Payment, PaymentError, PaymentStatus};
use crate::error::{AppError, Result};
use crate::services::orders::{clear_cart, payment_of, send_confirmation};
use crate::services::vnpay::{VnpayError, SECURE_HASH};
use crate::state::AppState;
use crate::store::{Expected, StoreError};

/// VNPay merchant response codes.
pub mod rsp {
    pub const SUCCESS: &str = "00";
    pub const ORDER_NOT_FOUND: &str = "01";
    pub const ALREADY_CONFIRMED: &str = "02";
    pub const INVALID_AMOUNT: &str = "04";
    pub const INVALID_SIGNATURE: &str = "97";
    pub const UNKNOWN_ERROR: &str = "99";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackOutcome {
    pub code: &'static str,
    pub message: &'static str,
    /// Whether the customer's payment went through.
    pub success: bool,
    pub order_id: Option<Uuid>,
}

impl CallbackOutcome {
    fn reject(code: &'static str, message: &'static str, order_id: Option<Uuid>) -> Self {
        Self { code, message, success: false, order_id }
    }
}

impl From<StoreError> for CallbackOutcome {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) => {
                tracing::warn!(error = %e, "Payment callback kept losing to concurrent order updates");
                Self::reject(rsp::ALREADY_CONFIRMED, "Order already confirmed", None)
            }
            e => {
                tracing::error!(error = %e, "Store failure while processing payment callback");
                Self::reject(rsp::UNKNOWN_ERROR, "Unknown error", None)
            }
        }
    }
}

/// Why a callback stopped early.
enum Rejection {
    Reply(CallbackOutcome),
    Store(StoreError),
}

impl From<CallbackOutcome> for Rejection {
    fn from(outcome: CallbackOutcome) -> Self { Self::Reply(outcome) }
}

impl From<StoreError> for Rejection {
    fn from(e: StoreError) -> Self { Self::Store(e) }
}

/// A callback that lost a race with another order update is evaluated again
/// against the fresh state.
const CALLBACK_ATTEMPTS: u32 = 3;

/// Shared by the browser return and the server-to-server IPN. Checks run in
/// order: signature, order, amount, idempotency. Repeating a callback is a
/// no-op answered with `02`.
#[instrument(skip(state, params, now))]
pub async fn process_vnpay_callback(state: &AppState, params: &HashMap<String, String>, now: DateTime<Utc>) -> CallbackOutcome {
    let mut attempt = 1;
    loop {
        match handle_callback(state, params, now).await {
            Ok(outcome) | Err(Rejection::Reply(outcome)) => return outcome,
            Err(Rejection::Store(StoreError::Conflict(_))) if attempt < CALLBACK_ATTEMPTS => {
                tracing::debug!(attempt, "Order changed while processing VNPay callback, retrying");
                attempt += 1;
            }
            Err(Rejection::Store(e)) => return e.into(),
        }
    }
}

async fn handle_callback(
    state: &AppState,
    params: &HashMap<String, String>,
    now: DateTime<Utc>,
) -> std::result::Result<CallbackOutcome, Rejection> {
    let Some(vnpay) = state.vnpay() else {
        tracing::warn!("VNPay callback received but the gateway is not configured");
        return Err(CallbackOutcome::reject(rsp::UNKNOWN_ERROR, "Payment gateway not configured", None).into());
    };
    let callback = vnpay.verify_callback(params).map_err(|e| match e {
        VnpayError::InvalidSignature | VnpayError::MissingParam(SECURE_HASH) => {
            tracing::warn!(error = %e, "Rejected VNPay callback");
            CallbackOutcome::reject(rsp::INVALID_SIGNATURE, "Invalid signature", None)
        }
        other => {
            tracing::warn!(error = %other, "Malformed VNPay callback");
            CallbackOutcome::reject(rsp::UNKNOWN_ERROR, "Invalid request", None)
        }
    })?;

    let not_found = || CallbackOutcome::reject(rsp::ORDER_NOT_FOUND, "Order not found", None);
    let order_id = callback.order_id().ok_or_else(not_found)?;
    let store = state.store();
    let mut order = store.order_by_id(order_id).await?.ok_or_else(not_found)?;

    if callback.amount != order.total_amount {
        tracing::warn!(order_id = %order.id, expected = order.total_amount, got = callback.amount, "VNPay amount mismatch");
        return Err(CallbackOutcome::reject(rsp::INVALID_AMOUNT, "Invalid amount", Some(order.id)).into());
    }

    let (mut payment, expected) = payment_of(state, &order).await?;
    let already_confirmed = |payment: &Payment| CallbackOutcome {
        code: rsp::ALREADY_CONFIRMED,
        message: "Order already confirmed",
        success: payment.is_paid(),
        order_id: Some(order_id),
    };

    if order.status == OrderStatus::Cancelled && callback.is_success() {
        let captured = payment.capture_after_cancel(
            callback.transaction_no.clone(),
            callback.bank_code.clone(),
            Some(callback.response_code.clone()),
            callback.pay_date.unwrap_or(now),
        );
        if captured {
            store.save_payment(&payment, expected.payment).await?;
            tracing::warn!(order_id = %order.id, transaction_no = ?payment.transaction_no, "Payment captured for a cancelled order, refund pending");
        }
        return Err(already_confirmed(&payment).into());
    }
    if payment.is_paid() || order.status != OrderStatus::Pending {
        tracing::info!(order_id = %order.id, status = %order.status, "Duplicate VNPay callback ignored");
        return Err(already_confirmed(&payment).into());
    }

    if !callback.is_success() {
        payment.fail(Some(callback.response_code.clone()));
        store.save_payment(&payment, expected.payment).await?;
        tracing::info!(order_id = %order.id, code = %callback.response_code, "VNPay payment failed");
        return Ok(CallbackOutcome { code: rsp::SUCCESS, message: "Confirm Success", success: false, order_id: Some(order.id) });
    }

    payment.settle(
        callback.transaction_no.clone(),
        callback.bank_code.clone(),
        Some(callback.response_code.clone()),
        callback.pay_date.unwrap_or(now),
    );
    order.mark_paid(&payment).map_err(|_| CallbackOutcome::reject(rsp::ALREADY_CONFIRMED, "Order already confirmed", Some(order.id)))?;
    store.save_order(&order, Some(&payment), expected).await?;
    tracing::info!(order_id = %order.id, transaction_no = ?payment.transaction_no, "VNPay payment confirmed");

    clear_cart(state, order.user_id).await;
    send_confirmation(state, &order).await;
    state.events().publish_all(order.take_events()).await;

    Ok(CallbackOutcome { code: rsp::SUCCESS, message: "Confirm Success", success: true, order_id: Some(order.id) })
}

/// Manual update by payment staff. Marking a pending order's payment as
/// paid also moves the order to `paid`; marking a cancelled order's payment
/// as paid records it as `refund_pending`.
#[instrument(skip(state))]
pub async fn update_payment_status(state: &AppState, payment_id: Uuid, next: PaymentStatus) -> Result<Payment> {
    let store = state.store();
    let mut payment = store.payment_by_id(payment_id).await?.ok_or_else(|| AppError::not_found("Payment"))?;
    let mut order = store.order_by_id(payment.order_id).await?.ok_or_else(|| AppError::not_found("Order"))?;
    let expected = Expected::of(&order, Some(&payment));

    if next == PaymentStatus::Paid && order.status == OrderStatus::Cancelled {
        let (txn, bank, code) = (payment.transaction_no.clone(), payment.bank_code.clone(), payment.response_code.clone());
        if !payment.capture_after_cancel(txn, bank, code, Utc::now()) {
            return Err(PaymentError::InvalidTransition { from: payment.status, to: next }.into());
        }
    } else {
        payment.set_status(next)?;
    }

    if payment.is_paid() && order.status == OrderStatus::Pending {
        order.mark_paid(&payment)?;
        store.save_order(&order, Some(&payment), expected).await?;
        state.events().publish_all(order.take_events()).await;
    } else {
        store.save_payment(&payment, expected.payment).await?;
    }
    tracing::info!(payment_id = %payment.id, status = %payment.status, "Payment status updated");
    Ok(payment)
}
