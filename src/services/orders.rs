//! Order workflow: placement, cancellation and staff status changes.
//!
//! Stock moves only through [`crate::store::OrderStore::place_order`] and
//! [`crate::store::OrderStore::cancel_order`], which are atomic in every
//! store. Writes carry the statuses they were computed from; a request that
//! lost a race fails with 409 and writes nothing.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::auth::{permissions, CurrentUser};
use crate::domain::aggregates::{Order, OrderLine, OrderStatus, Payment, PaymentMethod, ShippingAddress};
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::store::{Expected, StoreResult};

/// A requested line. `price`, when sent, must match the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub items: Vec<RequestedLine>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
}

/// Sums quantities of repeated products, keeping first-seen order.
pub fn merge_lines(items: Vec<RequestedLine>) -> Vec<RequestedLine> {
    let mut merged: Vec<RequestedLine> = Vec::with_capacity(items.len());
    let mut index: HashMap<Uuid, usize> = HashMap::new();
    for item in items {
        match index.get(&item.product_id).copied() {
            Some(i) => {
                let line = &mut merged[i];
                line.quantity = line.quantity.saturating_add(item.quantity);
                line.price = line.price.or(item.price);
            }
            None => {
                index.insert(item.product_id, merged.len());
                merged.push(item);
            }
        }
    }
    merged
}

#[instrument(skip(state, input), fields(user_id = %user.id, method = ?input.payment_method))]
pub async fn place_order(state: &AppState, user: &CurrentUser, input: NewOrder) -> Result<Order> {
    let items = merge_lines(input.items);
    if items.is_empty() {
        return Err(AppError::bad_request("Order must contain at least one item"));
    }
    if let Some(bad) = items.iter().find(|i| i.quantity < 1) {
        return Err(AppError::bad_request(format!("Quantity for product {} must be at least 1", bad.product_id)));
    }

    let store = state.store();
    let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let products: HashMap<Uuid, _> = store.products_by_ids(&ids).await?.into_iter().map(|p| (p.id, p)).collect();

    let mut lines = Vec::with_capacity(items.len());
    for item in &items {
        let product = products
            .get(&item.product_id)
            .ok_or_else(|| AppError::not_found(format!("Product {}", item.product_id)))?;
        if let Some(price) = item.price {
            if price != product.price {
                return Err(AppError::bad_request(format!(
                    "Price changed for {}: current price is {}",
                    product.name, product.price
                )));
            }
        }
        product.ensure_available(item.quantity)?;
        lines.push(OrderLine {
            product_id: product.id,
            product_name: product.name.clone(),
            quantity: item.quantity,
            price: product.price,
        });
    }

    let mut order = Order::place(user.id, lines, input.shipping_address, input.payment_method)?;
    let payment = Payment::for_order(&order);
    store.place_order(&order, &payment).await?;
    tracing::info!(order_id = %order.id, total = order.total_amount, "Order placed");

    if order.payment_method == PaymentMethod::Cod {
        clear_cart(state, user.id).await;
        send_confirmation(state, &order).await;
    }
    state.events().publish_all(order.take_events()).await;
    Ok(order)
}

/// Loads an order the caller may see: the owner or holders of `orders:manage`.
pub async fn visible_order(state: &AppState, user: &CurrentUser, order_id: Uuid) -> Result<Order> {
    let order = state.store().order_by_id(order_id).await?.ok_or_else(|| AppError::not_found("Order"))?;
    if !user.can_access(order.user_id, permissions::ORDERS_MANAGE) {
        return Err(AppError::forbidden());
    }
    Ok(order)
}

/// Customers may cancel their own orders within the cancellation window;
/// staff with `orders:manage` may cancel any order at any time before shipping.
#[instrument(skip(state, now), fields(user_id = %user.id))]
pub async fn cancel_order(state: &AppState, user: &CurrentUser, order_id: Uuid, now: DateTime<Utc>) -> Result<Order> {
    let order = visible_order(state, user, order_id).await?;
    let enforce_window = !user.has_permission(permissions::ORDERS_MANAGE);
    cancel(state, order, now, enforce_window).await
}

async fn cancel(state: &AppState, mut order: Order, now: DateTime<Utc>, enforce_window: bool) -> Result<Order> {
    let (mut payment, expected) = payment_of(state, &order).await?;
    order.cancel(&mut payment, now, enforce_window)?;
    state.store().cancel_order(&order, &payment, expected).await?;
    tracing::info!(order_id = %order.id, payment_status = %payment.status, "Order cancelled, stock restored");
    state.events().publish_all(order.take_events()).await;
    Ok(order)
}

/// Staff status change. Cancelling restores stock; completing a cash on
/// delivery order settles its payment.
#[instrument(skip(state, now), fields(user_id = %user.id))]
pub async fn update_status(
    state: &AppState,
    user: &CurrentUser,
    order_id: Uuid,
    next: OrderStatus,
    now: DateTime<Utc>,
) -> Result<Order> {
    let store = state.store();
    let mut order = store.order_by_id(order_id).await?.ok_or_else(|| AppError::not_found("Order"))?;
    if next == OrderStatus::Cancelled {
        return cancel(state, order, now, false).await;
    }

    let mut payment = store.payment_for_order(order.id).await?;
    let expected = Expected::of(&order, payment.as_ref());
    let previous = order.transition_to(next)?;
    let settles = next == OrderStatus::Paid || (next == OrderStatus::Completed && order.payment_method == PaymentMethod::Cod);
    if settles {
        if let Some(payment) = payment.as_mut().filter(|p| !p.is_paid()) {
            let (txn, bank, code) = (payment.transaction_no.clone(), payment.bank_code.clone(), payment.response_code.clone());
            payment.settle(txn, bank, code, now);
        }
    }
    store.save_order(&order, payment.as_ref(), expected).await?;
    tracing::info!(order_id = %order.id, from = %previous, to = %next, "Order status updated");
    state.events().publish_all(order.take_events()).await;
    Ok(order)
}

/// The order's payment, or a fresh one when none is stored, plus the
/// statuses both were read with. Read before mutating either.
pub(crate) async fn payment_of(state: &AppState, order: &Order) -> StoreResult<(Payment, Expected)> {
    let stored = state.store().payment_for_order(order.id).await?;
    let expected = Expected::of(order, stored.as_ref());
    Ok((stored.unwrap_or_else(|| Payment::for_order(order)), expected))
}

/// Best effort; the order is already committed.
pub(crate) async fn clear_cart(state: &AppState, user_id: Uuid) {
    if let Err(e) = state.store().clear_cart(user_id).await {
        tracing::warn!(error = %e, user_id = %user_id, "Failed to clear cart");
    }
}

pub(crate) async fn send_confirmation(state: &AppState, order: &Order) {
    if !state.notifier().is_enabled() { return; }
    match state.store().user_by_id(order.user_id).await {
        Ok(Some(user)) => {
            let name = user.full_name.clone().unwrap_or_else(|| order.shipping_address.full_name.clone());
            state.notifier().order_confirmation(user.email, name, order.clone());
        }
        Ok(None) => tracing::warn!(order_id = %order.id, "Order owner not found, skipping confirmation"),
        Err(e) => tracing::warn!(error = %e, order_id = %order.id, "Failed to load order owner"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product_id: Uuid, quantity: i32, price: Option<i64>) -> RequestedLine {
        RequestedLine { product_id, quantity, price }
    }

    #[test]
    fn test_merge_lines() {
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let merged = merge_lines(vec![line(a, 1, None), line(b, 2, Some(5)), line(a, 3, Some(7))]);
        assert_eq!(merged, vec![line(a, 4, Some(7)), line(b, 2, Some(5))]);
    }

    #[test]
    fn test_merge_keeps_first_price() {
        let a = Uuid::now_v7();
        assert_eq!(merge_lines(vec![line(a, 1, Some(10)), line(a, 1, Some(12))]), vec![line(a, 2, Some(10))]);
    }
}
