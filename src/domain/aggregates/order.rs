//! Order Aggregate

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::payment::{Payment, PaymentMethod};
use crate::domain::events::{DomainEvent, OrderEvent};

/// Customers may cancel their own orders for this long after placing them.
pub const CANCELLATION_WINDOW_HOURS: i64 = 24;

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(json)]
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub total_amount: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub items: Vec<OrderItem>,
    #[sqlx(skip)]
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub price: i64,
}

impl OrderItem {
    pub fn line_total(&self) -> i64 { self.price * i64::from(self.quantity) }
}

/// A priced line ready to be placed; prices come from the catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub price: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[validate(length(min = 1, max = 100, message = "full name is required"))]
    pub full_name: String,
    #[validate(length(min = 8, max = 20, message = "phone must be 8-20 characters"))]
    pub phone: String,
    #[validate(length(min = 1, max = 200, message = "street is required"))]
    pub street: String,
    #[validate(length(min = 1, max = 100, message = "city is required"))]
    pub city: String,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Shipped,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Staff-driven transitions; cancellation also restores stock.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Paid | Shipped | Cancelled) | (Paid, Shipped | Cancelled) | (Shipped, Completed)
        )
    }

    pub fn is_terminal(self) -> bool { matches!(self, Self::Completed | Self::Cancelled) }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl std::str::FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "shipped" => Ok(Self::Shipped),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

impl Order {
    pub fn place(user_id: Uuid, lines: Vec<OrderLine>, shipping_address: ShippingAddress, payment_method: PaymentMethod) -> Result<Self, OrderError> {
        if lines.is_empty() { return Err(OrderError::NoItems); }
        let id = Uuid::now_v7();
        let now = Utc::now();
        let mut total: i64 = 0;
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            if line.quantity < 1 { return Err(OrderError::InvalidQuantity(line.product_id)); }
            let line_total = line.price.checked_mul(i64::from(line.quantity)).ok_or(OrderError::AmountOverflow)?;
            total = total.checked_add(line_total).ok_or(OrderError::AmountOverflow)?;
            items.push(OrderItem {
                id: Uuid::now_v7(), order_id: id, product_id: line.product_id,
                product_name: line.product_name, quantity: line.quantity, price: line.price,
            });
        }
        let mut order = Self {
            id, user_id, shipping_address, payment_method, status: OrderStatus::Pending,
            total_amount: total, created_at: now, updated_at: now, items, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed { order_id: id, user_id, total, method: payment_method }));
        Ok(order)
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool { self.user_id == user_id }

    /// Marks the order paid after the gateway (or staff) confirmed payment.
    pub fn mark_paid(&mut self, payment: &Payment) -> Result<(), OrderError> {
        if self.status != OrderStatus::Pending { return Err(OrderError::InvalidTransition { from: self.status, to: OrderStatus::Paid }); }
        self.status = OrderStatus::Paid;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Paid { order_id: self.id, transaction_no: payment.transaction_no.clone() }));
        Ok(())
    }

    /// Cancels the order and flags the payment. With `enforce_window` the
    /// 24-hour customer limit applies.
    pub fn cancel(&mut self, payment: &mut Payment, now: DateTime<Utc>, enforce_window: bool) -> Result<(), OrderError> {
        match self.status {
            OrderStatus::Cancelled => return Err(OrderError::AlreadyCancelled),
            OrderStatus::Shipped | OrderStatus::Completed => return Err(OrderError::CannotCancel(self.status)),
            OrderStatus::Pending | OrderStatus::Paid => {}
        }
        if enforce_window && now - self.created_at >= Duration::hours(CANCELLATION_WINDOW_HOURS) {
            return Err(OrderError::CancellationWindowExpired);
        }
        self.status = OrderStatus::Cancelled;
        self.touch();
        let refund_pending = payment.flag_cancelled();
        self.raise_event(DomainEvent::Order(OrderEvent::Cancelled { order_id: self.id, refund_pending }));
        Ok(())
    }

    /// Staff transition other than cancellation. Returns the previous status.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<OrderStatus, OrderError> {
        let from = self.status;
        if next == OrderStatus::Cancelled || !from.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from, to: next });
        }
        self.status = next;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from, to: next }));
        Ok(from)
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("order must contain at least one item")]
    NoItems,
    #[error("quantity for product {0} must be at least 1")]
    InvalidQuantity(Uuid),
    #[error("order total is too large")]
    AmountOverflow,
    #[error("order is already cancelled")]
    AlreadyCancelled,
    #[error("order cannot be cancelled once {0}")]
    CannotCancel(OrderStatus),
    #[error("orders can only be cancelled within 24 hours of placing them")]
    CancellationWindowExpired,
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("unknown order status: {0}")]
    UnknownStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::payment::PaymentStatus;

    fn line(qty: i32, price: i64) -> OrderLine {
        OrderLine { product_id: Uuid::now_v7(), product_name: "Widget".into(), quantity: qty, price }
    }

    fn placed() -> (Order, Payment) {
        let order = Order::place(Uuid::now_v7(), vec![line(2, 1000), line(1, 500)], ShippingAddress::default(), PaymentMethod::Cod).unwrap();
        let payment = Payment::for_order(&order);
        (order, payment)
    }

    #[test]
    fn test_place_computes_total() {
        let (mut order, _) = placed();
        assert_eq!(order.total_amount, 2500);
        assert_eq!(order.items.len(), 2);
        assert!(order.items.iter().all(|i| i.order_id == order.id));
        assert!(matches!(order.take_events().as_slice(), [DomainEvent::Order(OrderEvent::Placed { total: 2500, .. })]));
    }

    #[test]
    fn test_place_rejects_empty_and_zero_quantity() {
        let addr = ShippingAddress::default();
        assert_eq!(Order::place(Uuid::now_v7(), vec![], addr.clone(), PaymentMethod::Cod).unwrap_err(), OrderError::NoItems);
        let bad = line(0, 10);
        let id = bad.product_id;
        assert_eq!(Order::place(Uuid::now_v7(), vec![bad], addr, PaymentMethod::Cod).unwrap_err(), OrderError::InvalidQuantity(id));
    }

    #[test]
    fn test_cancel_within_window() {
        let (mut order, mut payment) = placed();
        order.cancel(&mut payment, Utc::now() + Duration::hours(23), true).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(order.cancel(&mut payment, Utc::now(), true), Err(OrderError::AlreadyCancelled));
    }

    #[test]
    fn test_cancel_after_window_rejected() {
        let (mut order, mut payment) = placed();
        let later = order.created_at + Duration::hours(CANCELLATION_WINDOW_HOURS) + Duration::minutes(1);
        assert_eq!(order.cancel(&mut payment, later, true), Err(OrderError::CancellationWindowExpired));
        assert_eq!(order.status, OrderStatus::Pending);
        // staff are not bound by the window
        order.cancel(&mut payment, later, false).unwrap();
    }

    #[test]
    fn test_cancel_paid_order_flags_refund() {
        let (mut order, mut payment) = placed();
        payment.settle(Some("TXN1".into()), None, Some("00".into()), Utc::now());
        order.mark_paid(&payment).unwrap();
        order.cancel(&mut payment, Utc::now(), true).unwrap();
        assert_eq!(payment.status, PaymentStatus::RefundPending);
    }

    #[test]
    fn test_shipped_order_cannot_be_cancelled() {
        let (mut order, mut payment) = placed();
        order.transition_to(OrderStatus::Shipped).unwrap();
        assert_eq!(order.cancel(&mut payment, Utc::now(), false), Err(OrderError::CannotCancel(OrderStatus::Shipped)));
    }

    #[test]
    fn test_transitions() {
        let (mut order, _) = placed();
        assert!(order.transition_to(OrderStatus::Completed).is_err());
        assert_eq!(order.transition_to(OrderStatus::Shipped), Ok(OrderStatus::Pending));
        assert_eq!(order.transition_to(OrderStatus::Completed), Ok(OrderStatus::Shipped));
        assert!(order.status.is_terminal());
        assert!(order.transition_to(OrderStatus::Shipped).is_err());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Shipped".parse::<OrderStatus>(), Ok(OrderStatus::Shipped));
        assert!("lost".parse::<OrderStatus>().is_err());
    }
}
