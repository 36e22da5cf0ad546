//! Domain events
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{OrderStatus, PaymentMethod};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, user_id: Uuid, total: i64, method: PaymentMethod },
    Paid { order_id: Uuid, transaction_no: Option<String> },
    Cancelled { order_id: Uuid, refund_pending: bool },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Order(OrderEvent::Placed { .. }) => "storefront.order.placed",
            Self::Order(OrderEvent::Paid { .. }) => "storefront.order.paid",
            Self::Order(OrderEvent::Cancelled { .. }) => "storefront.order.cancelled",
            Self::Order(OrderEvent::StatusChanged { .. }) => "storefront.order.status",
        }
    }
}
