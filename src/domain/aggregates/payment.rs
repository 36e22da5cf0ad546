//! Payment record, one per order

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::order::Order;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub method: PaymentMethod,
    pub amount: i64,
    pub status: PaymentStatus,
    pub transaction_no: Option<String>,
    pub bank_code: Option<String>,
    pub response_code: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cod,
    Vnpay,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    RefundPending,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::RefundPending => "refund_pending",
            Self::Refunded => "refunded",
        }
    }

    /// Manual updates by payment staff.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Paid | Failed) | (Failed, Paid) | (Paid, RefundPending | Refunded) | (RefundPending, Refunded)
        )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl Payment {
    pub fn for_order(order: &Order) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), order_id: order.id, method: order.payment_method, amount: order.total_amount,
            status: PaymentStatus::Pending, transaction_no: None, bank_code: None, response_code: None,
            paid_at: None, created_at: now, updated_at: now,
        }
    }

    pub fn is_paid(&self) -> bool { self.status == PaymentStatus::Paid }

    pub fn settle(&mut self, transaction_no: Option<String>, bank_code: Option<String>, response_code: Option<String>, paid_at: DateTime<Utc>) {
        self.status = PaymentStatus::Paid;
        self.transaction_no = transaction_no;
        self.bank_code = bank_code;
        self.response_code = response_code;
        self.paid_at = Some(paid_at);
        self.touch();
    }

    pub fn fail(&mut self, response_code: Option<String>) {
        self.status = PaymentStatus::Failed;
        self.response_code = response_code;
        self.touch();
    }

    /// Money captured for an order that was already cancelled is recorded and
    /// owed back. Returns false when the payment already carries a capture.
    pub fn capture_after_cancel(
        &mut self,
        transaction_no: Option<String>,
        bank_code: Option<String>,
        response_code: Option<String>,
        paid_at: DateTime<Utc>,
    ) -> bool {
        if !matches!(self.status, PaymentStatus::Pending | PaymentStatus::Failed) { return false; }
        self.settle(transaction_no, bank_code, response_code, paid_at);
        self.status = PaymentStatus::RefundPending;
        true
    }

    /// Applied when the order is cancelled. Returns true when money must be refunded.
    pub fn flag_cancelled(&mut self) -> bool {
        match self.status {
            PaymentStatus::Paid => { self.status = PaymentStatus::RefundPending; self.touch(); true }
            PaymentStatus::Pending => { self.status = PaymentStatus::Failed; self.touch(); false }
            _ => false,
        }
    }

    pub fn set_status(&mut self, next: PaymentStatus) -> Result<(), PaymentError> {
        if !self.status.can_transition_to(next) {
            return Err(PaymentError::InvalidTransition { from: self.status, to: next });
        }
        if next == PaymentStatus::Paid && self.paid_at.is_none() { self.paid_at = Some(Utc::now()); }
        self.status = next;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    #[error("cannot move payment from {from} to {to}")]
    InvalidTransition { from: PaymentStatus, to: PaymentStatus },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::{OrderLine, ShippingAddress};

    fn payment() -> Payment {
        let line = OrderLine { product_id: Uuid::now_v7(), product_name: "Tea".into(), quantity: 3, price: 20_000 };
        let order = Order::place(Uuid::now_v7(), vec![line], ShippingAddress::default(), PaymentMethod::Vnpay).unwrap();
        Payment::for_order(&order)
    }

    #[test]
    fn test_for_order_copies_amount_and_method() {
        let p = payment();
        assert_eq!(p.amount, 60_000);
        assert_eq!(p.method, PaymentMethod::Vnpay);
        assert_eq!(p.status, PaymentStatus::Pending);
    }

    #[test]
    fn test_manual_transitions() {
        let mut p = payment();
        assert!(p.set_status(PaymentStatus::Refunded).is_err());
        p.set_status(PaymentStatus::Paid).unwrap();
        assert!(p.paid_at.is_some());
        p.set_status(PaymentStatus::Refunded).unwrap();
        assert!(p.set_status(PaymentStatus::Paid).is_err());
    }

    #[test]
    fn test_capture_after_cancel_flags_refund() {
        let mut p = payment();
        p.flag_cancelled();
        assert!(p.capture_after_cancel(Some("14000001".into()), Some("NCB".into()), Some("00".into()), Utc::now()));
        assert_eq!(p.status, PaymentStatus::RefundPending);
        assert_eq!(p.transaction_no.as_deref(), Some("14000001"));
        assert!(p.paid_at.is_some());
        // a repeated capture leaves the recorded one alone
        assert!(!p.capture_after_cancel(Some("2".into()), None, None, Utc::now()));
        assert_eq!(p.transaction_no.as_deref(), Some("14000001"));
    }

    #[test]
    fn test_flag_cancelled() {
        let mut p = payment();
        assert!(!p.flag_cancelled());
        assert_eq!(p.status, PaymentStatus::Failed);

        let mut p = payment();
        p.settle(Some("1".into()), Some("NCB".into()), Some("00".into()), Utc::now());
        assert!(p.flag_cancelled());
        assert_eq!(p.status, PaymentStatus::RefundPending);
    }
}
