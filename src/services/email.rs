//! Transactional email over SMTP with Askama templates.
//!
//! Mail is sent on a spawned task; failures are logged and never reach the
//! request that triggered them.

use askama::Template;
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::{authentication::Credentials, Error as SmtpError},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::EmailConfig;
use crate::domain::aggregates::{Order, PaymentMethod};

#[derive(Template)]
#[template(path = "email/welcome.html")]
struct WelcomeEmailHtml<'a> {
    name: &'a str,
}

#[derive(Template)]
#[template(path = "email/welcome.txt")]
struct WelcomeEmailText<'a> {
    name: &'a str,
}

/// One rendered order line.
pub struct LineView {
    pub name: String,
    pub quantity: i32,
    pub price: String,
    pub total: String,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    name: &'a str,
    order_id: &'a str,
    lines: &'a [LineView],
    total: &'a str,
    payment: &'a str,
    address: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    name: &'a str,
    order_id: &'a str,
    lines: &'a [LineView],
    total: &'a str,
    payment: &'a str,
    address: &'a str,
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl EmailService {
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials =
            Credentials::new(config.smtp_username.clone(), config.smtp_password.expose_secret().to_string());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();
        Ok(Self { mailer, from_address: config.from_address.clone() })
    }

    pub async fn send_welcome(&self, to: &str, name: &str) -> Result<(), EmailError> {
        let html = WelcomeEmailHtml { name }.render()?;
        let text = WelcomeEmailText { name }.render()?;
        self.send_multipart(to, "Welcome to our store", &text, &html).await
    }

    pub async fn send_order_confirmation(&self, to: &str, name: &str, order: &Order) -> Result<(), EmailError> {
        let lines: Vec<LineView> = order
            .items
            .iter()
            .map(|i| LineView {
                name: i.product_name.clone(),
                quantity: i.quantity,
                price: format_vnd(i.price),
                total: format_vnd(i.line_total()),
            })
            .collect();
        let order_id = order.id.to_string();
        let total = format_vnd(order.total_amount);
        let payment = payment_label(order.payment_method);
        let a = &order.shipping_address;
        let address = format!("{}, {}, {} ({})", a.full_name, a.street, a.city, a.phone);

        let html = OrderConfirmationHtml {
            name, order_id: &order_id, lines: &lines, total: &total, payment, address: &address,
        }
        .render()?;
        let text = OrderConfirmationText {
            name, order_id: &order_id, lines: &lines, total: &total, payment, address: &address,
        }
        .render()?;
        let subject = format!("Order confirmation #{}", short_id(&order_id));
        self.send_multipart(to, &subject, &text, &html).await
    }

    async fn send_multipart(&self, to: &str, subject: &str, text_body: &str, html_body: &str) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(self.from_address.parse().map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?)
            .to(to.parse().map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_PLAIN).body(text_body.to_string()))
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_HTML).body(html_body.to_string())),
            )?;
        self.mailer.send(email).await?;
        Ok(())
    }
}

/// Fire-and-forget front of [`EmailService`]. A no-op when SMTP is not configured.
#[derive(Clone, Default)]
pub struct Notifier {
    email: Option<EmailService>,
}

impl Notifier {
    pub fn new(email: Option<EmailService>) -> Self { Self { email } }

    pub fn is_enabled(&self) -> bool { self.email.is_some() }

    pub fn welcome(&self, to: String, name: String) {
        let Some(email) = self.email.clone() else {
            tracing::debug!(to = %to, "SMTP not configured, skipping welcome email");
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = email.send_welcome(&to, &name).await {
                tracing::warn!(error = %e, to = %to, "Failed to send welcome email");
            }
        });
    }

    pub fn order_confirmation(&self, to: String, name: String, order: Order) {
        let Some(email) = self.email.clone() else {
            tracing::debug!(order_id = %order.id, "SMTP not configured, skipping order confirmation");
            return;
        };
        tokio::spawn(async move {
            match email.send_order_confirmation(&to, &name, &order).await {
                Ok(()) => tracing::info!(order_id = %order.id, "Order confirmation sent"),
                Err(e) => tracing::warn!(error = %e, order_id = %order.id, "Failed to send order confirmation"),
            }
        });
    }
}

/// `1234567` -> `1.234.567 ₫`
pub fn format_vnd(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 { grouped.push('.'); }
        grouped.push(c);
    }
    let sign = if amount < 0 { "-" } else { "" };
    format!("{sign}{grouped} ₫")
}

fn payment_label(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Cod => "Cash on delivery",
        PaymentMethod::Vnpay => "VNPay",
    }
}

fn short_id(id: &str) -> &str { id.get(id.len().saturating_sub(8)..).unwrap_or(id) }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{OrderLine, ShippingAddress};
    use uuid::Uuid;

    #[test]
    fn test_format_vnd() {
        assert_eq!(format_vnd(0), "0 ₫");
        assert_eq!(format_vnd(999), "999 ₫");
        assert_eq!(format_vnd(1000), "1.000 ₫");
        assert_eq!(format_vnd(1_234_567), "1.234.567 ₫");
        assert_eq!(format_vnd(-50_000), "-50.000 ₫");
    }

    #[test]
    fn test_order_confirmation_renders_lines() {
        let line = OrderLine { product_id: Uuid::now_v7(), product_name: "Ca phe sua".into(), quantity: 2, price: 25_000 };
        let address = ShippingAddress {
            full_name: "Nguyen Van A".into(), phone: "0901234567".into(), street: "1 Le Loi".into(),
            city: "Ho Chi Minh".into(), note: None,
        };
        let order = Order::place(Uuid::now_v7(), vec![line], address, PaymentMethod::Cod).unwrap();
        let lines = vec![LineView { name: "Ca phe sua".into(), quantity: 2, price: format_vnd(25_000), total: format_vnd(50_000) }];
        let order_id = order.id.to_string();

        let text = OrderConfirmationText {
            name: "A", order_id: &order_id, lines: &lines, total: "50.000 ₫", payment: payment_label(order.payment_method), address: "x",
        }
        .render()
        .unwrap();
        assert!(text.contains("Ca phe sua x 2"));
        assert!(text.contains("50.000 ₫"));
        assert!(text.contains("Cash on delivery"));
    }

    #[test]
    fn test_disabled_notifier_is_noop() {
        let notifier = Notifier::default();
        assert!(!notifier.is_enabled());
        notifier.welcome("a@example.com".into(), "A".into());
    }
}
