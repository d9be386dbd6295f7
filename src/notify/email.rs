//! Order confirmation emails over SMTP.
//!
//! [`SmtpEmailSender`] wraps the `lettre` async SMTP transport. Configuration
//! is read alongside the rest of the app config; without `SMTP_HOST`,
//! [`EmailConfig::from_lookup`] returns `None` and no sender is constructed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::EmailSender;
use crate::domain::aggregates::{Order, PaymentMethod, ShippingMethod};
use crate::domain::value_objects::EmailAddress;

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Email build error: {0}")]
    Build(String),
}

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_FROM_ADDRESS: &str = "rendeles@opensase.local";

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// | Variable        | Required | Default                    |
    /// |-----------------|----------|----------------------------|
    /// | `SMTP_HOST`     | yes      |                            |
    /// | `SMTP_PORT`     | no       | `587`                      |
    /// | `SMTP_FROM`     | no       | `rendeles@opensase.local`  |
    /// | `SMTP_USER`     | no       |                            |
    /// | `SMTP_PASSWORD` | no       |                            |
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let smtp_host = get("SMTP_HOST")?;
        Some(Self {
            smtp_host,
            smtp_port: get("SMTP_PORT").and_then(|p| p.parse().ok()).unwrap_or(DEFAULT_SMTP_PORT),
            from_address: get("SMTP_FROM").unwrap_or_else(|| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: get("SMTP_USER"),
            smtp_password: get("SMTP_PASSWORD"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: EmailAddress,
    pub subject: String,
    pub html: String,
}

pub struct SmtpEmailSender {
    config: EmailConfig,
}

impl SmtpEmailSender {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        use lettre::{
            message::header::ContentType, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
            AsyncTransport, Message, Tokio1Executor,
        };

        let message = Message::builder()
            .from(self.config.from_address.parse()?)
            .to(email.to.as_str().parse()?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone())
            .map_err(|e| EmailError::Build(e.to_string()))?;

        let mut transport_builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)?.port(self.config.smtp_port);
        if let (Some(user), Some(pass)) = (&self.config.smtp_user, &self.config.smtp_password) {
            transport_builder = transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        transport_builder.build().send(message).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Hungarian date order: `2026. 10. 18. 14:05`.
pub fn localized_date(at: DateTime<Utc>) -> String {
    at.format("%Y. %m. %d. %H:%M").to_string()
}

pub fn order_confirmation(to: &EmailAddress, order: &Order) -> OutgoingEmail {
    let pricing = order.pricing();
    let mut rows = String::new();
    for item in order.items() {
        let extra = item
            .customization
            .as_deref()
            .map(|c| format!("<br><small>{}</small>", escape(c)))
            .unwrap_or_default();
        rows.push_str(&format!(
            "<tr><td>{} ({}){}</td><td>{} x</td><td>{}</td></tr>",
            escape(&item.name),
            escape(&item.size),
            extra,
            item.quantity,
            item.line_total()
        ));
    }

    let shipping = order.shipping();
    let shipping_label = match pricing.shipping_method {
        ShippingMethod::Standard => "Standard shipping",
        ShippingMethod::Express => "Express shipping",
    };
    let mut summary = format!(
        "<tr><td colspan=\"2\">Subtotal</td><td>{}</td></tr><tr><td colspan=\"2\">{}</td><td>{}</td></tr>",
        pricing.subtotal, shipping_label, pricing.shipping_cost
    );
    if order.payment_method() == PaymentMethod::CashOnDelivery {
        summary.push_str(&format!("<tr><td colspan=\"2\">Cash on delivery fee</td><td>{}</td></tr>", pricing.cod_fee));
    }
    if pricing.discount.is_positive() {
        summary.push_str(&format!("<tr><td colspan=\"2\">Discount</td><td>-{}</td></tr>", pricing.discount));
    }
    summary.push_str(&format!("<tr><th colspan=\"2\">Total</th><th>{}</th></tr>", pricing.total));

    let html = format!(
        "<html><body>\
         <h1>Thank you for your order!</h1>\
         <p>Order number: <strong>{number}</strong><br>Date: {date}</p>\
         <table>{rows}{summary}</table>\
         <h2>Shipping address</h2><p>{name}<br>{address}</p>\
         </body></html>",
        number = escape(order.order_number().as_str()),
        date = localized_date(order.created_at()),
        name = escape(&shipping.name),
        address = escape(&shipping.address.to_string()),
    );

    OutgoingEmail {
        to: to.clone(),
        subject: format!("Order confirmation - {}", order.order_number()),
        html,
    }
}
