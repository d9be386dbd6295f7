//! Stripe Checkout gateway.
//!
//! Sessions are created with a form-encoded POST to `/v1/checkout/sessions`.
//! Stripe treats HUF as a two-decimal currency, so every forint amount is
//! sent multiplied by 100 (see [`Money::to_provider_minor`]).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{CheckoutSessionRequest, GatewayError, PaymentGateway, SessionHandle};
use crate::domain::value_objects::{Money, CURRENCY};

/// Default timeout for a single provider call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    /// `https://api.stripe.com` unless pointed at a mock.
    pub api_base: String,
    pub timeout: Duration,
}

impl fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

pub struct StripeGateway {
    client: reqwest::Client,
    config: StripeConfig,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn sessions_url(&self) -> String {
        format!("{}/v1/checkout/sessions", self.config.api_base.trim_end_matches('/'))
    }
}

fn minor(amount: Money) -> String {
    amount.to_provider_minor().to_string()
}

/// Flattens a session request into Stripe's bracketed form fields.
pub fn encode_session(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let currency = CURRENCY.to_lowercase();
    let mut form: Vec<(String, String)> = vec![
        ("mode".into(), "payment".into()),
        ("payment_method_types[0]".into(), "card".into()),
        ("billing_address_collection".into(), "required".into()),
        ("phone_number_collection[enabled]".into(), "true".into()),
        ("success_url".into(), request.success_url.clone()),
        ("cancel_url".into(), request.cancel_url.clone()),
    ];

    for (i, item) in request.line_items.iter().enumerate() {
        let p = format!("line_items[{i}]");
        form.push((format!("{p}[quantity]"), item.quantity.to_string()));
        form.push((format!("{p}[price_data][currency]"), currency.clone()));
        form.push((format!("{p}[price_data][unit_amount]"), minor(item.unit_amount)));
        form.push((format!("{p}[price_data][product_data][name]"), item.name.clone()));
        if !item.size.is_empty() {
            form.push((format!("{p}[price_data][product_data][metadata][size]"), item.size.clone()));
        }
        if let Some(text) = item.customization.as_deref().filter(|t| !t.is_empty()) {
            form.push((format!("{p}[price_data][product_data][metadata][customization]"), text.to_string()));
        }
        // Stripe only fetches absolute image URLs.
        if let Some(image) = item.image.as_deref().filter(|u| u.starts_with("https://")) {
            form.push((format!("{p}[price_data][product_data][images][0]"), image.to_string()));
        }
    }

    for (i, country) in request.allowed_countries.iter().enumerate() {
        form.push((format!("shipping_address_collection[allowed_countries][{i}]"), country.clone()));
    }

    for (i, option) in request.shipping_options.iter().enumerate() {
        let p = format!("shipping_options[{i}][shipping_rate_data]");
        form.push((format!("{p}[type]"), "fixed_amount".into()));
        form.push((format!("{p}[fixed_amount][amount]"), minor(option.amount)));
        form.push((format!("{p}[fixed_amount][currency]"), currency.clone()));
        form.push((format!("{p}[display_name]"), option.display_name.clone()));
        form.push((format!("{p}[delivery_estimate][minimum][unit]"), "business_day".into()));
        form.push((format!("{p}[delivery_estimate][minimum][value]"), option.min_business_days.to_string()));
        form.push((format!("{p}[delivery_estimate][maximum][unit]"), "business_day".into()));
        form.push((format!("{p}[delivery_estimate][maximum][value]"), option.max_business_days.to_string()));
    }

    for (key, value) in &request.metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
    }

    if let Some(coupon) = &request.coupon {
        form.push(("discounts[0][coupon]".into(), coupon.clone()));
    }

    form
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_session(&self, request: &CheckoutSessionRequest) -> Result<SessionHandle, GatewayError> {
        let response = self
            .client
            .post(self.sessions_url())
            .bearer_auth(&self.config.secret_key)
            .form(&encode_session(request))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let envelope: Option<ErrorEnvelope> = serde_json::from_str(&body).ok();
            let (message, kind) = envelope
                .map(|e| (e.error.message, e.error.kind))
                .unwrap_or((None, None));
            tracing::warn!(status = status.as_u16(), kind = kind.as_deref().unwrap_or("unknown"), "Checkout session rejected");
            return Err(GatewayError::Rejected(
                message.unwrap_or_else(|| format!("payment provider returned HTTP {}", status.as_u16())),
            ));
        }

        let session: SessionResponse =
            serde_json::from_str(&body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        tracing::info!(session_id = %session.id, "Checkout session created");
        Ok(SessionHandle { session_id: session.id, url: session.url })
    }
}
