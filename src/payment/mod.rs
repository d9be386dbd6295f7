//! Bridge to the hosted payment page provider.
//!
//! [`PaymentGateway`] creates checkout sessions; [`webhook`] verifies and
//! decodes the provider's signed completion callbacks. Amounts cross this
//! boundary as [`Money`] and are converted to the provider's minor unit
//! inside the concrete gateway only.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::aggregates::ShippingMethod;
use crate::domain::value_objects::Money;

pub mod stripe;
pub mod webhook;

pub use stripe::StripeGateway;
pub use webhook::{CallbackEvent, CheckoutSession, VerificationError};

/// Maximum length of a single metadata value accepted by the provider.
pub const METADATA_VALUE_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionLineItem {
    pub name: String,
    pub size: String,
    pub unit_amount: Money,
    pub quantity: u32,
    pub image: Option<String>,
    pub customization: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShippingOption {
    pub method: ShippingMethod,
    pub amount: Money,
    pub display_name: String,
    pub min_business_days: u32,
    pub max_business_days: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSessionRequest {
    pub line_items: Vec<SessionLineItem>,
    pub shipping_options: Vec<ShippingOption>,
    pub allowed_countries: Vec<String>,
    /// May contain the literal `{CHECKOUT_SESSION_ID}` placeholder.
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: BTreeMap<String, String>,
    /// Provider-side coupon to apply.
    pub coupon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    pub session_id: String,
    pub url: Option<String>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The provider refused the request; the message is safe to show.
    #[error("payment provider rejected the session: {0}")]
    Rejected(String),

    #[error("payment provider did not answer in time")]
    Timeout,

    #[error("payment provider unreachable: {0}")]
    Transport(String),

    #[error("unexpected payment provider response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else {
            // without_url keeps query strings and hosts out of logs and responses
            GatewayError::Transport(err.without_url().to_string())
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, request: &CheckoutSessionRequest) -> Result<SessionHandle, GatewayError>;
}
