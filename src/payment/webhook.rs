//! Signed completion callbacks from the payment provider.
//!
//! The signature header has the form `t=<unix seconds>,v1=<hex>[,v1=<hex>]`;
//! each `v1` is an HMAC-SHA256 of `"{t}.{raw body}"` keyed with the webhook
//! secret. Nothing in the body is parsed until a signature has matched.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Signatures older than this are treated as replays.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("missing signature header")]
    MissingHeader,

    #[error("malformed signature header")]
    MalformedHeader,

    #[error("signature timestamp outside tolerance")]
    Expired,

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("malformed event payload: {0}")]
    MalformedPayload(String),
}

// ---------------------------------------------------------------------------
// Event payload
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    data: EnvelopeData,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    object: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackEvent {
    CheckoutCompleted { event_id: Option<String>, session: CheckoutSession },
    /// Any other event type; acknowledged and ignored.
    Ignored { event_id: Option<String>, kind: String },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProviderAddress {
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<ProviderAddress>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProviderShipping {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<ProviderAddress>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CollectedInformation {
    #[serde(default)]
    pub shipping_details: Option<ProviderShipping>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ShippingCost {
    #[serde(default)]
    pub amount_total: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TotalDetails {
    #[serde(default)]
    pub amount_discount: i64,
    #[serde(default)]
    pub amount_shipping: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChargeOutcome {
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub risk_score: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Charge {
    #[serde(default)]
    pub outcome: Option<ChargeOutcome>,
    #[serde(default)]
    pub payment_method_details: Option<serde_json::Value>,
}

impl Charge {
    pub fn card_fingerprint(&self) -> Option<String> {
        self.payment_method_details
            .as_ref()?
            .pointer("/card/fingerprint")?
            .as_str()
            .map(str::to_string)
    }
}

/// Either a bare id or, when the session was fetched with `expand`, the object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PaymentIntentRef {
    Id(String),
    Expanded {
        id: String,
        #[serde(default)]
        latest_charge: Option<ChargeRef>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ChargeRef {
    Id(String),
    Expanded(Box<Charge>),
}

impl PaymentIntentRef {
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) | Self::Expanded { id, .. } => id,
        }
    }

    pub fn charge(&self) -> Option<&Charge> {
        match self {
            Self::Expanded { latest_charge: Some(ChargeRef::Expanded(charge)), .. } => Some(charge),
            _ => None,
        }
    }
}

/// The `data.object` of a `checkout.session.completed` event. Amounts are in
/// the provider's minor unit.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub amount_subtotal: Option<i64>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_status: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<PaymentIntentRef>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub shipping_details: Option<ProviderShipping>,
    #[serde(default)]
    pub collected_information: Option<CollectedInformation>,
    #[serde(default)]
    pub shipping_cost: Option<ShippingCost>,
    #[serde(default)]
    pub total_details: Option<TotalDetails>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }

    /// Newer API versions move shipping details under `collected_information`.
    pub fn shipping(&self) -> Option<&ProviderShipping> {
        self.collected_information
            .as_ref()
            .and_then(|c| c.shipping_details.as_ref())
            .or(self.shipping_details.as_ref())
    }

    pub fn shipping_amount(&self) -> i64 {
        self.shipping_cost
            .as_ref()
            .map(|c| c.amount_total)
            .or_else(|| self.total_details.as_ref().map(|t| t.amount_shipping))
            .unwrap_or_default()
    }

    pub fn discount_amount(&self) -> i64 {
        self.total_details.as_ref().map(|t| t.amount_discount).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

fn parse_header(header: &str) -> Result<(i64, Vec<Vec<u8>>), VerificationError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let (key, value) = part.trim().split_once('=').ok_or(VerificationError::MalformedHeader)?;
        match key {
            "t" => timestamp = Some(value.parse::<i64>().map_err(|_| VerificationError::MalformedHeader)?),
            // Undecodable candidates simply never match.
            "v1" => signatures.extend(hex::decode(value).ok()),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(VerificationError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(VerificationError::MalformedHeader);
    }
    Ok((timestamp, signatures))
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, VerificationError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| VerificationError::SignatureMismatch)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Checks `header` against `payload` at time `now`.
pub fn verify_signature(payload: &[u8], header: &str, secret: &str, now: DateTime<Utc>) -> Result<(), VerificationError> {
    if header.trim().is_empty() {
        return Err(VerificationError::MissingHeader);
    }
    let (timestamp, signatures) = parse_header(header)?;
    if now.timestamp().abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(VerificationError::Expired);
    }
    let matched = signatures.iter().any(|candidate| {
        // verify_slice compares in constant time
        mac_for(secret, timestamp, payload).is_ok_and(|mac| mac.verify_slice(candidate).is_ok())
    });
    if matched { Ok(()) } else { Err(VerificationError::SignatureMismatch) }
}

/// Builds a valid signature header; used by tooling and tests that replay events.
pub fn signature_header(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let digest = mac_for(secret, timestamp, payload)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default();
    format!("t={timestamp},v1={digest}")
}

pub fn verify_and_parse(payload: &[u8], header: &str, secret: &str) -> Result<CallbackEvent, VerificationError> {
    verify_and_parse_at(payload, header, secret, Utc::now())
}

pub fn verify_and_parse_at(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: DateTime<Utc>,
) -> Result<CallbackEvent, VerificationError> {
    verify_signature(payload, header, secret, now)?;

    let envelope: Envelope =
        serde_json::from_slice(payload).map_err(|e| VerificationError::MalformedPayload(e.to_string()))?;
    if envelope.kind != CHECKOUT_SESSION_COMPLETED {
        return Ok(CallbackEvent::Ignored { event_id: envelope.id, kind: envelope.kind });
    }
    let session: CheckoutSession = serde_json::from_value(envelope.data.object)
        .map_err(|e| VerificationError::MalformedPayload(e.to_string()))?;
    Ok(CallbackEvent::CheckoutCompleted { event_id: envelope.id, session })
}
