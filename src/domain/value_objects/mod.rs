//! Value Objects for the storefront

use chrono::NaiveDate;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The only currency the storefront sells in.
pub const CURRENCY: &str = "HUF";

/// Money value object, in whole forints (HUF has no sub-unit in practice).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn new(forints: i64) -> Self { Self(forints) }
    pub fn amount(&self) -> i64 { self.0 }

    /// Rounds a decimal price to whole forints, midpoint away from zero.
    pub fn from_decimal(value: Decimal) -> Option<Self> {
        value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero).to_i64().map(Self)
    }

    pub fn add(&self, other: Money) -> Money { Money(self.0.saturating_add(other.0)) }
    pub fn sub(&self, other: Money) -> Money { Money(self.0.saturating_sub(other.0)) }
    pub fn multiply(&self, qty: u32) -> Money { Money(self.0.saturating_mul(i64::from(qty))) }
    pub fn is_positive(&self) -> bool { self.0 > 0 }

    /// Amount in the payment provider's minor unit (forints x 100).
    pub fn to_provider_minor(&self) -> i64 { self.0.saturating_mul(100) }

    /// Inverse of [`Money::to_provider_minor`]; rounds to the nearest forint.
    pub fn from_provider_minor(minor: i64) -> Money {
        Money((Decimal::from(minor) / Decimal::from(100))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .unwrap_or_default())
    }
}

impl fmt::Display for Money {
    /// `22560` renders as `22 560 Ft`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 { grouped.push(' '); }
            grouped.push(ch);
        }
        if self.0 < 0 { write!(f, "-")?; }
        write!(f, "{grouped} Ft")
    }
}

/// Customer e-mail address, syntactically validated on construction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn new(value: impl Into<String>) -> Result<Self, EmailAddressError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(EmailAddressError::Empty); }
        if !validator::validate_email(value.as_str()) { return Err(EmailAddressError::Malformed); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for EmailAddress {
    type Error = EmailAddressError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self { value.0 }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum EmailAddressError { Empty, Malformed }
impl std::error::Error for EmailAddressError {}
impl fmt::Display for EmailAddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "email address is empty"), Self::Malformed => write!(f, "email address is malformed") }
    }
}

/// Human-readable order number, `PREFIX-YYYYMMDD-NNNN` for cash orders or the
/// provider session id for card orders.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn generate<R: Rng + ?Sized>(prefix: &str, date: NaiveDate, rng: &mut R) -> Self {
        let suffix: u16 = rng.gen_range(0..10_000);
        Self(format!("{}-{}-{:04}", prefix, date.format("%Y%m%d"), suffix))
    }
    pub fn from_session(session_id: impl Into<String>) -> Self { Self(session_id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Expo push token (`ExponentPushToken[...]` or `ExpoPushToken[...]`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PushToken(String);

impl PushToken {
    pub fn new(value: impl Into<String>) -> Self { Self(value.into().trim().to_string()) }
    pub fn as_str(&self) -> &str { &self.0 }

    pub fn is_deliverable(&self) -> bool {
        ["ExponentPushToken[", "ExpoPushToken["].iter().any(|prefix| {
            self.0.strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix(']'))
                .is_some_and(|inner| !inner.is_empty())
        })
    }
}
