//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{EmailAddress, Money, OrderNumber, CURRENCY};
use crate::pricing::PricingBreakdown;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod { Card, CashOnDelivery }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod { #[default] Standard, Express }

/// Fulfilment status as managed from the admin side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Sent,
    Success,
    #[serde(alias = "sent back")]
    SentBack,
    Cancelled,
}

impl OrderStatus {

    /// Statuses reachable from `self` in one step.
    pub fn successors(&self) -> &'static [OrderStatus] {
        match self {
            Self::Pending => &[Self::Sent, Self::Cancelled],
            Self::Sent => &[Self::Success, Self::SentBack],
            Self::SentBack => &[Self::Cancelled, Self::Sent],
            Self::Success | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool { self.successors().contains(&next) }
    pub fn is_terminal(&self) -> bool { self.successors().is_empty() }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Success => "success",
            Self::SentBack => "sent_back",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "success" => Ok(Self::Success),
            "sent_back" | "sent back" => Ok(Self::SentBack),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

/// Denormalised copy of a purchased line; never a live product reference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemSnapshot {
    pub name: String,
    pub size: String,
    pub quantity: u32,
    pub unit_price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customization: Option<String>,
}

impl LineItemSnapshot {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}, {}", self.postal_code, self.city, self.line1)?;
        if let Some(line2) = self.line2.as_deref().filter(|l| !l.is_empty()) { write!(f, " {line2}")?; }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingDetails {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub address: Address,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingDetails {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
}

/// What the payment provider told us about a card payment.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMetadata {
    pub session_id: String,
    pub payment_status: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub payment_intent_id: Option<String>,
    #[serde(default)]
    pub card_fingerprint: Option<String>,
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub risk_score: Option<i64>,
}

/// Everything needed to place an order; financial fields are fixed from here on.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub order_number: OrderNumber,
    pub payment_method: PaymentMethod,
    pub items: Vec<LineItemSnapshot>,
    pub shipping: ShippingDetails,
    pub billing: BillingDetails,
    pub email: Option<EmailAddress>,
    pub pricing: PricingBreakdown,
    pub notes: Option<String>,
    pub provider: Option<ProviderMetadata>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: Uuid,
    order_number: OrderNumber,
    payment_method: PaymentMethod,
    status: OrderStatus,
    items: Vec<LineItemSnapshot>,
    shipping: ShippingDetails,
    billing: BillingDetails,
    email: Option<EmailAddress>,
    #[serde(flatten)]
    pricing: PricingBreakdown,
    currency: String,
    notes: Option<String>,
    provider: Option<ProviderMetadata>,
    fulfilled: bool,
    created_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Order {
    pub fn place(new: NewOrder) -> Self {
        let mut order = Self::restore(Uuid::now_v7(), new, OrderStatus::Pending, false, Utc::now());
        order.raise_event(DomainEvent::Order(OrderEvent::Placed {
            order_id: order.id,
            order_number: order.order_number.clone(),
            payment_method: order.payment_method,
            total: order.pricing.total,
        }));
        order
    }

    /// Rebuilds a persisted order without raising events.
    pub fn restore(id: Uuid, new: NewOrder, status: OrderStatus, fulfilled: bool, created_at: DateTime<Utc>) -> Self {
        Self {
            id, order_number: new.order_number, payment_method: new.payment_method, status,
            items: new.items, shipping: new.shipping, billing: new.billing, email: new.email,
            pricing: new.pricing, currency: CURRENCY.to_string(), notes: new.notes, provider: new.provider,
            fulfilled, created_at, events: vec![],
        }
    }

    /// Keeps the currency a persisted row was written with.
    pub(crate) fn with_currency(mut self, currency: String) -> Self {
        self.currency = currency;
        self
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &OrderNumber { &self.order_number }
    pub fn payment_method(&self) -> PaymentMethod { self.payment_method }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn items(&self) -> &[LineItemSnapshot] { &self.items }
    pub fn shipping(&self) -> &ShippingDetails { &self.shipping }
    pub fn billing(&self) -> &BillingDetails { &self.billing }
    pub fn email(&self) -> Option<&EmailAddress> { self.email.as_ref() }
    pub fn pricing(&self) -> &PricingBreakdown { &self.pricing }
    pub fn total(&self) -> Money { self.pricing.total }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn notes(&self) -> Option<&str> { self.notes.as_deref() }
    pub fn provider(&self) -> Option<&ProviderMetadata> { self.provider.as_ref() }
    pub fn session_id(&self) -> Option<&str> { self.provider.as_ref().map(|p| p.session_id.as_str()) }
    pub fn is_fulfilled(&self) -> bool { self.fulfilled }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    /// Swaps in a fresh order number after a uniqueness conflict. Only valid
    /// before the order has been persisted.
    pub(crate) fn renumber(&mut self, order_number: OrderNumber) {
        self.order_number = order_number.clone();
        for event in &mut self.events {
            if let DomainEvent::Order(OrderEvent::Placed { order_number: n, .. }) = event { *n = order_number.clone(); }
        }
    }

    /// Moves the order along the status table. Re-applying the current status is a no-op.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<bool, OrderError> {
        if self.status == next { return Ok(false); }
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from: self.status, to: next });
        }
        let from = self.status;
        self.status = next;
        self.fulfilled = next == OrderStatus::Success;
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from, to: next }));
        Ok(true)
    }

    /// Store-side status write; legality was checked by whoever produced `status`.
    pub(crate) fn overwrite_status(&mut self, status: OrderStatus) {
        self.status = status;
        self.fulfilled = status == OrderStatus::Success;
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError { InvalidTransition { from: OrderStatus, to: OrderStatus }, UnknownStatus(String) }
impl std::error::Error for OrderError {}
impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTransition { from, to } => write!(f, "cannot move order from {from} to {to}"),
            Self::UnknownStatus(s) => write!(f, "unknown order status '{s}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::PricingBreakdown;

    fn sample_new_order() -> NewOrder {
        NewOrder {
            order_number: OrderNumber::from_session("ORD-20261018-0001"),
            payment_method: PaymentMethod::CashOnDelivery,
            items: vec![LineItemSnapshot { name: "BreathGuard".into(), size: "M".into(), quantity: 2, unit_price: Money::new(9990), customization: None }],
            shipping: ShippingDetails::default(),
            billing: BillingDetails::default(),
            email: None,
            pricing: PricingBreakdown {
                subtotal: Money::new(19980), shipping_method: ShippingMethod::Standard, shipping_cost: Money::new(1990),
                cod_fee: Money::new(590), discount: Money::ZERO, total: Money::new(22560),
            },
            notes: None,
            provider: None,
        }
    }

    #[test]
    fn test_order_workflow() {
        let mut order = Order::place(sample_new_order());
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.take_events().len(), 1);
        order.transition_to(OrderStatus::Sent).unwrap();
        order.transition_to(OrderStatus::SentBack).unwrap();
        order.transition_to(OrderStatus::Sent).unwrap();
        order.transition_to(OrderStatus::Success).unwrap();
        assert!(order.is_fulfilled());
        assert!(order.status().is_terminal());
        assert_eq!(order.take_events().len(), 4);
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let mut order = Order::place(sample_new_order());
        let err = order.transition_to(OrderStatus::Success).unwrap_err();
        assert_eq!(err, OrderError::InvalidTransition { from: OrderStatus::Pending, to: OrderStatus::Success });
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn test_same_status_is_noop() {
        let mut order = Order::place(sample_new_order());
        order.take_events();
        assert_eq!(order.transition_to(OrderStatus::Pending), Ok(false));
        assert!(order.take_events().is_empty());
    }

    #[test]
    fn test_status_parsing_accepts_legacy_spelling() {
        assert_eq!("sent back".parse::<OrderStatus>(), Ok(OrderStatus::SentBack));
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_renumber_updates_placed_event() {
        let mut order = Order::place(sample_new_order());
        order.renumber(OrderNumber::from_session("ORD-20261018-0002"));
        match order.take_events().first() {
            Some(DomainEvent::Order(OrderEvent::Placed { order_number, .. })) => assert_eq!(order_number.as_str(), "ORD-20261018-0002"),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
