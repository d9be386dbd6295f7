//! Order creation across the two payment paths.
//!
//! Card orders are two-phase: [`OrderReconciler::initiate`] opens a hosted
//! checkout session and stores nothing; the order only comes into being when
//! the provider's signed completion event reaches [`OrderReconciler::reconcile`].
//! Cash-on-delivery orders are created in one step by
//! [`OrderReconciler::submit_cash_order`] after the declared total has been
//! checked against a server-side recomputation.
//!
//! In both paths persistence happens strictly before any notification.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::{
    Address, BillingDetails, CartLineItem, LineItemSnapshot, NewOrder, Order, PaymentMethod, ProviderMetadata,
    ShippingDetails, ShippingMethod,
};
use crate::domain::value_objects::{EmailAddress, Money, OrderNumber, CURRENCY};
use crate::notify::NotificationDispatcher;
use crate::payment::webhook::{CheckoutSession, ProviderAddress};
use crate::payment::{
    CallbackEvent, CheckoutSessionRequest, GatewayError, PaymentGateway, SessionHandle, SessionLineItem,
    ShippingOption, METADATA_VALUE_LIMIT,
};
use crate::pricing::{PricingBreakdown, PricingEngine, EXPRESS_SHIPPING_COST};
use crate::publisher::EventPublisher;
use crate::store::{InsertOutcome, OrderStore, StoreError};
use crate::{CheckoutError, Result};

pub const CART_METADATA_KEY: &str = "cart";
pub const FREE_SHIPPING_METADATA_KEY: &str = "freeShipping";

/// Attempts at finding an unused cash order number.
const MAX_ORDER_NUMBER_ATTEMPTS: usize = 5;
const SUMMARY_NAME_LIMIT: usize = 60;

/// A single promo code mapped to a coupon provisioned at the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoCode {
    pub code: String,
    pub coupon_id: String,
}

impl PromoCode {
    pub fn matches(&self, input: &str) -> bool {
        input.trim().eq_ignore_ascii_case(self.code.trim())
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub public_base_url: String,
    pub allowed_countries: Vec<String>,
    pub promo: Option<PromoCode>,
    pub order_number_prefix: String,
    pub gateway_timeout: Duration,
}

// ---------------------------------------------------------------------------
// Cart summary carried through session metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SummaryEntry {
    n: String,
    #[serde(default)]
    s: String,
    q: u32,
    p: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    c: Option<String>,
}

/// Compact JSON of what was ordered, kept under the provider's metadata limit
/// by dropping trailing lines so the value always stays valid JSON.
pub fn cart_summary(items: &[SessionLineItem]) -> String {
    let mut entries: Vec<SummaryEntry> = items
        .iter()
        .map(|item| SummaryEntry {
            n: item.name.chars().take(SUMMARY_NAME_LIMIT).collect(),
            s: item.size.clone(),
            q: item.quantity,
            p: item.unit_amount.amount(),
            c: item.customization.clone().filter(|c| !c.is_empty()),
        })
        .collect();
    loop {
        let json = serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string());
        if json.len() <= METADATA_VALUE_LIMIT || entries.is_empty() {
            return json;
        }
        entries.pop();
    }
}

pub fn parse_cart_summary(raw: &str) -> Vec<LineItemSnapshot> {
    match serde_json::from_str::<Vec<SummaryEntry>>(raw) {
        Ok(entries) => entries
            .into_iter()
            .map(|e| LineItemSnapshot { name: e.n, size: e.s, quantity: e.q, unit_price: Money::new(e.p), customization: e.c })
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Unreadable cart summary in session metadata");
            vec![]
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

/// A cash-on-delivery order as the customer submitted it.
#[derive(Debug, Clone)]
pub struct CashOrderSubmission {
    pub items: Vec<CartLineItem>,
    pub shipping: ShippingDetails,
    pub billing: BillingDetails,
    pub declared_amount: Money,
    pub declared_cod_fee: Money,
    pub currency: String,
    pub shipping_method: ShippingMethod,
    pub email: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CashOrderReceipt {
    pub order: Order,
    pub email_sent: bool,
}

#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    Created(Order),
    /// The session was already reconciled; nothing was written or sent.
    Duplicate(Order),
    Ignored { reason: String },
}

// ---------------------------------------------------------------------------
// OrderReconciler
// ---------------------------------------------------------------------------

pub struct OrderReconciler {
    orders: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<NotificationDispatcher>,
    publisher: EventPublisher,
    settings: CheckoutSettings,
}

impl OrderReconciler {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<NotificationDispatcher>,
        publisher: EventPublisher,
        settings: CheckoutSettings,
    ) -> Self {
        Self { orders, gateway, notifier, publisher, settings }
    }

    /// Card path, phase one: price the cart, then open a hosted session.
    pub async fn initiate(&self, items: &[CartLineItem], promo_code: Option<&str>) -> Result<SessionHandle> {
        let items = PricingEngine::card_line_items(items);
        let subtotal = PricingEngine::subtotal(&items)?;
        let standard = PricingEngine::shipping_cost(subtotal, ShippingMethod::Standard);
        let express = PricingEngine::shipping_cost(subtotal, ShippingMethod::Express);
        PricingEngine::ensure_card_minimum(subtotal, &[standard, express])?;

        let line_items: Vec<SessionLineItem> = items
            .iter()
            .map(|item| SessionLineItem {
                name: item.display_name(),
                size: item.size.clone(),
                unit_amount: Money::from_decimal(item.effective_price()).unwrap_or_default(),
                quantity: item.quantity,
                image: item.image.clone(),
                customization: item.customization.clone(),
            })
            .collect();

        let free_shipping = standard == Money::ZERO;
        let shipping_options = vec![
            ShippingOption {
                method: ShippingMethod::Standard,
                amount: standard,
                display_name: if free_shipping { "Free shipping".into() } else { "Standard shipping".into() },
                min_business_days: 2,
                max_business_days: 4,
            },
            ShippingOption {
                method: ShippingMethod::Express,
                amount: express,
                display_name: "Express shipping".into(),
                min_business_days: 1,
                max_business_days: 2,
            },
        ];

        let coupon = match (promo_code.filter(|c| !c.trim().is_empty()), &self.settings.promo) {
            (Some(code), Some(promo)) if promo.matches(code) => Some(promo.coupon_id.clone()),
            (Some(code), _) => {
                tracing::info!(promo_code = code, "Unknown promo code ignored");
                None
            }
            _ => None,
        };

        let base = self.settings.public_base_url.trim_end_matches('/');
        let request = CheckoutSessionRequest {
            metadata: BTreeMap::from([
                (CART_METADATA_KEY.to_string(), cart_summary(&line_items)),
                (FREE_SHIPPING_METADATA_KEY.to_string(), free_shipping.to_string()),
            ]),
            line_items,
            shipping_options,
            allowed_countries: self.settings.allowed_countries.clone(),
            success_url: format!("{base}/success?session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{base}/cart"),
            coupon,
        };

        let handle = tokio::time::timeout(self.settings.gateway_timeout, self.gateway.create_session(&request))
            .await
            .map_err(|_| GatewayError::Timeout)??;
        tracing::info!(session_id = %handle.session_id, subtotal = subtotal.amount(), "Card checkout initiated");
        Ok(handle)
    }

    /// Card path, phase two: turn a verified completion event into an order,
    /// exactly once per session.
    pub async fn reconcile(&self, event: CallbackEvent) -> Result<ReconcileOutcome> {
        let session = match event {
            CallbackEvent::CheckoutCompleted { session, .. } => session,
            CallbackEvent::Ignored { kind, .. } => {
                tracing::debug!(kind = %kind, "Webhook event ignored");
                return Ok(ReconcileOutcome::Ignored { reason: format!("unhandled event type {kind}") });
            }
        };
        if !session.is_paid() {
            tracing::info!(session_id = %session.id, payment_status = %session.payment_status, "Completed session not paid yet");
            return Ok(ReconcileOutcome::Ignored { reason: format!("payment status {}", session.payment_status) });
        }

        let email = session
            .customer_details
            .as_ref()
            .and_then(|c| c.email.as_deref())
            .and_then(|e| EmailAddress::new(e).ok());
        let mut order = Order::place(card_order_from_session(&session, email)?);

        if let InsertOutcome::AlreadyExists(existing) = self.orders.insert_if_absent(&order).await? {
            tracing::info!(session_id = %session.id, order_id = %existing.id(), "Duplicate completion event, order already exists");
            return Ok(ReconcileOutcome::Duplicate(existing));
        }
        tracing::info!(session_id = %session.id, order_id = %order.id(), total = order.total().amount(), "Card order reconciled");

        self.publisher.publish(order.take_events()).await;
        self.spawn_push(order.clone());
        match order.email() {
            Some(address) => {
                self.notifier.notify_email(address, &order).await;
            }
            None => tracing::warn!(order_id = %order.id(), "No customer email on session; confirmation skipped"),
        }
        Ok(ReconcileOutcome::Created(order))
    }

    /// Cash-on-delivery path: validate, persist, then notify.
    pub async fn submit_cash_order(&self, submission: CashOrderSubmission) -> Result<CashOrderReceipt> {
        if !submission.currency.trim().eq_ignore_ascii_case(CURRENCY) {
            return Err(CheckoutError::Validation(format!("unsupported currency {}", submission.currency)));
        }
        let email = EmailAddress::new(submission.email.as_str())?;

        let pricing = PricingEngine::compute(&submission.items, submission.shipping_method, PaymentMethod::CashOnDelivery)?;
        if submission.declared_cod_fee != pricing.cod_fee {
            tracing::warn!(declared = submission.declared_cod_fee.amount(), expected = pricing.cod_fee.amount(), "COD fee mismatch");
            return Err(CheckoutError::AmountMismatch { declared: submission.declared_cod_fee, expected: pricing.cod_fee });
        }
        if submission.declared_amount != pricing.total {
            tracing::warn!(declared = submission.declared_amount.amount(), expected = pricing.total.amount(), "COD amount mismatch");
            return Err(CheckoutError::AmountMismatch { declared: submission.declared_amount, expected: pricing.total });
        }

        let items = submission
            .items
            .iter()
            .map(|item| LineItemSnapshot {
                name: item.name.clone(),
                size: item.size.clone(),
                quantity: item.quantity,
                unit_price: Money::from_decimal(item.effective_price()).unwrap_or_default(),
                customization: item.customization.clone(),
            })
            .collect();

        let mut billing = submission.billing;
        if billing.email.as_deref().map_or(true, |e| e.trim().is_empty()) {
            billing.email = Some(email.as_str().to_string());
        }

        let mut order = Order::place(NewOrder {
            order_number: self.fresh_order_number(),
            payment_method: PaymentMethod::CashOnDelivery,
            items,
            shipping: submission.shipping,
            billing,
            email: Some(email.clone()),
            pricing,
            notes: submission.notes.filter(|n| !n.trim().is_empty()),
            provider: None,
        });

        self.persist_cash_order(&mut order).await?;
        tracing::info!(order_id = %order.id(), order_number = %order.order_number(), total = order.total().amount(), "Cash order placed");

        self.publisher.publish(order.take_events()).await;
        self.spawn_push(order.clone());
        let email_sent = self.notifier.notify_email(&email, &order).await;
        Ok(CashOrderReceipt { order, email_sent })
    }

    fn fresh_order_number(&self) -> OrderNumber {
        OrderNumber::generate(&self.settings.order_number_prefix, Utc::now().date_naive(), &mut rand::thread_rng())
    }

    async fn persist_cash_order(&self, order: &mut Order) -> Result<()> {
        for attempt in 1..=MAX_ORDER_NUMBER_ATTEMPTS {
            match self.orders.insert(order).await {
                Ok(_) => return Ok(()),
                Err(StoreError::Conflict("order_number")) if attempt < MAX_ORDER_NUMBER_ATTEMPTS => {
                    tracing::info!(order_number = %order.order_number(), attempt, "Order number taken, regenerating");
                    order.renumber(self.fresh_order_number());
                }
                Err(StoreError::Backend(msg)) => {
                    // The write may have landed even though we saw an error.
                    if let Ok(Some(_)) = self.orders.find_by_id(order.id()).await {
                        tracing::warn!(order_id = %order.id(), error = %msg, "Insert reported failure but order is stored");
                        return Ok(());
                    }
                    tracing::error!(order_id = %order.id(), error = %msg, "Failed to persist cash order");
                    return Err(StoreError::Backend(msg).into());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Conflict("order_number").into())
    }

    /// Push is fire-and-forget relative to the caller.
    fn spawn_push(&self, order: Order) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            notifier.notify_registered_devices(&order).await;
        });
    }
}

// ---------------------------------------------------------------------------
// Session -> order
// ---------------------------------------------------------------------------

fn address_from(provider: &ProviderAddress) -> Address {
    Address {
        line1: provider.line1.clone().unwrap_or_default(),
        line2: provider.line2.clone().filter(|l| !l.is_empty()),
        city: provider.city.clone().unwrap_or_default(),
        postal_code: provider.postal_code.clone().unwrap_or_default(),
        country: provider.country.clone().unwrap_or_default(),
    }
}

/// Builds the order from the provider's own figures; the provider is the
/// source of truth for amounts and addresses on the card path.
fn card_order_from_session(session: &CheckoutSession, email: Option<EmailAddress>) -> Result<NewOrder> {
    let subtotal = Money::from_provider_minor(session.amount_subtotal.unwrap_or_default());
    let shipping_cost = Money::from_provider_minor(session.shipping_amount());
    let pricing = PricingBreakdown {
        subtotal,
        shipping_method: if shipping_cost == EXPRESS_SHIPPING_COST { ShippingMethod::Express } else { ShippingMethod::Standard },
        shipping_cost,
        cod_fee: Money::ZERO,
        discount: Money::from_provider_minor(session.discount_amount()),
        total: Money::from_provider_minor(session.amount_total.unwrap_or_default()),
    };
    if !pricing.is_consistent() {
        tracing::error!(session_id = %session.id, ?pricing, "Provider amounts do not add up; refusing to persist");
        return Err(CheckoutError::ProviderAmountMismatch { session_id: session.id.clone() });
    }
    if let Some(currency) = session.currency.as_deref() {
        if !currency.eq_ignore_ascii_case(CURRENCY) {
            tracing::error!(session_id = %session.id, currency, "Unexpected session currency");
            return Err(CheckoutError::ProviderAmountMismatch { session_id: session.id.clone() });
        }
    }

    let customer = session.customer_details.clone().unwrap_or_default();
    let provider_shipping = session.shipping().cloned().unwrap_or_default();
    let shipping = ShippingDetails {
        name: provider_shipping.name.or_else(|| customer.name.clone()).unwrap_or_default(),
        phone: provider_shipping.phone.or_else(|| customer.phone.clone()),
        address: provider_shipping
            .address
            .as_ref()
            .or(customer.address.as_ref())
            .map(address_from)
            .unwrap_or_default(),
    };
    let billing = BillingDetails {
        name: customer.name.clone().unwrap_or_default(),
        email: customer.email.clone(),
        address: customer.address.as_ref().map(address_from),
    };

    let charge = session.payment_intent.as_ref().and_then(|pi| pi.charge());
    let outcome = charge.and_then(|c| c.outcome.clone());
    let provider = ProviderMetadata {
        session_id: session.id.clone(),
        payment_status: session.payment_status.clone(),
        customer_id: session.customer.clone(),
        payment_intent_id: session.payment_intent.as_ref().map(|pi| pi.id().to_string()),
        card_fingerprint: charge.and_then(|c| c.card_fingerprint()),
        risk_level: outcome.as_ref().and_then(|o| o.risk_level.clone()),
        risk_score: outcome.and_then(|o| o.risk_score),
    };

    let items = session
        .metadata
        .get(CART_METADATA_KEY)
        .map(|raw| parse_cart_summary(raw))
        .unwrap_or_default();

    Ok(NewOrder {
        order_number: OrderNumber::from_session(session.id.clone()),
        payment_method: PaymentMethod::Card,
        items,
        shipping,
        billing,
        email,
        pricing,
        notes: None,
        provider: Some(provider),
    })
}
