use axum::body::Bytes;
use axum::extract::{FromRequest, Path, State};
use axum::http::HeaderMap;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use super::{ApiError, ApiResult, AppState};
use crate::domain::aggregates::{Address, BillingDetails, CartLineItem, Order, OrderStatus, ShippingDetails, ShippingMethod};
use crate::domain::value_objects::{Money, PushToken};
use crate::payment::{webhook, SessionHandle};
use crate::reconciler::{CashOrderSubmission, ReconcileOutcome};
use crate::CheckoutError;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// JSON body extractor whose rejections render as [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

// ---------------------------------------------------------------------------
// Card checkout
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItemRequest {
    #[validate(length(min = 1))]
    pub id: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub sale_price: Option<Decimal>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub size: String,
    #[validate(range(min = 1, max = 999))]
    pub quantity: u32,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub customization: Option<String>,
}

impl From<CheckoutItemRequest> for CartLineItem {
    fn from(r: CheckoutItemRequest) -> Self {
        CartLineItem {
            product_id: r.id,
            name: r.name,
            unit_price: r.price,
            sale_price: r.sale_price,
            image: r.image,
            size: r.size,
            quantity: r.quantity,
            customization: r.customization,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionBody {
    #[validate(length(min = 1))]
    pub items: Vec<CheckoutItemRequest>,
    #[serde(default)]
    pub promo_code: Option<String>,
}

pub async fn create_checkout_session(
    State(s): State<AppState>,
    AppJson(body): AppJson<CheckoutSessionBody>,
) -> ApiResult<Json<SessionHandle>> {
    body.validate()?;
    for item in &body.items {
        item.validate()?;
    }
    let items: Vec<CartLineItem> = body.items.into_iter().map(CartLineItem::from).collect();
    let handle = s.reconciler.initiate(&items, body.promo_code.as_deref()).await?;
    Ok(Json(handle))
}

pub async fn payment_webhook(State(s): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Json<Value>> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()).unwrap_or_default();
    // Nothing from the payload is trusted until the signature checks out.
    let event = webhook::verify_and_parse(&body, signature, &s.webhook_secret).map_err(CheckoutError::from)?;
    match s.reconciler.reconcile(event).await? {
        ReconcileOutcome::Created(order) => tracing::debug!(order_id = %order.id(), "Webhook created order"),
        ReconcileOutcome::Duplicate(order) => tracing::debug!(order_id = %order.id(), "Webhook replay acknowledged"),
        ReconcileOutcome::Ignored { reason } => tracing::debug!(%reason, "Webhook acknowledged without action"),
    }
    Ok(Json(json!({ "received": true })))
}

// ---------------------------------------------------------------------------
// Cash on delivery
// ---------------------------------------------------------------------------

/// Compact cart line as the storefront sends it.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CashItemRequest {
    #[validate(length(min = 1, max = 200))]
    pub n: String,
    #[serde(default)]
    pub s: String,
    #[validate(range(min = 1, max = 999))]
    pub q: u32,
    pub p: Decimal,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub c: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddressRequest {
    #[validate(length(min = 1, max = 200))]
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[serde(default = "default_country")]
    #[validate(length(equal = 2))]
    pub country: String,
}

fn default_country() -> String {
    "HU".to_string()
}

impl From<AddressRequest> for Address {
    fn from(r: AddressRequest) -> Self {
        Address { line1: r.line1, line2: r.line2, city: r.city, postal_code: r.postal_code, country: r.country.to_uppercase() }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShippingDetailsRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 40))]
    pub phone: Option<String>,
    pub address: AddressRequest,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BillingDetailsRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<AddressRequest>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CashOrderBody {
    #[validate(length(min = 1))]
    pub items: Vec<CashItemRequest>,
    pub shipping_details: ShippingDetailsRequest,
    #[serde(default)]
    pub billing_details: BillingDetailsRequest,
    pub amount: Decimal,
    pub currency: String,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    #[serde(default)]
    pub shipping_type: ShippingMethod,
    pub cash_on_delivery_fee: Decimal,
    #[validate(length(min = 1, max = 254))]
    pub email: String,
}

impl CashOrderBody {
    fn validate_all(&self) -> Result<(), ApiError> {
        self.validate()?;
        for item in &self.items {
            item.validate()?;
        }
        self.shipping_details.validate()?;
        self.shipping_details.address.validate()?;
        if let Some(address) = &self.billing_details.address {
            address.validate()?;
        }
        Ok(())
    }
}

fn whole_forints(value: Decimal, field: &str) -> Result<Money, ApiError> {
    if !value.fract().is_zero() {
        return Err(ApiError::BadRequest(format!("{field} must be a whole number of forints")));
    }
    Money::from_decimal(value).ok_or_else(|| ApiError::BadRequest(format!("{field} is out of range")))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashOrderResponse {
    pub success: bool,
    pub order_id: Uuid,
    pub order_number: String,
    pub email_sent: bool,
}

pub async fn cash_on_delivery(State(s): State<AppState>, AppJson(body): AppJson<CashOrderBody>) -> ApiResult<Json<CashOrderResponse>> {
    body.validate_all()?;
    let submission = CashOrderSubmission {
        declared_amount: whole_forints(body.amount, "amount")?,
        declared_cod_fee: whole_forints(body.cash_on_delivery_fee, "cashOnDeliveryFee")?,
        items: body
            .items
            .into_iter()
            .map(|i| CartLineItem {
                product_id: String::new(),
                name: i.n,
                unit_price: i.p,
                sale_price: None,
                image: None,
                size: i.s,
                quantity: i.q,
                customization: i.c,
            })
            .collect(),
        shipping: ShippingDetails {
            name: body.shipping_details.name,
            phone: body.shipping_details.phone,
            address: body.shipping_details.address.into(),
        },
        billing: BillingDetails {
            name: body.billing_details.name,
            email: body.billing_details.email,
            address: body.billing_details.address.map(Address::from),
        },
        currency: body.currency,
        shipping_method: body.shipping_type,
        email: body.email,
        notes: body.notes,
    };

    let receipt = s.reconciler.submit_cash_order(submission).await?;
    Ok(Json(CashOrderResponse {
        success: true,
        order_id: receipt.order.id(),
        order_number: receipt.order.order_number().to_string(),
        email_sent: receipt.email_sent,
    }))
}

// ---------------------------------------------------------------------------
// Orders / admin
// ---------------------------------------------------------------------------

pub async fn list_orders(State(s): State<AppState>) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(s.admin.list_orders().await?))
}

pub async fn get_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Order>> {
    Ok(Json(s.admin.get_order(id).await?))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateBody {
    pub order_id: Uuid,
    #[validate(length(min = 1))]
    pub status: String,
}

pub async fn update_order_status(State(s): State<AppState>, AppJson(body): AppJson<StatusUpdateBody>) -> ApiResult<Json<Value>> {
    body.validate()?;
    let status: OrderStatus = body.status.parse().map_err(CheckoutError::from)?;
    s.admin.set_status(body.order_id, status).await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct PushTokenBody {
    #[validate(length(min = 1, max = 512))]
    pub token: String,
}

pub async fn register_push_token(State(s): State<AppState>, AppJson(body): AppJson<PushTokenBody>) -> ApiResult<Json<Value>> {
    body.validate()?;
    let token = PushToken::new(body.token);
    if token.as_str().is_empty() {
        return Err(ApiError::BadRequest("token must not be blank".into()));
    }
    let recipient = s.push_recipients.upsert(token).await.map_err(CheckoutError::from)?;
    tracing::info!(token = recipient.token.as_str(), deliverable = recipient.token.is_deliverable(), "Push token registered");
    Ok(Json(json!({ "success": true })))
}
