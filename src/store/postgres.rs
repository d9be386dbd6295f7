//! Postgres-backed stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{InsertOutcome, OrderStore, PushRecipientStore, StoreError};
use crate::domain::aggregates::{
    BillingDetails, LineItemSnapshot, NewOrder, Order, OrderStatus, ProviderMetadata, PushRecipient, ShippingDetails,
};
use crate::domain::value_objects::{EmailAddress, Money, OrderNumber, PushToken};
use crate::pricing::PricingBreakdown;

const ORDER_COLUMNS: &str = "id, order_number, session_id, payment_method, status, items, shipping, billing, email, \
    subtotal, shipping_method, shipping_cost, cod_fee, discount, total, currency, notes, provider, fulfilled, created_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    #[allow(dead_code)]
    session_id: Option<String>,
    payment_method: String,
    status: String,
    items: Json<Vec<LineItemSnapshot>>,
    shipping: Json<ShippingDetails>,
    billing: Json<BillingDetails>,
    email: Option<String>,
    subtotal: i64,
    shipping_method: String,
    shipping_cost: i64,
    cod_fee: i64,
    discount: i64,
    total: i64,
    currency: String,
    notes: Option<String>,
    provider: Option<Json<ProviderMetadata>>,
    fulfilled: bool,
    created_at: DateTime<Utc>,
}

/// Enum columns hold the serde spelling of the value.
fn parse_text<T: DeserializeOwned>(column: &str, value: String) -> Result<T, StoreError> {
    serde_json::from_value(serde_json::Value::String(value))
        .map_err(|e| StoreError::Backend(format!("bad {column} column: {e}")))
}

fn text_of<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let pricing = PricingBreakdown {
            subtotal: Money::new(row.subtotal),
            shipping_method: parse_text("shipping_method", row.shipping_method)?,
            shipping_cost: Money::new(row.shipping_cost),
            cod_fee: Money::new(row.cod_fee),
            discount: Money::new(row.discount),
            total: Money::new(row.total),
        };
        let status: OrderStatus = row.status.parse().map_err(|e| StoreError::Backend(format!("bad status column: {e}")))?;
        Ok(Order::restore(
            row.id,
            NewOrder {
                order_number: OrderNumber::from_session(row.order_number),
                payment_method: parse_text("payment_method", row.payment_method)?,
                items: row.items.0,
                shipping: row.shipping.0,
                billing: row.billing.0,
                // Addresses were validated on the way in; tolerate legacy rows.
                email: row.email.and_then(|e| EmailAddress::new(e).ok()),
                pricing,
                notes: row.notes,
                provider: row.provider.map(|p| p.0),
            },
            status,
            row.fulfilled,
            row.created_at,
        )
        .with_currency(row.currency))
    }
}

fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        // PostgreSQL unique_violation
        if db_err.code().as_deref() == Some("23505") {
            return match db_err.constraint() {
                Some("uq_orders_order_number") => StoreError::Conflict("order_number"),
                Some("uq_orders_session_id") => StoreError::Conflict("session_id"),
                _ => StoreError::Conflict("id"),
            };
        }
    }
    StoreError::from(err)
}

#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    fn bind_insert<'q>(sql: &'q str, order: &'q Order) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        let pricing = order.pricing();
        sqlx::query(sql)
            .bind(order.id())
            .bind(order.order_number().as_str())
            .bind(order.session_id())
            .bind(text_of(&order.payment_method()))
            .bind(order.status().as_str())
            .bind(Json(order.items()))
            .bind(Json(order.shipping()))
            .bind(Json(order.billing()))
            .bind(order.email().map(EmailAddress::as_str))
            .bind(pricing.subtotal.amount())
            .bind(text_of(&pricing.shipping_method))
            .bind(pricing.shipping_cost.amount())
            .bind(pricing.cod_fee.amount())
            .bind(pricing.discount.amount())
            .bind(pricing.total.amount())
            .bind(order.currency())
            .bind(order.notes())
            .bind(order.provider().map(Json))
            .bind(order.is_fulfilled())
            .bind(order.created_at())
    }
}

const INSERT_ORDER: &str = "INSERT INTO orders (id, order_number, session_id, payment_method, status, items, shipping, billing, email, \
    subtotal, shipping_method, shipping_cost, cod_fee, discount, total, currency, notes, provider, fulfilled, created_at) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)";

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: &Order) -> Result<Uuid, StoreError> {
        Self::bind_insert(INSERT_ORDER, order).execute(&self.pool).await.map_err(classify)?;
        Ok(order.id())
    }

    async fn insert_if_absent(&self, order: &Order) -> Result<InsertOutcome, StoreError> {
        let sql = format!("{INSERT_ORDER} ON CONFLICT (session_id) DO NOTHING");
        let result = Self::bind_insert(&sql, order).execute(&self.pool).await.map_err(classify)?;
        if result.rows_affected() == 1 {
            let mut stored = order.clone();
            stored.take_events();
            return Ok(InsertOutcome::Inserted(stored));
        }
        let session = order.session_id().unwrap_or_default();
        match self.find_by_session_id(session).await? {
            Some(existing) => Ok(InsertOutcome::AlreadyExists(existing)),
            None => Err(StoreError::Backend(format!("insert for session {session} skipped but no row found"))),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        sqlx::query_as::<_, OrderRow>(&sql).bind(id).fetch_optional(&self.pool).await?
            .map(Order::try_from).transpose()
    }

    async fn find_by_session_id(&self, session_id: &str) -> Result<Option<Order>, StoreError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE session_id = $1");
        sqlx::query_as::<_, OrderRow>(&sql).bind(session_id).fetch_optional(&self.pool).await?
            .map(Order::try_from).transpose()
    }

    async fn update_status(&self, id: Uuid, expected: OrderStatus, next: OrderStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE orders SET status = $3, fulfilled = $4 WHERE id = $1 AND status = $2")
            .bind(id).bind(expected.as_str()).bind(next.as_str()).bind(next == OrderStatus::Success)
            .execute(&self.pool).await?;
        if result.rows_affected() == 1 {
            return Ok(());
        }
        let current: Option<(String,)> = sqlx::query_as("SELECT status FROM orders WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?;
        match current {
            None => Err(StoreError::NotFound(id)),
            Some((status,)) => Err(StoreError::StaleStatus {
                id,
                actual: status.parse().map_err(|e| StoreError::Backend(format!("bad status column: {e}")))?,
            }),
        }
    }

    async fn list_all(&self) -> Result<Vec<Order>, StoreError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC");
        sqlx::query_as::<_, OrderRow>(&sql).fetch_all(&self.pool).await?
            .into_iter().map(Order::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgPushRecipientStore {
    pool: PgPool,
}

impl PgPushRecipientStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[derive(Debug, sqlx::FromRow)]
struct PushRecipientRow { token: String, registered_at: DateTime<Utc>, updated_at: DateTime<Utc> }

impl From<PushRecipientRow> for PushRecipient {
    fn from(row: PushRecipientRow) -> Self {
        PushRecipient { token: PushToken::new(row.token), registered_at: row.registered_at, updated_at: row.updated_at }
    }
}

#[async_trait]
impl PushRecipientStore for PgPushRecipientStore {
    async fn upsert(&self, token: PushToken) -> Result<PushRecipient, StoreError> {
        let row = sqlx::query_as::<_, PushRecipientRow>(
            "INSERT INTO push_recipients (token, registered_at, updated_at) VALUES ($1, NOW(), NOW()) \
             ON CONFLICT (token) DO UPDATE SET updated_at = NOW() RETURNING token, registered_at, updated_at",
        )
        .bind(token.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn list(&self) -> Result<Vec<PushRecipient>, StoreError> {
        let rows = sqlx::query_as::<_, PushRecipientRow>(
            "SELECT token, registered_at, updated_at FROM push_recipients ORDER BY registered_at",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PushRecipient::from).collect())
    }
}
