//! In-memory stores, used by tests and when no `DATABASE_URL` is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{InsertOutcome, OrderStore, PushRecipientStore, StoreError};
use crate::domain::aggregates::{Order, OrderStatus, PushRecipient};
use crate::domain::value_objects::PushToken;

#[derive(Default)]
pub struct MemoryOrderStore {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self { Self::default() }

    pub async fn len(&self) -> usize { self.orders.read().await.len() }

    pub async fn is_empty(&self) -> bool { self.orders.read().await.is_empty() }

    fn check_unique(orders: &HashMap<Uuid, Order>, order: &Order) -> Result<(), StoreError> {
        if orders.contains_key(&order.id()) {
            return Err(StoreError::Conflict("id"));
        }
        if orders.values().any(|o| o.order_number() == order.order_number()) {
            return Err(StoreError::Conflict("order_number"));
        }
        if let Some(session) = order.session_id() {
            if orders.values().any(|o| o.session_id() == Some(session)) {
                return Err(StoreError::Conflict("session_id"));
            }
        }
        Ok(())
    }

    fn stored(order: &Order) -> Order {
        let mut copy = order.clone();
        copy.take_events();
        copy
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<Uuid, StoreError> {
        let mut orders = self.orders.write().await;
        Self::check_unique(&orders, order)?;
        orders.insert(order.id(), Self::stored(order));
        Ok(order.id())
    }

    async fn insert_if_absent(&self, order: &Order) -> Result<InsertOutcome, StoreError> {
        // The write lock spans lookup and insert, so concurrent deliveries serialise here.
        let mut orders = self.orders.write().await;
        if let Some(session) = order.session_id() {
            if let Some(existing) = orders.values().find(|o| o.session_id() == Some(session)) {
                return Ok(InsertOutcome::AlreadyExists(existing.clone()));
            }
        }
        Self::check_unique(&orders, order)?;
        let stored = Self::stored(order);
        orders.insert(order.id(), stored.clone());
        Ok(InsertOutcome::Inserted(stored))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_by_session_id(&self, session_id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.values().find(|o| o.session_id() == Some(session_id)).cloned())
    }

    async fn update_status(&self, id: Uuid, expected: OrderStatus, next: OrderStatus) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if order.status() != expected {
            return Err(StoreError::StaleStatus { id, actual: order.status() });
        }
        order.overwrite_status(next);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Order>, StoreError> {
        let mut all: Vec<Order> = self.orders.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then_with(|| b.id().cmp(&a.id())));
        Ok(all)
    }
}

#[derive(Default)]
pub struct MemoryPushRecipientStore {
    recipients: RwLock<HashMap<PushToken, PushRecipient>>,
}

impl MemoryPushRecipientStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl PushRecipientStore for MemoryPushRecipientStore {
    async fn upsert(&self, token: PushToken) -> Result<PushRecipient, StoreError> {
        let mut recipients = self.recipients.write().await;
        let recipient = recipients
            .entry(token.clone())
            .and_modify(PushRecipient::refresh)
            .or_insert_with(|| PushRecipient::register(token));
        Ok(recipient.clone())
    }

    async fn list(&self) -> Result<Vec<PushRecipient>, StoreError> {
        let mut all: Vec<PushRecipient> = self.recipients.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.registered_at.cmp(&b.registered_at));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{BillingDetails, NewOrder, PaymentMethod, ProviderMetadata, ShippingDetails, ShippingMethod};
    use crate::domain::value_objects::{Money, OrderNumber};
    use crate::pricing::PricingBreakdown;

    fn order(number: &str, session: Option<&str>) -> Order {
        Order::place(NewOrder {
            order_number: OrderNumber::from_session(number),
            payment_method: if session.is_some() { PaymentMethod::Card } else { PaymentMethod::CashOnDelivery },
            items: vec![],
            shipping: ShippingDetails::default(),
            billing: BillingDetails::default(),
            email: None,
            pricing: PricingBreakdown {
                subtotal: Money::new(1000), shipping_method: ShippingMethod::Standard, shipping_cost: Money::new(1990),
                cod_fee: Money::ZERO, discount: Money::ZERO, total: Money::new(2990),
            },
            notes: None,
            provider: session.map(|s| ProviderMetadata { session_id: s.into(), payment_status: "paid".into(), ..Default::default() }),
        })
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_order_number() {
        let store = MemoryOrderStore::new();
        store.insert(&order("ORD-1", None)).await.unwrap();
        let err = store.insert(&order("ORD-1", None)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict("order_number")));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_insert_if_absent_returns_existing() {
        let store = MemoryOrderStore::new();
        let first = order("cs_1", Some("cs_1"));
        assert!(matches!(store.insert_if_absent(&first).await.unwrap(), InsertOutcome::Inserted(_)));
        match store.insert_if_absent(&order("cs_1", Some("cs_1"))).await.unwrap() {
            InsertOutcome::AlreadyExists(existing) => assert_eq!(existing.id(), first.id()),
            other => panic!("expected existing order, got {other:?}"),
        }
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_status_compare_and_set() {
        let store = MemoryOrderStore::new();
        let o = order("ORD-2", None);
        store.insert(&o).await.unwrap();
        store.update_status(o.id(), OrderStatus::Pending, OrderStatus::Sent).await.unwrap();
        let err = store.update_status(o.id(), OrderStatus::Pending, OrderStatus::Cancelled).await.unwrap_err();
        assert!(matches!(err, StoreError::StaleStatus { actual: OrderStatus::Sent, .. }));
        let stored = store.find_by_id(o.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Sent);
        assert_eq!(stored.total(), o.total());
    }

    #[tokio::test]
    async fn test_update_status_missing_order() {
        let store = MemoryOrderStore::new();
        let id = Uuid::now_v7();
        assert!(matches!(store.update_status(id, OrderStatus::Pending, OrderStatus::Sent).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_push_upsert_is_keyed_by_token() {
        let store = MemoryPushRecipientStore::new();
        store.upsert(PushToken::new("ExponentPushToken[a]")).await.unwrap();
        store.upsert(PushToken::new("ExponentPushToken[a]")).await.unwrap();
        store.upsert(PushToken::new("ExponentPushToken[b]")).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 2);
    }
}
