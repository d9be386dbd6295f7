//! Operator-side order management: status transitions and read access.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderStatus};
use crate::publisher::EventPublisher;
use crate::store::OrderStore;
use crate::{CheckoutError, Result};

pub struct AdminStatusController {
    orders: Arc<dyn OrderStore>,
    publisher: EventPublisher,
}

impl AdminStatusController {
    pub fn new(orders: Arc<dyn OrderStore>, publisher: EventPublisher) -> Self {
        Self { orders, publisher }
    }

    /// Moves an order along the status table. Setting the current status
    /// again succeeds without writing anything.
    pub async fn set_status(&self, order_id: Uuid, next: OrderStatus) -> Result<Order> {
        let mut order = self.orders.find_by_id(order_id).await?.ok_or(CheckoutError::OrderNotFound(order_id))?;
        let current = order.status();
        if !order.transition_to(next)? {
            tracing::debug!(%order_id, status = %next, "Status unchanged");
            return Ok(order);
        }

        // Compare-and-set against the status we read; a concurrent change surfaces as a conflict.
        self.orders.update_status(order_id, current, next).await?;
        tracing::info!(%order_id, from = %current, to = %next, fulfilled = order.is_fulfilled(), "Order status updated");
        self.publisher.publish(order.take_events()).await;
        Ok(order)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order> {
        self.orders.find_by_id(order_id).await?.ok_or(CheckoutError::OrderNotFound(order_id))
    }

    /// Newest first.
    pub async fn list_orders(&self) -> Result<Vec<Order>> {
        Ok(self.orders.list_all().await?)
    }
}
