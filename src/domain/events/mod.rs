//! Domain events
use crate::domain::aggregates::{OrderStatus, PaymentMethod};
use crate::domain::value_objects::{Money, OrderNumber};
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Order(OrderEvent),
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Order(OrderEvent::Placed { .. }) => "orders.placed",
            Self::Order(OrderEvent::StatusChanged { .. }) => "orders.status_changed",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, order_number: OrderNumber, payment_method: PaymentMethod, total: Money },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
}
