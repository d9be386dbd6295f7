//! Expo push delivery.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::PushSender;
use crate::domain::aggregates::Order;
use crate::domain::value_objects::PushToken;

pub const DEFAULT_PUSH_ENDPOINT: &str = "https://exp.host/--/api/v2/push/send";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("push service returned HTTP {0}")]
    HttpStatus(u16),

    /// The push service accepted the request but refused this ticket.
    #[error("push rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushData {
    pub order_id: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub to: PushToken,
    pub title: String,
    pub body: String,
    pub sound: &'static str,
    pub data: PushData,
}

impl PushMessage {
    /// "First item - price", with "+N more" when the order has several lines.
    pub fn for_order(to: PushToken, order: &Order) -> Self {
        let mut body = match order.items().first() {
            Some(first) => format!("{} ({}) - {}", first.name, first.size, first.unit_price),
            None => format!("Order total {}", order.total()),
        };
        let others = order.items().len().saturating_sub(1);
        if others > 0 {
            body.push_str(&format!(" +{others} more"));
        }
        let phone = order
            .shipping()
            .phone
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| "N/A".to_string());
        Self {
            to,
            title: format!("New order {}", order.order_number()),
            body,
            sound: "default",
            data: PushData { order_id: order.id().to_string(), phone },
        }
    }
}

#[derive(Debug, Deserialize)]
struct TicketEnvelope {
    data: Ticket,
}

#[derive(Debug, Deserialize)]
struct Ticket {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

pub struct ExpoPushSender {
    client: reqwest::Client,
    endpoint: String,
}

impl ExpoPushSender {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, PushError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, endpoint: endpoint.into() })
    }
}

#[async_trait]
impl PushSender for ExpoPushSender {
    async fn send(&self, message: &PushMessage) -> Result<(), PushError> {
        let response = self.client.post(&self.endpoint).json(message).send().await?;
        if !response.status().is_success() {
            return Err(PushError::HttpStatus(response.status().as_u16()));
        }
        let ticket: TicketEnvelope = response.json().await?;
        if ticket.data.status != "ok" {
            return Err(PushError::Rejected(ticket.data.message.unwrap_or(ticket.data.status)));
        }
        Ok(())
    }
}
