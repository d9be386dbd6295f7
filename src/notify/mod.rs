//! Best-effort order notifications.
//!
//! [`NotificationDispatcher`] fans an order out to every registered push
//! device and to the customer's inbox. Failures are logged and counted; they
//! never propagate, because by the time anything is dispatched the order is
//! already persisted.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;

use crate::domain::aggregates::{Order, PushRecipient};
use crate::domain::value_objects::EmailAddress;
use crate::store::PushRecipientStore;

pub mod email;
pub mod push;

pub use email::{EmailConfig, EmailError, OutgoingEmail, SmtpEmailSender};
pub use push::{ExpoPushSender, PushError, PushMessage};

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, message: &PushMessage) -> Result<(), PushError>;
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError>;
}

/// Aggregate outcome of one push batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
    /// Tokens that are not valid for the push provider.
    pub skipped: usize,
}

pub struct NotificationDispatcher {
    recipients: Arc<dyn PushRecipientStore>,
    push: Arc<dyn PushSender>,
    /// `None` when email is not configured.
    email: Option<Arc<dyn EmailSender>>,
}

impl NotificationDispatcher {
    pub fn new(
        recipients: Arc<dyn PushRecipientStore>,
        push: Arc<dyn PushSender>,
        email: Option<Arc<dyn EmailSender>>,
    ) -> Self {
        Self { recipients, push, email }
    }

    /// Push to every registered device. Loads recipients from the store.
    pub async fn notify_registered_devices(&self, order: &Order) -> DispatchReport {
        match self.recipients.list().await {
            Ok(recipients) => self.notify_push(&recipients, order).await,
            Err(e) => {
                tracing::warn!(order_id = %order.id(), error = %e, "Could not load push recipients");
                DispatchReport::default()
            }
        }
    }

    /// One notification per deliverable recipient; sends run concurrently
    /// and each failure is logged without affecting the others.
    pub async fn notify_push(&self, recipients: &[PushRecipient], order: &Order) -> DispatchReport {
        let (deliverable, invalid): (Vec<&PushRecipient>, Vec<&PushRecipient>) =
            recipients.iter().partition(|r| r.token.is_deliverable());

        let sends = deliverable.iter().map(|recipient| async move {
            let message = PushMessage::for_order(recipient.token.clone(), order);
            let result = self.push.send(&message).await;
            if let Err(e) = &result {
                tracing::warn!(order_id = %order.id(), token = recipient.token.as_str(), error = %e, "Push notification failed");
            }
            result.is_ok()
        });
        let outcomes = join_all(sends).await;

        let delivered = outcomes.iter().filter(|ok| **ok).count();
        let report = DispatchReport { delivered, failed: outcomes.len() - delivered, skipped: invalid.len() };
        tracing::info!(
            order_id = %order.id(),
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            "Push batch dispatched"
        );
        report
    }

    /// Sends the order confirmation. Returns `false` instead of failing.
    pub async fn notify_email(&self, address: &EmailAddress, order: &Order) -> bool {
        let Some(sender) = &self.email else {
            tracing::warn!(order_id = %order.id(), "Email not configured; confirmation skipped");
            return false;
        };
        let email = email::order_confirmation(address, order);
        match sender.send(&email).await {
            Ok(()) => {
                tracing::info!(order_id = %order.id(), order_number = %order.order_number(), "Confirmation email sent");
                true
            }
            Err(e) => {
                tracing::warn!(order_id = %order.id(), error = %e, "Confirmation email failed");
                false
            }
        }
    }
}
