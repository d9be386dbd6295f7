//! Push notification recipients

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::PushToken;

/// A device that asked to be told about new orders. Keyed by token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRecipient {
    pub token: PushToken,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PushRecipient {
    pub fn register(token: PushToken) -> Self {
        let now = Utc::now();
        Self { token, registered_at: now, updated_at: now }
    }

    /// Re-registration keeps the original registration time.
    pub fn refresh(&mut self) { self.updated_at = Utc::now(); }
}
