//! OpenSASE Storefront
//!
//! Order and payment reconciliation for a single-currency (HUF) storefront.
//!
//! ## Features
//! - Server-side pricing (subtotal, shipping, cash-on-delivery fee)
//! - Hosted card checkout sessions and signed webhook reconciliation
//! - Cash-on-delivery orders with declared-total validation
//! - Push and email notifications, best effort
//! - Admin status transitions over a fixed status table

use thiserror::Error;
use uuid::Uuid;

pub mod admin;
pub mod api;
pub mod config;
pub mod domain;
pub mod notify;
pub mod payment;
pub mod pricing;
pub mod publisher;
pub mod reconciler;
pub mod store;

use domain::aggregates::OrderError;
use domain::value_objects::{EmailAddressError, Money};
use payment::{GatewayError, VerificationError};
use pricing::PricingError;
use store::StoreError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error("declared amount {declared} does not match the computed total {expected}")]
    AmountMismatch { declared: Money, expected: Money },

    #[error("invalid email address: {0}")]
    InvalidEmail(#[from] EmailAddressError),

    #[error("{0}")]
    Validation(String),

    #[error("order {0} not found")]
    OrderNotFound(Uuid),

    #[error(transparent)]
    Transition(#[from] OrderError),

    #[error("order {0} was modified concurrently, reload and retry")]
    ConcurrentUpdate(Uuid),

    #[error("webhook rejected: {0}")]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("provider amounts for session {session_id} do not add up")]
    ProviderAmountMismatch { session_id: String },

    #[error(transparent)]
    Persistence(StoreError),
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => CheckoutError::OrderNotFound(id),
            StoreError::StaleStatus { id, .. } => CheckoutError::ConcurrentUpdate(id),
            other => CheckoutError::Persistence(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
