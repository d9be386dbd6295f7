//! Aggregates module
pub mod order;
pub mod cart;
pub mod push_recipient;

pub use order::{
    Address, BillingDetails, LineItemSnapshot, NewOrder, Order, OrderError, OrderStatus, PaymentMethod,
    ProviderMetadata, ShippingDetails, ShippingMethod,
};
pub use cart::CartLineItem;
pub use push_recipient::PushRecipient;
