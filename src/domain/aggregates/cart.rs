//! Cart line items as submitted at checkout

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One cart entry: a product variant, quantity and resolved price.
///
/// Lives only on the client until checkout, so nothing here is trusted:
/// [`crate::pricing::PricingEngine`] re-validates every line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineItem {
    pub product_id: String,
    pub name: String,
    pub unit_price: Decimal,
    #[serde(default)]
    pub sale_price: Option<Decimal>,
    #[serde(default)]
    pub image: Option<String>,
    pub size: String,
    pub quantity: u32,
    /// Free-text personalisation, e.g. a name printed on the product.
    #[serde(default)]
    pub customization: Option<String>,
}

impl CartLineItem {
    /// Sale price when present, list price otherwise.
    pub fn effective_price(&self) -> Decimal {
        self.sale_price.unwrap_or(self.unit_price)
    }

    pub fn display_name(&self) -> String {
        if self.size.is_empty() { self.name.clone() } else { format!("{} ({})", self.name, self.size) }
    }
}
