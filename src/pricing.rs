//! Order total computation.
//!
//! Everything in here is pure: the same cart, shipping method and payment
//! method always give the same [`PricingBreakdown`]. Totals supplied by a
//! client are never used; callers recompute here and compare.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::aggregates::{CartLineItem, PaymentMethod, ShippingMethod};
use crate::domain::value_objects::Money;

/// Subtotal at or above which standard shipping is free.
pub const FREE_SHIPPING_THRESHOLD: Money = Money::new(30_000);
pub const STANDARD_SHIPPING_COST: Money = Money::new(1_990);
pub const EXPRESS_SHIPPING_COST: Money = Money::new(3_990);
/// Cash-on-delivery surcharge.
pub const COD_FEE: Money = Money::new(590);
/// Smallest amount the card provider will charge.
pub const MIN_CARD_AMOUNT: Money = Money::new(175);
/// Substituted for non-positive prices on the card path only.
pub const CARD_PRICE_FLOOR: Money = Money::new(200);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingBreakdown {
    pub subtotal: Money,
    pub shipping_method: ShippingMethod,
    pub shipping_cost: Money,
    pub cod_fee: Money,
    /// Provider-applied coupon discount; always zero when computed locally.
    #[serde(default)]
    pub discount: Money,
    pub total: Money,
}

impl PricingBreakdown {
    /// `total == subtotal + shipping_cost + cod_fee - discount`
    pub fn is_consistent(&self) -> bool {
        self.subtotal.add(self.shipping_cost).add(self.cod_fee).sub(self.discount) == self.total
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("line {line}: quantity must be at least 1")]
    InvalidQuantity { line: usize },

    #[error("line {line}: unit price must be positive")]
    InvalidPrice { line: usize },

    #[error("order amount {amount} is below the minimum payable {minimum}")]
    BelowMinimum { amount: Money, minimum: Money },
}

pub struct PricingEngine;

impl PricingEngine {
    /// Rounded `effective price x quantity` for one line.
    pub fn line_total(line: usize, item: &CartLineItem) -> Result<Money, PricingError> {
        if item.quantity < 1 {
            return Err(PricingError::InvalidQuantity { line });
        }
        let price = item.effective_price();
        if price <= Decimal::ZERO {
            return Err(PricingError::InvalidPrice { line });
        }
        price
            .checked_mul(Decimal::from(item.quantity))
            .and_then(Money::from_decimal)
            .ok_or(PricingError::InvalidPrice { line })
    }

    pub fn subtotal(items: &[CartLineItem]) -> Result<Money, PricingError> {
        if items.is_empty() {
            return Err(PricingError::EmptyCart);
        }
        items
            .iter()
            .enumerate()
            .try_fold(Money::ZERO, |acc, (line, item)| Ok(acc.add(Self::line_total(line, item)?)))
    }

    pub fn shipping_cost(subtotal: Money, method: ShippingMethod) -> Money {
        match method {
            ShippingMethod::Standard if subtotal >= FREE_SHIPPING_THRESHOLD => Money::ZERO,
            ShippingMethod::Standard => STANDARD_SHIPPING_COST,
            ShippingMethod::Express => EXPRESS_SHIPPING_COST,
        }
    }

    pub fn cod_fee(payment: PaymentMethod) -> Money {
        match payment {
            PaymentMethod::CashOnDelivery => COD_FEE,
            PaymentMethod::Card => Money::ZERO,
        }
    }

    pub fn compute(
        items: &[CartLineItem],
        shipping: ShippingMethod,
        payment: PaymentMethod,
    ) -> Result<PricingBreakdown, PricingError> {
        let subtotal = Self::subtotal(items)?;
        let shipping_cost = Self::shipping_cost(subtotal, shipping);
        let cod_fee = Self::cod_fee(payment);
        Ok(PricingBreakdown {
            subtotal,
            shipping_method: shipping,
            shipping_cost,
            cod_fee,
            discount: Money::ZERO,
            total: subtotal.add(shipping_cost).add(cod_fee),
        })
    }

    /// Prepares a cart for the card provider, which charges whole forints
    /// per unit. Each effective price is rounded to a whole forint first, so
    /// the subtotal priced here is exactly what the provider will sum.
    ///
    /// Card checkout quirk: a line whose rounded price is zero or negative is
    /// charged at [`CARD_PRICE_FLOOR`] instead of being rejected. Cash orders
    /// never go through this and fail validation instead.
    pub fn card_line_items(items: &[CartLineItem]) -> Vec<CartLineItem> {
        items
            .iter()
            .map(|item| {
                let mut item = item.clone();
                if let Some(unit) = Money::from_decimal(item.effective_price()) {
                    item.sale_price = None;
                    item.unit_price = Decimal::from(unit.amount());
                }
                if item.effective_price() <= Decimal::ZERO {
                    item.sale_price = None;
                    item.unit_price = Decimal::from(CARD_PRICE_FLOOR.amount());
                }
                item
            })
            .collect()
    }

    /// The subtotal alone must reach the provider minimum, and so must every
    /// subtotal + shipping alternative offered to the customer.
    pub fn ensure_card_minimum(subtotal: Money, shipping_options: &[Money]) -> Result<(), PricingError> {
        if subtotal < MIN_CARD_AMOUNT {
            return Err(PricingError::BelowMinimum { amount: subtotal, minimum: MIN_CARD_AMOUNT });
        }
        for cost in shipping_options {
            let amount = subtotal.add(*cost);
            if amount < MIN_CARD_AMOUNT {
                return Err(PricingError::BelowMinimum { amount, minimum: MIN_CARD_AMOUNT });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(price: i64, quantity: u32) -> CartLineItem {
        CartLineItem {
            product_id: "bg-1".into(), name: "BreathGuard".into(), unit_price: Decimal::from(price), sale_price: None,
            image: None, size: "M".into(), quantity, customization: None,
        }
    }

    #[test]
    fn test_worked_example() {
        let b = PricingEngine::compute(&[item(9990, 2)], ShippingMethod::Standard, PaymentMethod::CashOnDelivery).unwrap();
        assert_eq!(b.subtotal, Money::new(19980));
        assert_eq!(b.shipping_cost, Money::new(1990));
        assert_eq!(b.cod_fee, Money::new(590));
        assert_eq!(b.total, Money::new(22560));
        assert!(b.is_consistent());
    }

    #[test]
    fn test_compute_is_deterministic() {
        let cart = vec![item(4990, 3), item(1250, 1)];
        let a = PricingEngine::compute(&cart, ShippingMethod::Express, PaymentMethod::Card).unwrap();
        let b = PricingEngine::compute(&cart, ShippingMethod::Express, PaymentMethod::Card).unwrap();
        assert_eq!(a, b);
        assert!(a.is_consistent());
        assert_eq!(a.cod_fee, Money::ZERO);
    }

    #[test]
    fn test_free_shipping_threshold() {
        assert_eq!(PricingEngine::shipping_cost(Money::new(30_000), ShippingMethod::Standard), Money::ZERO);
        assert_eq!(PricingEngine::shipping_cost(Money::new(29_999), ShippingMethod::Standard), Money::new(1990));
        assert_eq!(PricingEngine::shipping_cost(Money::new(30_000), ShippingMethod::Express), Money::new(3990));
        assert_eq!(PricingEngine::shipping_cost(Money::new(10), ShippingMethod::Express), Money::new(3990));
    }

    #[test]
    fn test_rounds_per_line_before_summing() {
        let mut a = item(0, 1);
        a.unit_price = Decimal::new(1004, 1); // 100.4
        let mut b = a.clone();
        b.unit_price = Decimal::new(1004, 1);
        // 100 + 100, not round(200.8) = 201
        assert_eq!(PricingEngine::subtotal(&[a, b]).unwrap(), Money::new(200));
    }

    #[test]
    fn test_invalid_carts() {
        assert_eq!(PricingEngine::subtotal(&[]), Err(PricingError::EmptyCart));
        assert_eq!(PricingEngine::subtotal(&[item(100, 1), item(100, 0)]), Err(PricingError::InvalidQuantity { line: 1 }));
        assert_eq!(PricingEngine::subtotal(&[item(0, 1)]), Err(PricingError::InvalidPrice { line: 0 }));
        assert_eq!(PricingEngine::subtotal(&[item(-5, 1)]), Err(PricingError::InvalidPrice { line: 0 }));
    }

    #[test]
    fn test_card_price_floor() {
        let floored = PricingEngine::card_line_items(&[item(0, 2), item(500, 1)]);
        assert_eq!(floored[0].effective_price(), Decimal::from(200));
        assert_eq!(floored[1].effective_price(), Decimal::from(500));
        assert_eq!(PricingEngine::subtotal(&floored).unwrap(), Money::new(900));

        let mut tiny = item(0, 1);
        tiny.unit_price = Decimal::new(4, 1); // 0.4 rounds to 0
        assert_eq!(PricingEngine::card_line_items(&[tiny])[0].effective_price(), Decimal::from(200));
    }

    #[test]
    fn test_card_lines_are_priced_per_whole_unit() {
        let mut line = item(0, 2);
        line.unit_price = Decimal::new(149_996, 1); // 14999.6
        // Rounding price x quantity would give 29999 and paid shipping.
        assert_eq!(PricingEngine::subtotal(&[line.clone()]).unwrap(), Money::new(29_999));

        let card = PricingEngine::card_line_items(&[line]);
        assert_eq!(card[0].effective_price(), Decimal::from(15_000));
        let subtotal = PricingEngine::subtotal(&card).unwrap();
        assert_eq!(subtotal, Money::new(30_000));
        assert_eq!(PricingEngine::shipping_cost(subtotal, ShippingMethod::Standard), Money::ZERO);
    }

    #[test]
    fn test_card_lines_use_sale_price() {
        let mut line = item(10_000, 1);
        line.sale_price = Some(Decimal::new(79_995, 1)); // 7999.5
        let card = PricingEngine::card_line_items(&[line]);
        assert_eq!(card[0].sale_price, None);
        assert_eq!(card[0].unit_price, Decimal::from(8_000));
    }

    #[test]
    fn test_card_minimum_boundary() {
        let options = [Money::new(1990), Money::new(3990)];
        assert_eq!(
            PricingEngine::ensure_card_minimum(Money::new(174), &options),
            Err(PricingError::BelowMinimum { amount: Money::new(174), minimum: MIN_CARD_AMOUNT })
        );
        assert!(PricingEngine::ensure_card_minimum(Money::new(175), &options).is_ok());
    }
}
