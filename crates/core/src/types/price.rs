//! Price tiers and decimal pricing helpers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which unit price applies to every line of a cart.
///
/// A cart is either entirely retail or entirely wholesale; the tier is never
/// chosen per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceTier {
    /// Regular shelf price.
    #[default]
    Retail,
    /// Volume price, active once the cart reaches the wholesale threshold.
    Wholesale,
}

impl PriceTier {
    /// Tier for the given wholesale flag.
    #[must_use]
    pub const fn from_wholesale(active: bool) -> Self {
        if active { Self::Wholesale } else { Self::Retail }
    }
}

/// Retail and wholesale unit prices for a single variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPrices {
    /// Price per unit below the wholesale threshold.
    #[serde(rename = "unitPriceRetail")]
    pub retail: Decimal,
    /// Price per unit at or above the wholesale threshold.
    #[serde(rename = "unitPriceWholesale")]
    pub wholesale: Decimal,
}

impl UnitPrices {
    /// Create a new price pair.
    #[must_use]
    pub const fn new(retail: Decimal, wholesale: Decimal) -> Self {
        Self { retail, wholesale }
    }

    /// Unit price for a tier.
    #[must_use]
    pub const fn for_tier(&self, tier: PriceTier) -> Decimal {
        match tier {
            PriceTier::Retail => self.retail,
            PriceTier::Wholesale => self.wholesale,
        }
    }
}

/// Format a decimal amount as a dollar string (e.g. `$12.50`).
#[must_use]
pub fn format_amount(amount: Decimal) -> String {
    format!("${:.2}", amount.round_dp(2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_tier() {
        let prices = UnitPrices::new(Decimal::new(1000, 2), Decimal::new(800, 2));
        assert_eq!(prices.for_tier(PriceTier::Retail), Decimal::new(1000, 2));
        assert_eq!(prices.for_tier(PriceTier::Wholesale), Decimal::new(800, 2));
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(Decimal::new(125, 1)), "$12.50");
        assert_eq!(format_amount(Decimal::ZERO), "$0.00");
    }
}
