//! Calculation outputs
//!
//! The forward path produces an [`OrderForecast`]; the backward path
//! produces an [`OrderBreakdown`] with the same shape plus the list of
//! discounts that could not be safely re-attributed. Both are consumed by
//! the billing-forecast report and the recurring-cron dry run.

use super::discount::DiscountSet;
use super::shipping::ShippingQuote;
use super::tax::TaxQuote;
use serde::{Deserialize, Serialize};

/// Per-line calculation result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineReport {
    pub product_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub name: String,
    /// Forward: resolved next-bill unit price. Backward: reconstructed
    /// pre-discount base unit price.
    pub unit_price: f64,
    pub quantity: i32,
    /// Pre-discount line amount
    pub subtotal: f64,
    /// Post-discount line amount
    pub total: f64,
    #[serde(default, skip_serializing_if = "DiscountSet::is_empty")]
    pub discounts: DiscountSet,
    #[serde(default)]
    pub tax_amount: f64,
}

/// Forward-path result: the next-bill estimate for one order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderForecast {
    pub order_id: String,
    pub total: f64,
    pub subtotal: f64,
    /// Order-level discounts (line-level ones live on the lines)
    #[serde(default, skip_serializing_if = "DiscountSet::is_empty")]
    pub discounts: DiscountSet,
    pub shipping: ShippingQuote,
    pub tax: TaxQuote,
    pub lines: Vec<LineReport>,
}

/// Backward-path result: the discount breakdown of an already-billed order.
///
/// `total` always equals the externally stored ground-truth total when one
/// exists; discounts listed in `excluded_from_calculation` are reported but
/// were not folded back into the reconstructed base prices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderBreakdown {
    pub order_id: String,
    pub total: f64,
    pub subtotal: f64,
    #[serde(default, skip_serializing_if = "DiscountSet::is_empty")]
    pub discounts: DiscountSet,
    pub shipping: ShippingQuote,
    pub tax: TaxQuote,
    pub lines: Vec<LineReport>,
    /// Canonical names of discounts that could not be attributed to lines
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_from_calculation: Vec<String>,
}
