//! Shipping method records and quotes

use serde::{Deserialize, Serialize};

/// Shipping method as stored by the shipping subsystem
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShippingMethodRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Flat charge
    pub amount: f64,
    /// Order total at which the reduced charge kicks in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_amount: Option<f64>,
    /// Reduced charge once the threshold is crossed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_charge_amount: Option<f64>,
    /// Tax rate applied to the shipping charge
    #[serde(default)]
    pub tax_percentage: f64,
}

/// Shipping result for one order calculation.
///
/// Derived once per order per calculation; not owned by any line item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ShippingQuote {
    /// Charge before any coupon shipping discount
    pub amount: f64,
    /// Coupon-granted shipping discount
    #[serde(default)]
    pub discount: f64,
    /// Portion of the charge subject to shipping tax
    #[serde(default)]
    pub taxable_amount: f64,
    /// Tax rate on the shipping charge
    #[serde(default)]
    pub tax_percentage: f64,
}

impl ShippingQuote {
    /// Net shipping charge (amount minus discount, never negative)
    pub fn total(&self) -> f64 {
        (self.amount - self.discount).max(0.0)
    }
}
