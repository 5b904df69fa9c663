//! Tax quotes and the manual regional profile

use serde::{Deserialize, Serialize};

/// Per-line tax detail
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineTaxDetail {
    pub product_id: String,
    pub tax_amount: f64,
    pub rate_percent: f64,
}

/// Tax result for one order calculation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TaxQuote {
    pub sales_tax_percent: f64,
    pub tax_amount: f64,
    #[serde(default)]
    pub vat_percent: f64,
    #[serde(default)]
    pub vat_amount: f64,
    /// Whether the shipping charge was taxed
    #[serde(default)]
    pub shipping_taxed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub per_line: Vec<LineTaxDetail>,
}

impl TaxQuote {
    /// Combined sales tax + VAT
    pub fn total(&self) -> f64 {
        self.tax_amount + self.vat_amount
    }
}

/// Manually configured regional tax profile.
///
/// Matched most-specific-first by country/state/county/city; unset fields
/// match anything. VAT only applies once the order crosses the configured
/// minimum order value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionalTaxProfile {
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    pub rate_percent: f64,
    #[serde(default)]
    pub vat_percent: f64,
    /// Minimum post-discount order value before VAT applies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vat_minimum_order: Option<f64>,
}
