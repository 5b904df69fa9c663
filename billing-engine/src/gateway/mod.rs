//! Read-only collaborator gateways
//!
//! The engine never reaches into storage mid-calculation: every trait here
//! returns fully-populated snapshots up front, and all calls are
//! synchronous. Async wrapping, caching and persistence belong to the
//! caller side of these seams.

use crate::common::error::BillingError;
use serde::{Deserialize, Serialize};
use shared::billing::{LineTaxDetail, OrderSnapshot, ShippingMethodRecord};

// =============================================================================
// Catalog records
// =============================================================================

/// Product as seen by the pricing engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub price: f64,
    #[serde(default = "default_true")]
    pub taxable: bool,
    #[serde(default = "default_true")]
    pub shippable: bool,
    #[serde(default)]
    pub is_bundle: bool,
    /// Fixed-price bundles use the product's own price; per-item bundles
    /// sum their component prices
    #[serde(default)]
    pub bundle_fixed_price: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_code: Option<String>,
}

/// Product variant as seen by the pricing engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariantRecord {
    pub id: String,
    pub product_id: String,
    pub price: f64,
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Tax provider
// =============================================================================

/// One itemized line sent to the tax provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaxRequestLine {
    pub product_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_code: Option<String>,
    /// Post-discount line amount
    pub amount: f64,
}

/// Input to an external tax lookup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaxRequest {
    pub taxable_amount: f64,
    pub shipping_amount: f64,
    pub lines: Vec<TaxRequestLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Provider-specific tax result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TaxComputation {
    pub tax_amount: f64,
    pub tax_rate_percent: f64,
    #[serde(default)]
    pub shipping_taxed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub per_line: Vec<LineTaxDetail>,
}

// =============================================================================
// Coupon service
// =============================================================================

/// One line handed to coupon evaluation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CouponRequestLine {
    pub product_id: String,
    pub quantity: i32,
    /// Current post-discount line total
    pub total: f64,
}

/// Input to coupon evaluation; shipping must already be fixed because
/// coupon thresholds and shipping discounts are computed against it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CouponRequest {
    pub campaign_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bxgy_id: Option<String>,
    pub shipping_amount: f64,
    pub lines: Vec<CouponRequestLine>,
}

/// Per-line share of an evaluated coupon discount
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CouponLineDiscount {
    pub product_id: String,
    pub amount: f64,
}

/// Result of coupon evaluation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CouponEvaluation {
    pub total_discount: f64,
    #[serde(default)]
    pub shipping_discount: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub per_line: Vec<CouponLineDiscount>,
    #[serde(default)]
    pub is_buy_x_get_y: bool,
}

// =============================================================================
// Gateway traits
// =============================================================================

/// Order/subscription read model plus product catalog lookups.
///
/// Missing references are lookup failures, not defaults: the engine
/// propagates them uncaught.
pub trait BillingReadModel {
    fn load_order(&self, order_id: &str) -> Result<OrderSnapshot, BillingError>;
    fn product(&self, product_id: &str) -> Result<ProductRecord, BillingError>;
    fn variant(&self, variant_id: &str) -> Result<VariantRecord, BillingError>;
}

/// Shipping method storage, including the historical "last used" lookup
pub trait ShippingGateway {
    fn method(&self, id: &str) -> Result<ShippingMethodRecord, BillingError>;
    /// Most recently used method for this order, if any was recorded
    fn last_used_method(&self, order_id: &str) -> Option<ShippingMethodRecord>;
}

/// Third-party tax lookup
pub trait TaxProvider {
    fn compute_tax(&self, request: &TaxRequest) -> Result<TaxComputation, BillingError>;
}

/// Coupon-discount evaluation service
pub trait CouponService {
    fn evaluate(&self, request: &CouponRequest) -> Result<CouponEvaluation, BillingError>;
}
