//! Line item and offer snapshots
//!
//! A line item is one billable subscription position (main product or an
//! upsell). Snapshots carry everything the pricer needs up front so the
//! engine never fetches mid-calculation.

use super::discount::DiscountSet;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Offer type for the subscription this order belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferType {
    #[default]
    Standard,
    Prepaid,
    Seasonal,
    Series,
}

/// Prepaid billing profile: N future recurrences charged up front
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrepaidProfile {
    /// Number of cycles charged up front
    pub cycles: i32,
    /// Discount granted for prepaying, percent of the base unit price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_percent: Option<f64>,
    /// Charge shipping once at the full rate
    #[serde(default)]
    pub shipping_once: bool,
    /// Multiply the shipping charge by the prepaid cycle count
    #[serde(default)]
    pub shipping_per_cycle: bool,
}

/// One step of a multi-step trial pricing sequence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrialStep {
    /// Unit price charged at this step
    pub price: f64,
    /// Shipping override for this step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_price: Option<f64>,
}

/// Trial workflow: ordered steps, indexed by trial depth
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TrialWorkflow {
    pub steps: Vec<TrialStep>,
}

impl TrialWorkflow {
    /// Step for a given trial depth, if the workflow defines one
    pub fn step_at(&self, depth: i32) -> Option<&TrialStep> {
        if depth < 0 {
            return None;
        }
        self.steps.get(depth as usize)
    }
}

/// Offer configuration shared by all line items of an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OfferConfig {
    #[serde(default)]
    pub offer_type: OfferType,
    /// Billing-model discount as a percent of the base unit price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_model_percent: Option<f64>,
    /// Billing-model discount as a flat per-unit amount
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_model_flat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prepaid: Option<PrepaidProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial: Option<TrialWorkflow>,
    /// Whether the tiered volume discount feature is active for this offer
    #[serde(default)]
    pub volume_discount_enabled: bool,
}

/// Bundle component: a child position inside a per-item priced bundle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleComponent {
    pub product_id: String,
    pub quantity: i32,
    pub unit_price: f64,
}

/// Line item snapshot - one subscription billing position
///
/// Rehydrated fresh for each calculation from the read model. The engine
/// mutates only in-memory working copies derived from this; the snapshot
/// itself is never written back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItemSnapshot {
    /// Product ID
    pub product_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    /// Product name snapshot (for reports)
    #[serde(default)]
    pub name: String,
    /// Quantity (>= 1)
    pub quantity: i32,
    /// Pre-discount unit price
    pub base_price: f64,
    /// Number of prepaid cycles; > 1 marks the line prepaid
    #[serde(default = "default_one")]
    pub prepaid_cycles: i32,
    /// 1-based index of the cycle currently being billed
    #[serde(default = "default_one")]
    pub current_prepaid_cycle: i32,
    #[serde(default)]
    pub is_bundle: bool,
    /// Bundle components, ordered (per-item priced bundles)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<BundleComponent>,
    /// Main product of the order (affects sort order and shipping eligibility)
    #[serde(default)]
    pub is_main: bool,
    /// Upsell / add-on position
    #[serde(default)]
    pub is_addon: bool,
    /// Whether the line recurs; one-off positions can be excluded from
    /// volume eligibility
    #[serde(default = "default_true")]
    pub recurring: bool,
    /// Billing cycle depth; negative values are trial/initial depth
    #[serde(default)]
    pub cycle_depth: i32,
    /// Next recurring date for this line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring_date: Option<NaiveDate>,
    #[serde(default = "default_true")]
    pub shippable: bool,
    #[serde(default = "default_true")]
    pub taxable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_code: Option<String>,

    // === Next-bill overrides ===
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_product_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_variant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_quantity: Option<i32>,
    /// Explicit next recurring price override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_recurring_price: Option<f64>,
    /// Price preservation: the override is kept verbatim across catalog
    /// price changes
    #[serde(default)]
    pub price_preserved: bool,
    /// Whether the override price already folds the billing-model discount in
    #[serde(default)]
    pub override_includes_billing_model: bool,
    /// Pre-calculated volume-discounted unit price, when the volume feature
    /// has already run for this line (includes the billing-model discount)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_price_snapshot: Option<f64>,
    /// Depth within a trial-delay sequence, when the line is in one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_delay_depth: Option<i32>,
    /// Line-level shipping method override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_method_override: Option<String>,

    // === Stored ledger side (backward path inputs) ===
    /// Discounts recorded against this line when it was billed
    #[serde(default, skip_serializing_if = "DiscountSet::is_empty")]
    pub discounts: DiscountSet,
    /// Final billed line total
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_total: Option<f64>,
    /// Billed unit price as persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_unit_price: Option<f64>,
}

fn default_one() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

impl LineItemSnapshot {
    /// Create a plain line with defaults for everything optional
    pub fn new(product_id: impl Into<String>, base_price: f64, quantity: i32) -> Self {
        Self {
            product_id: product_id.into(),
            variant_id: None,
            name: String::new(),
            quantity,
            base_price,
            prepaid_cycles: 1,
            current_prepaid_cycle: 1,
            is_bundle: false,
            children: Vec::new(),
            is_main: false,
            is_addon: false,
            recurring: true,
            cycle_depth: 0,
            recurring_date: None,
            shippable: true,
            taxable: true,
            tax_code: None,
            next_product_id: None,
            next_variant_id: None,
            next_quantity: None,
            next_recurring_price: None,
            price_preserved: false,
            override_includes_billing_model: false,
            volume_price_snapshot: None,
            trial_delay_depth: None,
            shipping_method_override: None,
            discounts: DiscountSet::new(),
            stored_total: None,
            stored_unit_price: None,
        }
    }

    /// Prepaid lines carry more than one cycle
    pub fn is_prepaid(&self) -> bool {
        self.prepaid_cycles > 1
    }

    /// Whether this bill lands on the final prepaid cycle
    pub fn is_final_prepaid_cycle(&self) -> bool {
        self.is_prepaid() && self.current_prepaid_cycle >= self.prepaid_cycles
    }
}
