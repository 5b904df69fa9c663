//! Order snapshot - aggregate read model for one recurring order
//!
//! Carries the line items, offer configuration, shipping/coupon selection
//! and, for already-billed orders, the persisted ledger side: discount
//! entries, stored totals and history notes. The stored total is the
//! ground truth; the engine never overwrites it.

use super::discount::DiscountSet;
use super::line_item::{LineItemSnapshot, OfferConfig};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Coupon selection on an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CouponRef {
    pub campaign_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Buy-X-get-Y promotion id, used instead of a code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bxgy_id: Option<String>,
}

/// One persisted discount ledger entry, as stored by the billing system
///
/// Names are parsed against the fixed catalog at the boundary; entries with
/// unknown names are a data error, not something to silently keep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerDiscount {
    pub name: String,
    pub amount: f64,
}

/// Order snapshot - everything one calculation pass needs, loaded up front
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderSnapshot {
    /// Order ID
    pub id: String,
    /// Line items, main item first when present
    pub line_items: Vec<LineItemSnapshot>,
    /// Offer configuration for the subscription
    #[serde(default)]
    pub offer: OfferConfig,
    /// Currently selected shipping method
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_method_id: Option<String>,
    /// Destination country (drives regional tax lookup and VAT gating)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Discounts that could not be attributed to a specific line item
    #[serde(default, skip_serializing_if = "DiscountSet::is_empty")]
    pub order_discounts: DiscountSet,
    /// Blanket rebill incentive percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rebill_discount_percent: Option<f64>,
    /// Retry-recovery discount percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_discount_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon: Option<CouponRef>,

    // === Stored ledger side (backward path inputs) ===
    /// Billed order total as persisted - the ground truth
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_total: Option<f64>,
    /// Billed shipping charge as persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_shipping_amount: Option<f64>,
    /// Billed tax (sales tax + VAT) as persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_tax_amount: Option<f64>,
    /// Order-level discount ledger entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ledger: Vec<LedgerDiscount>,
    /// Free-form history notes; scanned for the discounted-shipping marker
    /// during retry reconstruction
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history_notes: Vec<String>,
}

impl OrderSnapshot {
    /// Create an empty order
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            line_items: Vec::new(),
            offer: OfferConfig::default(),
            shipping_method_id: None,
            country: None,
            order_discounts: DiscountSet::new(),
            rebill_discount_percent: None,
            retry_discount_percent: None,
            coupon: None,
            stored_total: None,
            stored_shipping_amount: None,
            stored_tax_amount: None,
            ledger: Vec::new(),
            history_notes: Vec::new(),
        }
    }

    /// The main line item, if the order has one
    pub fn main_item(&self) -> Option<&LineItemSnapshot> {
        self.line_items.iter().find(|l| l.is_main)
    }

    /// Soonest recurring date across all line items.
    ///
    /// Used when a calculation is requested without an explicit target date;
    /// the recurring-billing cron and the forecast must agree on this pick.
    pub fn soonest_recurring_date(&self) -> Option<NaiveDate> {
        self.line_items
            .iter()
            .filter_map(|l| l.recurring_date)
            .min()
    }

    /// Ledger entry by canonical name, if present
    pub fn ledger_amount(&self, name: &str) -> Option<f64> {
        self.ledger.iter().find(|e| e.name == name).map(|e| e.amount)
    }
}
