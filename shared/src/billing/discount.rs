//! Discount catalog
//!
//! The fixed set of discount kinds an order or line item may carry, the
//! global application order, and the tagged amount map. Storage order of
//! recorded discounts is irrelevant; the application order is the static
//! slice below, in both the forward and backward direction.

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Discount kind enum
///
/// One variant per discount the billing system knows about. Unknown names
/// coming in from a persisted ledger are rejected at the boundary via
/// [`DiscountKind::parse`], never silently accepted.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountKind {
    /// Discount for paying N cycles up front
    Prepaid,
    /// Discount tied to the chosen payment-frequency plan
    BillingModel,
    /// Blanket rebill incentive
    Rebill,
    /// Discount granted when a payment was recovered via retry logic
    Retry,
    /// Tiered discount keyed to total purchased unit count
    Volume,
    /// Campaign coupon / buy-X-get-Y
    Coupon,
}

impl DiscountKind {
    /// Order in which discounts are applied on the forward path.
    ///
    /// Volume pricing is folded in first (it replaces the unit price), then
    /// the per-line stack, then the coupon once shipping is fixed.
    pub const APPLICATION_ORDER: [DiscountKind; 6] = [
        DiscountKind::Volume,
        DiscountKind::Prepaid,
        DiscountKind::BillingModel,
        DiscountKind::Rebill,
        DiscountKind::Retry,
        DiscountKind::Coupon,
    ];

    /// Order in which recorded discounts are undone when reconstructing a
    /// billed order. Newest-applied first.
    pub const UNDO_ORDER: [DiscountKind; 6] = [
        DiscountKind::Coupon,
        DiscountKind::Retry,
        DiscountKind::Rebill,
        DiscountKind::Prepaid,
        DiscountKind::Volume,
        DiscountKind::BillingModel,
    ];

    /// Canonical ledger name for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountKind::Prepaid => "PREPAID",
            DiscountKind::BillingModel => "BILLING_MODEL",
            DiscountKind::Rebill => "REBILL",
            DiscountKind::Retry => "RETRY",
            DiscountKind::Volume => "VOLUME",
            DiscountKind::Coupon => "COUPON",
        }
    }

    /// Parse a ledger name into a kind. Fails on anything outside the
    /// fixed catalog.
    pub fn parse(name: &str) -> Result<Self, UnknownDiscountError> {
        match name {
            "PREPAID" => Ok(DiscountKind::Prepaid),
            "BILLING_MODEL" => Ok(DiscountKind::BillingModel),
            "REBILL" => Ok(DiscountKind::Rebill),
            "RETRY" => Ok(DiscountKind::Retry),
            "VOLUME" => Ok(DiscountKind::Volume),
            "COUPON" => Ok(DiscountKind::Coupon),
            other => Err(UnknownDiscountError(other.to_string())),
        }
    }
}

impl std::fmt::Display for DiscountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discount name that is not part of the fixed catalog
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown discount kind: {0}")]
pub struct UnknownDiscountError(pub String);

/// Tagged map of discount amounts, one amount per kind per owner.
///
/// Insertion order is irrelevant; iteration follows the enum declaration
/// order but consumers must use the static application/undo slices for
/// ordering decisions. Serializes as a name → amount JSON map.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiscountSet(BTreeMap<DiscountKind, f64>);

impl DiscountSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the amount recorded for a kind
    pub fn set(&mut self, kind: DiscountKind, amount: f64) {
        self.0.insert(kind, amount);
    }

    /// Accumulate onto the amount recorded for a kind
    pub fn add(&mut self, kind: DiscountKind, amount: f64) {
        *self.0.entry(kind).or_insert(0.0) += amount;
    }

    /// Amount recorded for a kind, if any
    pub fn get(&self, kind: DiscountKind) -> Option<f64> {
        self.0.get(&kind).copied()
    }

    /// Amount recorded for a kind, defaulting to zero
    pub fn amount(&self, kind: DiscountKind) -> f64 {
        self.get(kind).unwrap_or(0.0)
    }

    /// Remove and return the amount recorded for a kind
    pub fn remove(&mut self, kind: DiscountKind) -> Option<f64> {
        self.0.remove(&kind)
    }

    pub fn contains(&self, kind: DiscountKind) -> bool {
        self.0.contains_key(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DiscountKind, f64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    /// Sum of all recorded amounts, computed in decimal to avoid float
    /// accumulation drift, returned at 2 decimal places.
    pub fn total(&self) -> f64 {
        let total: Decimal = self
            .0
            .values()
            .map(|v| Decimal::from_f64(*v).unwrap_or_default())
            .sum();
        total
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            .to_f64()
            .unwrap_or_default()
    }

    /// Accumulate every entry of `other` into this set
    pub fn merge(&mut self, other: &DiscountSet) {
        for (kind, amount) in other.iter() {
            self.add(kind, amount);
        }
    }
}
