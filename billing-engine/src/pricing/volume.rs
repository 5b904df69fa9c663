//! Volume Discount Engine
//!
//! Determines whether a tiered quantity-based discount applies to a set of
//! line items and, if so, how much. The aggregate discount is spread with
//! the exact-cent distributor. No applicable tier is a legitimate
//! zero-result, never an error.

use super::distributor::{distribute, Distribution, TierAdjustment, WeightedKey};
use serde::{Deserialize, Serialize};
use shared::billing::LineItemSnapshot;

/// One tier of the volume discount ladder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeTier {
    /// Minimum eligible unit count for this tier
    pub min_units: i64,
    /// Discount percent of the blended unit price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    /// Flat per-unit discount, used when no percent is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flat: Option<f64>,
}

impl VolumeTier {
    /// Adjustment this tier applies to the blended unit price
    pub fn adjustment(&self) -> TierAdjustment {
        match (self.percent, self.flat) {
            (Some(pct), _) => TierAdjustment::Percentage(pct),
            (None, Some(flat)) => TierAdjustment::FixedAmount(flat),
            (None, None) => TierAdjustment::Percentage(0.0),
        }
    }
}

/// Injected configuration for the volume discount feature
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VolumeDiscountConfig {
    /// Tiers, matched by the highest `min_units` not exceeding the count
    pub tiers: Vec<VolumeTier>,
    /// Exclude non-recurring positions from the eligible unit count
    #[serde(default)]
    pub exclude_non_recurring: bool,
    /// When set, only these products count toward the tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_whitelist: Option<Vec<String>>,
}

/// Tiered quantity-based discount engine
#[derive(Debug, Clone)]
pub struct VolumeDiscountEngine {
    config: VolumeDiscountConfig,
}

impl VolumeDiscountEngine {
    pub fn new(config: VolumeDiscountConfig) -> Self {
        Self { config }
    }

    /// Whether a line counts toward the eligible unit total
    pub fn is_eligible(&self, line: &LineItemSnapshot) -> bool {
        if self.config.exclude_non_recurring && !line.recurring {
            return false;
        }
        if let Some(whitelist) = &self.config.product_whitelist {
            if !whitelist.iter().any(|p| p == &line.product_id) {
                return false;
            }
        }
        true
    }

    /// Total eligible unit count across a filtered line-item set
    pub fn eligible_unit_count(&self, lines: &[LineItemSnapshot]) -> i64 {
        lines
            .iter()
            .filter(|l| self.is_eligible(l))
            .map(|l| l.quantity as i64)
            .sum()
    }

    /// Tier for a given eligible unit count: the highest tier whose
    /// `min_units` the count reaches. `None` when no tier applies.
    pub fn discount_for_unit_count(&self, total_units: i64) -> Option<&VolumeTier> {
        self.config
            .tiers
            .iter()
            .filter(|t| t.min_units <= total_units)
            .max_by_key(|t| t.min_units)
    }

    /// Evaluate the volume discount over pre-built weighted keys.
    ///
    /// The caller supplies one key per eligible line; `None` means no tier
    /// matched or there was nothing to distribute over.
    pub fn evaluate(&self, keys: &[WeightedKey]) -> Option<Distribution> {
        let total_units: i64 = keys.iter().map(|k| k.units).sum();
        let tier = self.discount_for_unit_count(total_units)?;
        distribute(keys, &tier.adjustment())
    }
}
