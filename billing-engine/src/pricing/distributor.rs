//! Discount Distributor
//!
//! Splits an aggregate discount across a weighted set of line items
//! without leaking or duplicating cents. The discount is computed against
//! a single blended per-unit price, then apportioned back across the
//! original per-key weights proportionally; the last key absorbs any
//! rounding residual so the portions always sum to the aggregate exactly.

use crate::money::{round_cents, round_intermediate, to_decimal, to_f64};
use rust_decimal::prelude::*;

/// How a discount tier adjusts the blended unit price
#[derive(Debug, Clone, PartialEq)]
pub enum TierAdjustment {
    /// Percent of the blended unit price (10.0 = 10%)
    Percentage(f64),
    /// Flat amount off the blended unit price, capped at the blended price
    FixedAmount(f64),
}

/// One weighted key: a line item's eligible units at its current unit price
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedKey {
    pub key: String,
    pub units: i64,
    pub unit_price: f64,
}

impl WeightedKey {
    /// Monetary weight of this key (units x unit price)
    fn weight(&self) -> Decimal {
        to_decimal(self.unit_price) * Decimal::from(self.units)
    }
}

/// Result of distributing a discount across weighted keys
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    /// Blended per-unit price across all keys
    pub blended_unit_price: f64,
    /// Blended per-unit price after the tier discount
    pub discounted_unit_price: f64,
    /// Aggregate discount, in whole cents
    pub total_discount: f64,
    /// Per-key discount portions; sums to `total_discount` exactly
    pub portions: Vec<(String, f64)>,
    /// Per-key discounted amounts (weight minus portion)
    pub discounted_prices: Vec<(String, f64)>,
}

/// Distribute a tier discount across weighted keys.
///
/// Returns `None` when there is nothing to distribute over (no keys, no
/// units, or a zero-weight map).
pub fn distribute(keys: &[WeightedKey], adjustment: &TierAdjustment) -> Option<Distribution> {
    let total_units: Decimal = keys.iter().map(|k| Decimal::from(k.units)).sum();
    let total_weight: Decimal = keys.iter().map(|k| k.weight()).sum();
    if total_units <= Decimal::ZERO || total_weight <= Decimal::ZERO {
        return None;
    }

    // Single blended per-unit price across all eligible keys
    let blended = round_intermediate(total_weight / total_units);

    let per_unit_discount = match adjustment {
        TierAdjustment::Percentage(pct) => {
            round_intermediate(blended * to_decimal(*pct) / Decimal::ONE_HUNDRED)
        }
        TierAdjustment::FixedAmount(flat) => to_decimal(*flat).min(blended),
    };
    if per_unit_discount <= Decimal::ZERO {
        return None;
    }

    // Aggregate lands on whole cents; the apportioning below conserves it.
    let aggregate = round_cents(per_unit_discount * total_units);

    let mut portions = Vec::with_capacity(keys.len());
    let mut discounted_prices = Vec::with_capacity(keys.len());
    let mut allocated = Decimal::ZERO;

    for (idx, key) in keys.iter().enumerate() {
        let portion = if idx + 1 == keys.len() {
            // Last key absorbs the residual cent(s)
            aggregate - allocated
        } else {
            round_cents(aggregate * key.weight() / total_weight)
        };
        allocated += portion;

        portions.push((key.key.clone(), to_f64(portion)));
        discounted_prices.push((key.key.clone(), to_f64(key.weight() - portion)));
    }

    Some(Distribution {
        blended_unit_price: to_f64(blended),
        discounted_unit_price: to_f64(blended - per_unit_discount),
        total_discount: to_f64(aggregate),
        portions,
        discounted_prices,
    })
}
