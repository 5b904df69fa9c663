//! Line Item Pricer
//!
//! Resolves, for one subscription line, the product/variant/quantity/unit
//! price of the *next* bill from its persisted next-billing configuration.
//! Pure read + compute: no writes, no side effects. Unresolved catalog
//! references propagate as lookup failures; this module never synthesizes
//! defaults for missing data.

use crate::common::error::BillingError;
use crate::gateway::BillingReadModel;
use crate::money::{to_decimal, to_f64};
use rust_decimal::prelude::*;
use shared::billing::{LineItemSnapshot, OfferConfig};

/// Resolved next-bill price for one line
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: i32,
    pub unit_price: f64,
    /// Whether the billing-model discount still applies on top of this
    /// price. False when the resolved price already folds it in (volume
    /// snapshots, overrides marked as inclusive) or the line is prepaid.
    pub billing_model_applies: bool,
}

/// Resolve the next-bill price for a line. Priority order, first match wins:
///
/// 1. Pre-calculated volume-discounted price (already includes the
///    billing-model discount)
/// 2. Trial-delay price from the offer's trial workflow
/// 3. Recomputed bundle subtotal (fixed-price or per-item)
/// 4. Prepaid final-cycle multiplier; non-final prepaid cycles bill zero
/// 5. Explicit next-recurring-price override
/// 6. Variant price if set, else product price
pub fn resolve_next_price(
    line: &LineItemSnapshot,
    offer: &OfferConfig,
    catalog: &dyn BillingReadModel,
) -> Result<PricedLine, BillingError> {
    let product_id = line
        .next_product_id
        .clone()
        .unwrap_or_else(|| line.product_id.clone());
    let variant_id = line.next_variant_id.clone().or_else(|| line.variant_id.clone());
    let quantity = line.next_quantity.unwrap_or(line.quantity);

    // Catalog miss fails the whole calculation; a silent default here would
    // corrupt billing.
    let product = catalog.product(&product_id)?;

    let priced = |unit_price: f64, billing_model_applies: bool| PricedLine {
        product_id: product_id.clone(),
        variant_id: variant_id.clone(),
        quantity,
        unit_price,
        billing_model_applies,
    };

    // 1. Volume-discounted snapshot
    if offer.volume_discount_enabled {
        if let Some(snapshot_price) = line.volume_price_snapshot {
            return Ok(priced(snapshot_price, false));
        }
    }

    // 2. Trial-delay price
    if let Some(depth) = line.trial_delay_depth {
        if let Some(step) = offer.trial.as_ref().and_then(|t| t.step_at(depth)) {
            return Ok(priced(step.price, true));
        }
    }

    // 3. Bundle subtotal
    if product.is_bundle {
        let unit_price = if product.bundle_fixed_price {
            product.price
        } else {
            let sum: Decimal = line
                .children
                .iter()
                .map(|c| to_decimal(c.unit_price) * Decimal::from(c.quantity))
                .sum();
            to_f64(sum)
        };
        return Ok(priced(unit_price, true));
    }

    // 4. Prepaid cycles: the final cycle charges the whole next term,
    //    every other cycle is already paid.
    if line.is_prepaid() {
        let unit_price = if line.is_final_prepaid_cycle() {
            to_f64(to_decimal(line.base_price) * Decimal::from(line.prepaid_cycles))
        } else {
            0.0
        };
        return Ok(priced(unit_price, false));
    }

    // 5. Explicit next-recurring-price override
    if let Some(override_price) = line.next_recurring_price {
        let unit_price = if line.price_preserved || line.is_addon {
            override_price
        } else if line.cycle_depth < 0
            && let Some(step) = offer
                .trial
                .as_ref()
                .and_then(|t| t.step_at(-line.cycle_depth - 1))
        {
            // Still inside the trial workflow: the step price wins
            step.price
        } else {
            override_price
        };
        return Ok(priced(unit_price, !line.override_includes_billing_model));
    }

    // 6. Fallback: variant price, else product price
    if let Some(vid) = &variant_id {
        let variant = catalog.variant(vid)?;
        return Ok(priced(variant.price, true));
    }
    Ok(priced(product.price, true))
}
