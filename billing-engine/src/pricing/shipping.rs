//! Shipping amount rules
//!
//! Candidate method resolution (line override, then the order's current
//! method, then the last-used historical method) and the charge itself:
//! flat or threshold-based on the discounted running total, with
//! prepaid/trial-workflow overrides on top.

use crate::common::error::BillingError;
use crate::gateway::ShippingGateway;
use crate::money::{clamp_non_negative, to_decimal, to_f64};
use rust_decimal::prelude::*;
use shared::billing::{
    LineItemSnapshot, OfferConfig, OrderSnapshot, ShippingMethodRecord, ShippingQuote,
};

/// Resolve the candidate shipping method for an order.
///
/// Priority: line-item override, then the order's current method, then the
/// last-used historical method. Explicitly referenced methods that are
/// missing from the shipping store fail the calculation.
pub fn resolve_method(
    order: &OrderSnapshot,
    line_override: Option<&str>,
    gateway: &dyn ShippingGateway,
) -> Result<Option<ShippingMethodRecord>, BillingError> {
    if let Some(override_id) = line_override {
        return gateway.method(override_id).map(Some);
    }
    if let Some(method_id) = &order.shipping_method_id {
        return gateway.method(method_id).map(Some);
    }
    Ok(gateway.last_used_method(&order.id))
}

/// Base charge for a method given the discounted running order total.
///
/// Threshold methods switch to the reduced charge once the running total
/// crosses the configured amount.
pub fn base_amount(method: &ShippingMethodRecord, discounted_total: Decimal) -> Decimal {
    if let Some(threshold) = method.threshold_amount {
        if discounted_total >= to_decimal(threshold) {
            return to_decimal(method.threshold_charge_amount.unwrap_or(method.amount));
        }
    }
    to_decimal(method.amount)
}

/// Apply offer-level shipping rules on top of the base charge.
///
/// A trial step's shipping price replaces the charge outright. Prepaid
/// profiles either charge once at the full rate or multiply the charge by
/// the prepaid cycle count.
pub fn apply_offer_rules(
    base: Decimal,
    offer: &OfferConfig,
    main_line: Option<&LineItemSnapshot>,
) -> Decimal {
    if let Some(main) = main_line {
        if let Some(depth) = main.trial_delay_depth {
            if let Some(step) = offer.trial.as_ref().and_then(|t| t.step_at(depth)) {
                if let Some(shipping_price) = step.shipping_price {
                    return to_decimal(shipping_price);
                }
            }
        }
    }

    if let Some(prepaid) = &offer.prepaid {
        if prepaid.shipping_per_cycle {
            return base * Decimal::from(prepaid.cycles);
        }
        // shipping_once charges the flat rate a single time
    }

    base
}

/// Build the order's shipping quote from a resolved method.
pub fn compute_quote(
    method: &ShippingMethodRecord,
    discounted_total: Decimal,
    offer: &OfferConfig,
    main_line: Option<&LineItemSnapshot>,
) -> ShippingQuote {
    let base = base_amount(method, discounted_total);
    let amount = clamp_non_negative(apply_offer_rules(base, offer, main_line));

    ShippingQuote {
        amount: to_f64(amount),
        discount: 0.0,
        taxable_amount: to_f64(amount),
        tax_percentage: method.tax_percentage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::billing::{PrepaidProfile, TrialStep, TrialWorkflow};

    fn method(amount: f64) -> ShippingMethodRecord {
        ShippingMethodRecord {
            id: "ship-1".to_string(),
            name: "Standard".to_string(),
            amount,
            threshold_amount: None,
            threshold_charge_amount: None,
            tax_percentage: 0.0,
        }
    }

    #[test]
    fn test_flat_amount() {
        let m = method(4.99);
        assert_eq!(base_amount(&m, to_decimal(10.0)), to_decimal(4.99));
    }

    #[test]
    fn test_threshold_switches_charge() {
        let mut m = method(4.99);
        m.threshold_amount = Some(50.0);
        m.threshold_charge_amount = Some(0.0);

        // Below the threshold: full charge
        assert_eq!(base_amount(&m, to_decimal(49.99)), to_decimal(4.99));
        // At and above: reduced charge
        assert_eq!(base_amount(&m, to_decimal(50.0)), Decimal::ZERO);
        assert_eq!(base_amount(&m, to_decimal(80.0)), Decimal::ZERO);
    }

    #[test]
    fn test_prepaid_per_cycle_multiplies() {
        let mut offer = OfferConfig::default();
        offer.prepaid = Some(PrepaidProfile {
            cycles: 3,
            discount_percent: None,
            shipping_once: false,
            shipping_per_cycle: true,
        });

        let charged = apply_offer_rules(to_decimal(4.99), &offer, None);
        // 4.99 x 3 = 14.97
        assert_eq!(to_f64(charged), 14.97);
    }

    #[test]
    fn test_prepaid_once_keeps_flat_charge() {
        let mut offer = OfferConfig::default();
        offer.prepaid = Some(PrepaidProfile {
            cycles: 3,
            discount_percent: None,
            shipping_once: true,
            shipping_per_cycle: false,
        });

        let charged = apply_offer_rules(to_decimal(4.99), &offer, None);
        assert_eq!(to_f64(charged), 4.99);
    }

    #[test]
    fn test_trial_step_overrides_charge() {
        let mut offer = OfferConfig::default();
        offer.trial = Some(TrialWorkflow {
            steps: vec![TrialStep { price: 0.99, shipping_price: Some(1.5) }],
        });

        let mut main = LineItemSnapshot::new("p1", 10.0, 1);
        main.is_main = true;
        main.trial_delay_depth = Some(0);

        let charged = apply_offer_rules(to_decimal(4.99), &offer, Some(&main));
        assert_eq!(to_f64(charged), 1.5);

        // Outside the trial the base charge stands
        main.trial_delay_depth = None;
        let charged = apply_offer_rules(to_decimal(4.99), &offer, Some(&main));
        assert_eq!(to_f64(charged), 4.99);
    }
}
