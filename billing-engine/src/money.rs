//! Money calculation utilities using rust_decimal for precision
//!
//! All calculations are done using `Decimal` internally, then converted to
//! `f64` for storage/serialization. External amounts carry 2 decimal
//! places; intermediate step results are kept at 4 decimal places so
//! per-step rounding cannot compound into a drifting total.

use crate::common::error::BillingError;
use rust_decimal::prelude::*;
use shared::billing::{LineItemSnapshot, OrderSnapshot};

/// Rounding for monetary values at the boundary (2 decimal places, half-up)
const DECIMAL_PLACES: u32 = 2;

/// Rounding for intermediate amounts carried between pipeline steps
const INTERMEDIATE_PLACES: u32 = 4;

/// Tolerance for monetary comparisons (0.01)
pub const MONEY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Maximum allowed unit price
const MAX_PRICE: f64 = 1_000_000.0;
/// Maximum allowed quantity per line
const MAX_QUANTITY: i32 = 9999;
/// Maximum allowed prepaid cycle count
const MAX_PREPAID_CYCLES: i32 = 120;

/// Validate that a f64 value is finite (not NaN, not Infinity)
#[inline]
fn require_finite(value: f64, field_name: &str) -> Result<(), BillingError> {
    if !value.is_finite() {
        return Err(BillingError::InvalidSnapshot(format!(
            "{} must be a finite number, got {}",
            field_name, value
        )));
    }
    Ok(())
}

fn require_price(value: f64, field_name: &str) -> Result<(), BillingError> {
    require_finite(value, field_name)?;
    if value < 0.0 {
        return Err(BillingError::InvalidSnapshot(format!(
            "{} must be non-negative, got {}",
            field_name, value
        )));
    }
    if value > MAX_PRICE {
        return Err(BillingError::InvalidSnapshot(format!(
            "{} exceeds maximum allowed ({}), got {}",
            field_name, MAX_PRICE, value
        )));
    }
    Ok(())
}

fn require_percent(value: f64, field_name: &str) -> Result<(), BillingError> {
    require_finite(value, field_name)?;
    if !(0.0..=100.0).contains(&value) {
        return Err(BillingError::InvalidSnapshot(format!(
            "{} must be between 0 and 100, got {}",
            field_name, value
        )));
    }
    Ok(())
}

/// Validate a line item snapshot before calculation
pub fn validate_line_item(line: &LineItemSnapshot) -> Result<(), BillingError> {
    require_price(line.base_price, "base_price")?;

    if line.quantity <= 0 {
        return Err(BillingError::InvalidSnapshot(format!(
            "quantity must be positive, got {}",
            line.quantity
        )));
    }
    if line.quantity > MAX_QUANTITY {
        return Err(BillingError::InvalidSnapshot(format!(
            "quantity exceeds maximum allowed ({}), got {}",
            MAX_QUANTITY, line.quantity
        )));
    }

    if line.prepaid_cycles < 1 {
        return Err(BillingError::InvalidSnapshot(format!(
            "prepaid_cycles must be at least 1, got {}",
            line.prepaid_cycles
        )));
    }
    if line.prepaid_cycles > MAX_PREPAID_CYCLES {
        return Err(BillingError::InvalidSnapshot(format!(
            "prepaid_cycles exceeds maximum allowed ({}), got {}",
            MAX_PREPAID_CYCLES, line.prepaid_cycles
        )));
    }
    if line.current_prepaid_cycle < 1 || line.current_prepaid_cycle > line.prepaid_cycles {
        return Err(BillingError::InvalidSnapshot(format!(
            "current_prepaid_cycle must be within 1..={}, got {}",
            line.prepaid_cycles, line.current_prepaid_cycle
        )));
    }

    if let Some(p) = line.next_recurring_price {
        require_price(p, "next_recurring_price")?;
    }
    if let Some(p) = line.volume_price_snapshot {
        require_price(p, "volume_price_snapshot")?;
    }
    if let Some(q) = line.next_quantity {
        if q <= 0 || q > MAX_QUANTITY {
            return Err(BillingError::InvalidSnapshot(format!(
                "next_quantity must be within 1..={}, got {}",
                MAX_QUANTITY, q
            )));
        }
    }

    for child in &line.children {
        require_price(child.unit_price, "bundle child unit_price")?;
        if child.quantity <= 0 {
            return Err(BillingError::InvalidSnapshot(format!(
                "bundle child quantity must be positive, got {} for product '{}'",
                child.quantity, child.product_id
            )));
        }
    }

    Ok(())
}

/// Validate an order snapshot before calculation
pub fn validate_order(order: &OrderSnapshot) -> Result<(), BillingError> {
    for line in &order.line_items {
        validate_line_item(line)?;
    }

    if let Some(p) = order.rebill_discount_percent {
        require_percent(p, "rebill_discount_percent")?;
    }
    if let Some(p) = order.retry_discount_percent {
        require_percent(p, "retry_discount_percent")?;
    }
    if let Some(pct) = order.offer.billing_model_percent {
        require_percent(pct, "billing_model_percent")?;
    }
    if let Some(flat) = order.offer.billing_model_flat {
        require_price(flat, "billing_model_flat")?;
    }
    if let Some(prepaid) = &order.offer.prepaid {
        if prepaid.cycles < 1 {
            return Err(BillingError::InvalidSnapshot(format!(
                "prepaid cycles must be at least 1, got {}",
                prepaid.cycles
            )));
        }
        if let Some(pct) = prepaid.discount_percent {
            require_percent(pct, "prepaid discount_percent")?;
        }
    }

    Ok(())
}

/// Convert f64 to Decimal for calculation
///
/// Input values should be pre-validated via the `validate_*` functions at
/// the boundary. If NaN/Infinity somehow reaches here, logs an error and
/// returns ZERO to avoid silent data corruption in financial calculations.
#[inline]
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_else(|| {
        tracing::error!(value = ?value, "Non-finite f64 in monetary calculation, defaulting to zero");
        Decimal::ZERO
    })
}

/// Convert Decimal back to f64 for storage, rounded to 2 decimal places
#[inline]
pub fn to_f64(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default()
}

/// Round an intermediate amount to the 4-decimal carry precision
#[inline]
pub fn round_intermediate(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(INTERMEDIATE_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Round to whole cents (used where a step must land on an exact cent)
#[inline]
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Clamp a monetary amount at zero
#[inline]
pub fn clamp_non_negative(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO)
}

/// Compare two monetary values for equality (within 0.01 tolerance)
pub fn money_eq(a: f64, b: f64) -> bool {
    let diff = (to_decimal(a) - to_decimal(b)).abs();
    diff < MONEY_TOLERANCE
}
