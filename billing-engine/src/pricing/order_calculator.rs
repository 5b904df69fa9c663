//! Order Price Calculator - forward path
//!
//! Aggregates the line pricer results for one recurring date into subtotal,
//! discount stack, shipping, tax and total. The calculation is an explicit
//! ordered pipeline over an in-memory state record; the per-line discount
//! stack is a static list, not an implicit call sequence. Each step's base
//! depends on the cumulative effect of the previous ones, so the order is
//! load-bearing.

use crate::common::error::{BillingError, BillingResult};
use crate::gateway::{
    BillingReadModel, CouponRequest, CouponRequestLine, CouponService, ProductRecord,
    ShippingGateway,
};
use crate::money::{
    clamp_non_negative, round_cents, round_intermediate, to_decimal, to_f64, validate_order,
};
use chrono::NaiveDate;
use rust_decimal::prelude::*;
use shared::billing::{
    DiscountKind, DiscountSet, LineItemSnapshot, LineReport, OrderForecast, OrderSnapshot,
    ShippingQuote, TaxQuote,
};

use super::distributor::WeightedKey;
use super::line_pricer::{resolve_next_price, PricedLine};
use super::shipping;
use super::tax::{self, TaxStrategy, TaxableLine};
use super::volume::VolumeDiscountEngine;

// =============================================================================
// Calculation state
// =============================================================================

/// Working copy of one line during a calculation pass
struct LineState {
    snapshot: LineItemSnapshot,
    product: ProductRecord,
    priced: PricedLine,
    /// Resolved next-bill unit price, before discounts
    base_unit: Decimal,
    /// Current unit price as the discount stack runs, 4-decimal carry
    unit_price: Decimal,
    /// Line-total discount amounts recorded so far
    discounts: DiscountSet,
}

impl LineState {
    fn quantity(&self) -> Decimal {
        Decimal::from(self.priced.quantity)
    }

    /// Post-discount line total at the current point of the pipeline
    fn current_total(&self) -> Decimal {
        clamp_non_negative(self.unit_price) * self.quantity()
    }
}

/// State record threaded through the pipeline steps
struct CalcState {
    order: OrderSnapshot,
    lines: Vec<LineState>,
    order_discounts: DiscountSet,
    shipping: ShippingQuote,
    tax: TaxQuote,
}

// =============================================================================
// Discount stack
// =============================================================================

type DiscountStep = fn(&mut CalcState);

/// The fixed per-line discount stack, applied in this exact order. Prepaid
/// and billing-model compute from the base unit price and are mutually
/// exclusive per line; rebill and retry compute from the running per-line
/// total left by the steps before them.
const DISCOUNT_STEPS: &[(DiscountKind, DiscountStep)] = &[
    (DiscountKind::Prepaid, apply_prepaid_discount),
    (DiscountKind::BillingModel, apply_billing_model_discount),
    (DiscountKind::Rebill, apply_rebill_discount),
    (DiscountKind::Retry, apply_retry_discount),
];

fn apply_prepaid_discount(state: &mut CalcState) {
    let Some(pct) = state.order.offer.prepaid.as_ref().and_then(|p| p.discount_percent) else {
        return;
    };
    if pct <= 0.0 {
        return;
    }
    let pct = to_decimal(pct);

    for line in &mut state.lines {
        // Only the final prepaid cycle carries a charge to discount
        if !line.snapshot.is_final_prepaid_cycle() {
            continue;
        }
        let unit_disc = round_intermediate(line.base_unit * pct / Decimal::ONE_HUNDRED);
        if unit_disc <= Decimal::ZERO {
            continue;
        }
        line.unit_price -= unit_disc;
        line.discounts
            .add(DiscountKind::Prepaid, to_f64(unit_disc * line.quantity()));
    }
}

fn apply_billing_model_discount(state: &mut CalcState) {
    let pct = state.order.offer.billing_model_percent;
    let flat = state.order.offer.billing_model_flat;
    if pct.is_none() && flat.is_none() {
        return;
    }

    for line in &mut state.lines {
        if !line.priced.billing_model_applies {
            continue;
        }
        // Mutually exclusive with prepaid discounting
        if line.snapshot.is_prepaid() || line.discounts.contains(DiscountKind::Prepaid) {
            continue;
        }

        let unit_disc = if let Some(pct) = pct {
            round_intermediate(line.base_unit * to_decimal(pct) / Decimal::ONE_HUNDRED)
        } else {
            to_decimal(flat.unwrap_or(0.0)).min(clamp_non_negative(line.unit_price))
        };
        if unit_disc <= Decimal::ZERO {
            continue;
        }
        line.unit_price -= unit_disc;
        line.discounts
            .add(DiscountKind::BillingModel, to_f64(unit_disc * line.quantity()));
    }
}

/// Shared shape of the rebill and retry steps: a percent of the running
/// per-line total. Lines at trial depth keep their previously recorded
/// amounts instead of recomputing.
fn apply_running_percent_discount(state: &mut CalcState, kind: DiscountKind, percent: Option<f64>) {
    let Some(pct) = percent else { return };
    if pct <= 0.0 {
        return;
    }
    let pct = to_decimal(pct);

    for line in &mut state.lines {
        if line.snapshot.cycle_depth < 0 {
            let prior = line.snapshot.discounts.amount(kind);
            if prior > 0.0 {
                let unit_disc = round_intermediate(to_decimal(prior) / line.quantity());
                line.unit_price -= unit_disc;
                line.discounts.add(kind, prior);
            }
            continue;
        }

        let current = clamp_non_negative(line.unit_price);
        let unit_disc = round_intermediate(current * pct / Decimal::ONE_HUNDRED);
        if unit_disc <= Decimal::ZERO {
            continue;
        }
        line.unit_price -= unit_disc;
        line.discounts.add(kind, to_f64(unit_disc * line.quantity()));
    }
}

fn apply_rebill_discount(state: &mut CalcState) {
    let pct = state.order.rebill_discount_percent;
    apply_running_percent_discount(state, DiscountKind::Rebill, pct);
}

fn apply_retry_discount(state: &mut CalcState) {
    let pct = state.order.retry_discount_percent;
    apply_running_percent_discount(state, DiscountKind::Retry, pct);
}

// =============================================================================
// Calculator
// =============================================================================

/// Forward-path calculator: next-bill estimate for one order.
///
/// Safe to invoke concurrently for different orders; each call works on its
/// own state. Identical snapshots always produce identical forecasts.
pub struct OrderPriceCalculator<'a> {
    read_model: &'a dyn BillingReadModel,
    shipping: &'a dyn ShippingGateway,
    tax: TaxStrategy<'a>,
    coupons: Option<&'a dyn CouponService>,
    volume: Option<VolumeDiscountEngine>,
}

impl<'a> OrderPriceCalculator<'a> {
    pub fn new(read_model: &'a dyn BillingReadModel, shipping: &'a dyn ShippingGateway) -> Self {
        Self {
            read_model,
            shipping,
            tax: TaxStrategy::Disabled,
            coupons: None,
            volume: None,
        }
    }

    pub fn with_tax(mut self, tax: TaxStrategy<'a>) -> Self {
        self.tax = tax;
        self
    }

    pub fn with_coupons(mut self, coupons: &'a dyn CouponService) -> Self {
        self.coupons = Some(coupons);
        self
    }

    pub fn with_volume(mut self, volume: VolumeDiscountEngine) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Calculate the next bill for an order loaded from the read model.
    pub fn calculate(
        &self,
        order_id: &str,
        recurring_date: Option<NaiveDate>,
    ) -> BillingResult<OrderForecast> {
        let order = self.read_model.load_order(order_id)?;
        self.calculate_order(&order, recurring_date)
    }

    /// Calculate the next bill for an already-loaded snapshot.
    pub fn calculate_order(
        &self,
        order: &OrderSnapshot,
        recurring_date: Option<NaiveDate>,
    ) -> BillingResult<OrderForecast> {
        validate_order(order)?;

        // Step 1: eligible lines for the target date, main item first
        let selected = select_lines(order, recurring_date);
        if selected.is_empty() {
            return Ok(empty_forecast(order));
        }

        // Step 2: resolve each line's next-bill price
        let mut lines = Vec::with_capacity(selected.len());
        for snapshot in selected {
            let priced = resolve_next_price(&snapshot, &order.offer, self.read_model)?;
            let product = self.read_model.product(&priced.product_id)?;
            let base_unit = to_decimal(priced.unit_price);
            lines.push(LineState {
                snapshot,
                product,
                base_unit,
                unit_price: base_unit,
                discounts: DiscountSet::new(),
                priced,
            });
        }

        let mut state = CalcState {
            order: order.clone(),
            lines,
            order_discounts: DiscountSet::new(),
            shipping: ShippingQuote::default(),
            tax: TaxQuote::default(),
        };

        // Volume pricing replaces unit prices before the per-line stack runs
        self.apply_volume(&mut state);

        // Step 4: the fixed discount stack
        for (_, step) in DISCOUNT_STEPS {
            step(&mut state);
        }

        // Steps 3+5: shipping, on the discounted running total
        self.compute_shipping(&mut state)?;

        // Step 6: coupon last - its thresholds need the shipping amount fixed
        self.apply_coupon(&mut state)?;

        // Step 7: tax on the post-discount, post-shipping amounts
        self.compute_tax(&mut state)?;

        // Step 8: totals
        let forecast = finalize(&state);
        tracing::debug!(
            order_id = %forecast.order_id,
            subtotal = forecast.subtotal,
            shipping = forecast.shipping.amount,
            tax = forecast.tax.tax_amount,
            vat = forecast.tax.vat_amount,
            total = forecast.total,
            "forecast computed"
        );
        Ok(forecast)
    }

    fn apply_volume(&self, state: &mut CalcState) {
        let Some(engine) = &self.volume else { return };
        if !state.order.offer.volume_discount_enabled {
            return;
        }

        // Lines whose pricer already consumed a volume snapshot are done
        let keys: Vec<WeightedKey> = state
            .lines
            .iter()
            .enumerate()
            .filter(|(_, l)| {
                l.snapshot.volume_price_snapshot.is_none()
                    && engine.is_eligible(&l.snapshot)
                    && l.unit_price > Decimal::ZERO
            })
            .map(|(idx, l)| WeightedKey {
                key: idx.to_string(),
                units: l.priced.quantity as i64,
                unit_price: to_f64(l.unit_price),
            })
            .collect();
        if keys.is_empty() {
            return;
        }

        let Some(dist) = engine.evaluate(&keys) else { return };
        for (key, portion) in &dist.portions {
            let Ok(idx) = key.parse::<usize>() else { continue };
            let Some(line) = state.lines.get_mut(idx) else { continue };
            let unit_disc = round_intermediate(to_decimal(*portion) / line.quantity());
            line.unit_price -= unit_disc;
            line.discounts.add(DiscountKind::Volume, *portion);
        }
    }

    fn compute_shipping(&self, state: &mut CalcState) -> BillingResult<()> {
        // A non-shippable main product makes the whole order non-shippable,
        // regardless of the other items.
        if let Some(main) = state.lines.iter().find(|l| l.snapshot.is_main) {
            if !main.product.shippable {
                return Ok(());
            }
        }
        if !state
            .lines
            .iter()
            .any(|l| l.product.shippable && l.snapshot.shippable)
        {
            return Ok(());
        }

        let line_override = state
            .lines
            .iter()
            .find_map(|l| l.snapshot.shipping_method_override.clone());
        let Some(method) =
            shipping::resolve_method(&state.order, line_override.as_deref(), self.shipping)?
        else {
            return Ok(());
        };

        let running_total: Decimal = state.lines.iter().map(|l| l.current_total()).sum();
        let main_snapshot = state
            .lines
            .iter()
            .find(|l| l.snapshot.is_main)
            .map(|l| l.snapshot.clone());
        state.shipping = shipping::compute_quote(
            &method,
            running_total,
            &state.order.offer,
            main_snapshot.as_ref(),
        );
        Ok(())
    }

    fn apply_coupon(&self, state: &mut CalcState) -> BillingResult<()> {
        let Some(coupon) = state.order.coupon.clone() else {
            return Ok(());
        };
        let Some(service) = self.coupons else {
            return Ok(());
        };

        let request = CouponRequest {
            campaign_id: coupon.campaign_id,
            code: coupon.code,
            bxgy_id: coupon.bxgy_id,
            shipping_amount: state.shipping.total(),
            lines: state
                .lines
                .iter()
                .map(|l| CouponRequestLine {
                    product_id: l.priced.product_id.clone(),
                    quantity: l.priced.quantity,
                    total: to_f64(l.current_total()),
                })
                .collect(),
        };
        let eval = service.evaluate(&request)?;

        let mut attributed = Decimal::ZERO;
        for per in &eval.per_line {
            if let Some(line) = state
                .lines
                .iter_mut()
                .find(|l| l.priced.product_id == per.product_id)
            {
                let unit_disc = round_intermediate(to_decimal(per.amount) / line.quantity());
                line.unit_price -= unit_disc;
                line.discounts.add(DiscountKind::Coupon, per.amount);
                attributed += to_decimal(per.amount);
            }
        }

        // Whatever the service could not pin to a line stays order-level
        let remainder = to_decimal(eval.total_discount) - attributed;
        if remainder > Decimal::ZERO {
            state
                .order_discounts
                .add(DiscountKind::Coupon, to_f64(remainder));
        }
        if eval.shipping_discount > 0.0 {
            state.shipping.discount = eval.shipping_discount;
        }
        Ok(())
    }

    fn compute_tax(&self, state: &mut CalcState) -> BillingResult<()> {
        let taxable: Vec<TaxableLine> = state
            .lines
            .iter()
            .filter(|l| l.product.taxable && l.snapshot.taxable)
            .map(|l| TaxableLine {
                product_id: l.priced.product_id.clone(),
                tax_code: l.product.tax_code.clone(),
                amount: l.current_total(),
            })
            .collect();
        let taxable_subtotal: Decimal = taxable.iter().map(|t| t.amount).sum();
        let order_subtotal = clamp_non_negative(
            state
                .lines
                .iter()
                .map(|l| l.current_total())
                .sum::<Decimal>()
                - to_decimal(state.order_discounts.total()),
        );

        state.tax = tax::compute_tax(
            &self.tax,
            state.order.country.as_deref(),
            &taxable,
            taxable_subtotal,
            order_subtotal,
            &state.shipping,
        )?;
        Ok(())
    }
}

// =============================================================================
// Pipeline steps (pure functions)
// =============================================================================

/// Step 1: select eligible lines for the target recurring date.
///
/// Undated lines bill on every run; dated lines bill when they match the
/// target (the soonest date across the order when none was requested).
/// The main item sorts first, other lines keep insertion order.
fn select_lines(order: &OrderSnapshot, recurring_date: Option<NaiveDate>) -> Vec<LineItemSnapshot> {
    let target = recurring_date.or_else(|| order.soonest_recurring_date());
    let mut selected: Vec<LineItemSnapshot> = order
        .line_items
        .iter()
        .filter(|l| match (l.recurring_date, target) {
            (Some(date), Some(t)) => date == t,
            _ => true,
        })
        .cloned()
        .collect();
    selected.sort_by_key(|l| !l.is_main);
    selected
}

fn empty_forecast(order: &OrderSnapshot) -> OrderForecast {
    OrderForecast {
        order_id: order.id.clone(),
        total: 0.0,
        subtotal: 0.0,
        discounts: DiscountSet::new(),
        shipping: ShippingQuote::default(),
        tax: TaxQuote::default(),
        lines: Vec::new(),
    }
}

/// Step 8: fold the state into the forecast. Line totals land on whole
/// cents here; the order total is the sum of those rounded pieces, clamped
/// at zero. This is the single place amounts leave decimal precision.
fn finalize(state: &CalcState) -> OrderForecast {
    let mut tax_details = state.tax.per_line.clone();
    let mut lines = Vec::with_capacity(state.lines.len());
    let mut subtotal = Decimal::ZERO;
    let mut line_total_sum = Decimal::ZERO;

    for line in &state.lines {
        let unit = clamp_non_negative(line.unit_price);
        let line_subtotal = line.base_unit * line.quantity();
        let line_total = round_cents(unit * line.quantity());
        subtotal += line_subtotal;
        line_total_sum += line_total;

        let tax_amount = tax_details
            .iter()
            .position(|d| d.product_id == line.priced.product_id)
            .map(|i| tax_details.remove(i).tax_amount)
            .unwrap_or(0.0);

        lines.push(LineReport {
            product_id: line.priced.product_id.clone(),
            variant_id: line.priced.variant_id.clone(),
            name: line.snapshot.name.clone(),
            unit_price: to_f64(unit),
            quantity: line.priced.quantity,
            subtotal: to_f64(line_subtotal),
            total: to_f64(line_total),
            discounts: line.discounts.clone(),
            tax_amount,
        });
    }

    let total = clamp_non_negative(
        line_total_sum - to_decimal(state.order_discounts.total())
            + to_decimal(state.shipping.total())
            + to_decimal(state.tax.tax_amount)
            + to_decimal(state.tax.vat_amount),
    );

    OrderForecast {
        order_id: state.order.id.clone(),
        total: to_f64(total),
        subtotal: to_f64(subtotal),
        discounts: state.order_discounts.clone(),
        shipping: state.shipping.clone(),
        tax: state.tax.clone(),
        lines,
    }
}

// =============================================================================
// Tests
// =============================================================================
