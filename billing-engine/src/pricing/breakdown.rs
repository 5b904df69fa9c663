//! Order Breakdown Reconstructor - backward path
//!
//! Given an already-billed order's stored totals and discount ledger,
//! undoes each discount in the reverse of the application order to recover
//! the pre-discount unit price per line. The output total is compared
//! against the order's independently stored ground-truth total; on any
//! mismatch the stored total wins and the discrepancy is logged with full
//! context. This path is explanatory, never authoritative.

use crate::common::error::{BillingError, BillingResult};
use crate::gateway::BillingReadModel;
use crate::money::{
    clamp_non_negative, money_eq, round_cents, round_intermediate, to_decimal, to_f64,
    validate_order,
};
use rust_decimal::prelude::*;
use shared::billing::{
    DiscountKind, DiscountSet, LineItemSnapshot, LineReport, OrderBreakdown, OrderSnapshot,
    ShippingQuote, TaxQuote,
};

/// History-note marker left by the billing system when a retry charge went
/// out with discounted shipping. Its presence lets the reconstructor fold
/// the missing shipping cents into the retry candidates.
pub const DISCOUNTED_SHIPPING_MARKER: &str = "retry shipping discounted";

// =============================================================================
// Retry reconstruction candidates
// =============================================================================

/// One way of inferring the per-line share of an order-level retry
/// discount. Candidates are tried in declaration order; the first whose
/// per-line sum matches the stored order-level amount exactly wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Per-line discount rounded up to the next cent
    RoundUp,
    /// Per-line discount rounded down to the cent
    RoundDown,
    /// Derived from the persisted pre-retry unit price
    StoredUnitPrice,
}

/// Ranked candidate list. First declared candidate wins on a tie.
pub const RETRY_STRATEGIES: [RetryStrategy; 3] = [
    RetryStrategy::RoundUp,
    RetryStrategy::RoundDown,
    RetryStrategy::StoredUnitPrice,
];

fn ceil_cents(value: Decimal) -> Decimal {
    (value * Decimal::ONE_HUNDRED).ceil() / Decimal::ONE_HUNDRED
}

fn floor_cents(value: Decimal) -> Decimal {
    (value * Decimal::ONE_HUNDRED).floor() / Decimal::ONE_HUNDRED
}

/// Per-line retry discount amounts a candidate reconstruction implies.
///
/// `post_totals` are the stored post-retry line totals; `percent` is the
/// retry rate. A post-total T at rate p came from T / (1 - p/100), so the
/// per-line discount is T * p / (100 - p), rounded per the candidate.
fn retry_candidate(
    strategy: RetryStrategy,
    lines: &[LineWork],
    percent: Decimal,
) -> Option<Vec<Decimal>> {
    if percent <= Decimal::ZERO || percent >= Decimal::ONE_HUNDRED {
        return None;
    }
    let factor = percent / (Decimal::ONE_HUNDRED - percent);

    let mut amounts = Vec::with_capacity(lines.len());
    for line in lines {
        let amount = match strategy {
            RetryStrategy::RoundUp => ceil_cents(line.current_total() * factor),
            RetryStrategy::RoundDown => floor_cents(line.current_total() * factor),
            RetryStrategy::StoredUnitPrice => {
                let unit = to_decimal(line.snapshot.stored_unit_price?);
                round_cents(unit * percent / Decimal::ONE_HUNDRED) * line.quantity()
            }
        };
        amounts.push(amount);
    }
    Some(amounts)
}

// =============================================================================
// Working state
// =============================================================================

struct LineWork {
    snapshot: LineItemSnapshot,
    /// Current per-unit amount; starts at the stored post-discount value
    /// and grows as discounts are added back, 4-decimal carry
    unit_price: Decimal,
    /// Stored post-discount line total (fixed; this is what was billed)
    billed_total: Decimal,
    /// Discounts reported for this line
    discounts: DiscountSet,
}

impl LineWork {
    fn quantity(&self) -> Decimal {
        Decimal::from(self.snapshot.quantity)
    }

    fn current_total(&self) -> Decimal {
        self.unit_price * self.quantity()
    }

    /// Add a line-total discount amount back into the unit price
    fn undo(&mut self, kind: DiscountKind, amount: Decimal) {
        if amount <= Decimal::ZERO {
            return;
        }
        self.unit_price = round_intermediate(self.unit_price + amount / self.quantity());
        self.discounts.add(kind, to_f64(amount));
    }
}

// =============================================================================
// Reconstructor
// =============================================================================

/// Backward-path reconstructor for billed orders
pub struct OrderBreakdownReconstructor<'a> {
    read_model: &'a dyn BillingReadModel,
}

impl<'a> OrderBreakdownReconstructor<'a> {
    pub fn new(read_model: &'a dyn BillingReadModel) -> Self {
        Self { read_model }
    }

    /// Reconstruct the discount breakdown of an order loaded from the read
    /// model.
    pub fn reconstruct(&self, order_id: &str) -> BillingResult<OrderBreakdown> {
        let order = self.read_model.load_order(order_id)?;
        self.reconstruct_order(&order)
    }

    /// Reconstruct the discount breakdown of an already-loaded snapshot.
    pub fn reconstruct_order(&self, order: &OrderSnapshot) -> BillingResult<OrderBreakdown> {
        validate_order(order)?;

        // Order-level amounts: persisted ledger entries plus any amounts
        // already recorded order-level. Unknown ledger names are data
        // corruption, not something to keep quietly.
        let mut order_level = order.order_discounts.clone();
        for entry in &order.ledger {
            let kind = DiscountKind::parse(&entry.name)
                .map_err(|e| BillingError::InvalidLedger(e.to_string()))?;
            order_level.add(kind, entry.amount);
        }

        let mut lines: Vec<LineWork> = order
            .line_items
            .iter()
            .map(|snapshot| {
                let quantity = Decimal::from(snapshot.quantity);
                let billed_total = match (snapshot.stored_total, snapshot.stored_unit_price) {
                    (Some(total), _) => to_decimal(total),
                    (None, Some(unit)) => to_decimal(unit) * quantity,
                    (None, None) => to_decimal(snapshot.base_price) * quantity,
                };
                LineWork {
                    unit_price: round_intermediate(billed_total / quantity),
                    billed_total,
                    discounts: DiscountSet::new(),
                    snapshot: snapshot.clone(),
                }
            })
            .collect();

        let mut excluded: Vec<String> = Vec::new();
        let mut shipping_discount = Decimal::ZERO;
        let stored_shipping = to_decimal(order.stored_shipping_amount.unwrap_or(0.0));

        // Undo recorded discounts, newest-applied first
        for kind in DiscountKind::UNDO_ORDER {
            match kind {
                DiscountKind::Retry => {
                    self.undo_retry(
                        order,
                        &mut lines,
                        &mut order_level,
                        &mut excluded,
                        &mut shipping_discount,
                        stored_shipping,
                    );
                }
                DiscountKind::Volume => {
                    undo_volume(&mut lines, &mut order_level, &mut excluded);
                }
                // Everything else was recorded per line and folds straight back
                _ => {
                    for line in &mut lines {
                        let amount = to_decimal(line.snapshot.discounts.amount(kind));
                        line.undo(kind, amount);
                    }
                }
            }
        }

        self.finish(order, lines, order_level, excluded, shipping_discount, stored_shipping)
    }

    /// Undo the order-level retry discount by trial-computing each ranked
    /// candidate and keeping the first whose per-line sum matches the
    /// stored amount exactly. All candidates failing, the retry discount is
    /// reported order-level and excluded from the calculation.
    fn undo_retry(
        &self,
        order: &OrderSnapshot,
        lines: &mut [LineWork],
        order_level: &mut DiscountSet,
        excluded: &mut Vec<String>,
        shipping_discount: &mut Decimal,
        stored_shipping: Decimal,
    ) {
        let stored_amount = to_decimal(order_level.amount(DiscountKind::Retry));
        if stored_amount <= Decimal::ZERO {
            return;
        }

        // Rate: persisted when available, otherwise derived from the stored
        // amount against the post-discount totals.
        let post_sum: Decimal = lines.iter().map(|l| l.current_total()).sum();
        let percent = match order.retry_discount_percent {
            Some(p) => to_decimal(p),
            None => {
                let pre = post_sum + stored_amount;
                if pre <= Decimal::ZERO {
                    Decimal::ZERO
                } else {
                    stored_amount * Decimal::ONE_HUNDRED / pre
                }
            }
        };

        // The discounted-shipping fold-in only enters once the plain
        // candidates have all failed, and only when the notes carry the
        // marker for it.
        let shipping_part = if stored_shipping > Decimal::ZERO
            && order
                .history_notes
                .iter()
                .any(|n| n.contains(DISCOUNTED_SHIPPING_MARKER))
        {
            Some(round_cents(stored_shipping * percent / Decimal::ONE_HUNDRED))
        } else {
            None
        };

        let mut passes: Vec<Option<Decimal>> = vec![None];
        if let Some(part) = shipping_part {
            passes.push(Some(part));
        }

        for &extra in &passes {
            for strategy in RETRY_STRATEGIES {
                let Some(amounts) = retry_candidate(strategy, lines, percent) else {
                    continue;
                };
                let sum: Decimal = amounts.iter().sum::<Decimal>() + extra.unwrap_or(Decimal::ZERO);
                if sum != stored_amount {
                    continue;
                }

                tracing::debug!(
                    order_id = %order.id,
                    strategy = ?strategy,
                    shipping_folded = extra.is_some(),
                    "retry discount attributed to lines"
                );
                for (line, amount) in lines.iter_mut().zip(amounts) {
                    line.undo(DiscountKind::Retry, amount);
                }
                if let Some(part) = extra {
                    *shipping_discount = part;
                }
                order_level.remove(DiscountKind::Retry);
                return;
            }
        }

        // Cannot be precisely attributed: report the amount but leave the
        // reconstructed base prices alone.
        excluded.push(DiscountKind::Retry.as_str().to_string());
    }

    fn finish(
        &self,
        order: &OrderSnapshot,
        lines: Vec<LineWork>,
        order_level: DiscountSet,
        excluded: Vec<String>,
        shipping_discount: Decimal,
        stored_shipping: Decimal,
    ) -> BillingResult<OrderBreakdown> {
        let mut reports = Vec::with_capacity(lines.len());
        let mut subtotal = Decimal::ZERO;
        let mut billed_sum = Decimal::ZERO;

        for line in &lines {
            let base_unit = clamp_non_negative(line.unit_price);
            let line_subtotal = base_unit * line.quantity();
            subtotal += line_subtotal;
            billed_sum += line.billed_total;

            reports.push(LineReport {
                product_id: line.snapshot.product_id.clone(),
                variant_id: line.snapshot.variant_id.clone(),
                name: line.snapshot.name.clone(),
                unit_price: to_f64(base_unit),
                quantity: line.snapshot.quantity,
                subtotal: to_f64(line_subtotal),
                total: to_f64(line.billed_total),
                discounts: line.discounts.clone(),
                tax_amount: 0.0,
            });
        }

        let shipping = ShippingQuote {
            amount: to_f64(stored_shipping),
            discount: to_f64(shipping_discount),
            taxable_amount: to_f64(stored_shipping),
            tax_percentage: 0.0,
        };

        // The billed tax is reported as persisted; this path never re-rates
        // an already-charged order.
        let stored_tax = to_decimal(order.stored_tax_amount.unwrap_or(0.0));
        let tax = TaxQuote {
            tax_amount: to_f64(stored_tax),
            ..TaxQuote::default()
        };

        // Order-level discounts that stayed attributable reduce the total;
        // calculation-excluded ones are reported only.
        let deductible: Decimal = order_level
            .iter()
            .filter(|(kind, _)| !excluded.iter().any(|e| e == kind.as_str()))
            .map(|(_, amount)| to_decimal(amount))
            .sum();

        let recomputed = clamp_non_negative(
            billed_sum - deductible + to_decimal(shipping.total()) + stored_tax,
        );

        let total = match order.stored_total {
            Some(stored) => {
                if !money_eq(to_f64(recomputed), stored) {
                    // The ledger of record wins; log everything needed to
                    // chase the discrepancy.
                    tracing::warn!(
                        order_id = %order.id,
                        recomputed = to_f64(recomputed),
                        stored = stored,
                        subtotal = to_f64(subtotal),
                        shipping = ?shipping,
                        order_discounts = ?order_level,
                        excluded = ?excluded,
                        lines = ?reports,
                        "reconstructed total disagrees with stored total; keeping stored"
                    );
                }
                stored
            }
            None => to_f64(recomputed),
        };

        Ok(OrderBreakdown {
            order_id: order.id.clone(),
            total,
            subtotal: to_f64(subtotal),
            discounts: order_level,
            shipping,
            tax,
            lines: reports,
            excluded_from_calculation: excluded,
        })
    }
}

/// Undo the volume discount. With exactly one line it is fully
/// attributable; with more, the original per-line split was not retained,
/// so the amount stays order-level and calculation-excluded.
fn undo_volume(lines: &mut [LineWork], order_level: &mut DiscountSet, excluded: &mut Vec<String>) {
    // Line-recorded volume amounts fold straight back
    for line in lines.iter_mut() {
        let amount = to_decimal(line.snapshot.discounts.amount(DiscountKind::Volume));
        line.undo(DiscountKind::Volume, amount);
    }

    let order_amount = to_decimal(order_level.amount(DiscountKind::Volume));
    if order_amount <= Decimal::ZERO {
        return;
    }
    if lines.len() == 1 {
        lines[0].undo(DiscountKind::Volume, order_amount);
        order_level.remove(DiscountKind::Volume);
    } else {
        excluded.push(DiscountKind::Volume.as_str().to_string());
    }
}

// =============================================================================
// Tests
// =============================================================================
