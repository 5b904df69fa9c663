//! Full-flow integration tests: forward forecast and backward breakdown
//! against in-memory stub gateways.
//!
//! The stubs double as reference implementations of the gateway contracts:
//! fully-populated snapshots up front, synchronous calls, lookup misses as
//! errors.

use anyhow::Result;
use billing_engine::gateway::{
    BillingReadModel, CouponEvaluation, CouponLineDiscount, CouponRequest, CouponService,
    ProductRecord, ShippingGateway, TaxComputation, TaxProvider, TaxRequest, VariantRecord,
};
use billing_engine::pricing::{
    OrderBreakdownReconstructor, OrderPriceCalculator, RegionalTaxTable, TaxStrategy,
    VolumeDiscountConfig, VolumeDiscountEngine, VolumeTier,
};
use billing_engine::BillingError;
use shared::billing::{
    CouponRef, DiscountKind, LedgerDiscount, LineItemSnapshot, OrderForecast, OrderSnapshot,
    PrepaidProfile, RegionalTaxProfile, ShippingMethodRecord,
};
use std::collections::HashMap;
use std::sync::Once;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "billing_engine=debug".into()),
            )
            .with_test_writer()
            .try_init()
            .ok();
    });
}

// =============================================================================
// Stub gateways
// =============================================================================

#[derive(Default)]
struct StubReadModel {
    orders: HashMap<String, OrderSnapshot>,
    products: HashMap<String, ProductRecord>,
    variants: HashMap<String, VariantRecord>,
}

impl StubReadModel {
    fn with_product(mut self, id: &str, price: f64) -> Self {
        self.products.insert(
            id.to_string(),
            ProductRecord {
                id: id.to_string(),
                name: id.to_string(),
                price,
                taxable: true,
                shippable: true,
                is_bundle: false,
                bundle_fixed_price: false,
                tax_code: None,
            },
        );
        self
    }

    fn with_order(mut self, order: OrderSnapshot) -> Self {
        self.orders.insert(order.id.clone(), order);
        self
    }
}

impl BillingReadModel for StubReadModel {
    fn load_order(&self, order_id: &str) -> Result<OrderSnapshot, BillingError> {
        self.orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| BillingError::OrderNotFound(order_id.to_string()))
    }

    fn product(&self, product_id: &str) -> Result<ProductRecord, BillingError> {
        self.products
            .get(product_id)
            .cloned()
            .ok_or_else(|| BillingError::ProductNotFound(product_id.to_string()))
    }

    fn variant(&self, variant_id: &str) -> Result<VariantRecord, BillingError> {
        self.variants
            .get(variant_id)
            .cloned()
            .ok_or_else(|| BillingError::VariantNotFound(variant_id.to_string()))
    }
}

#[derive(Default)]
struct StubShipping {
    methods: HashMap<String, ShippingMethodRecord>,
    last_used: Option<ShippingMethodRecord>,
}

impl StubShipping {
    fn with_method(mut self, method: ShippingMethodRecord) -> Self {
        self.methods.insert(method.id.clone(), method);
        self
    }
}

impl ShippingGateway for StubShipping {
    fn method(&self, id: &str) -> Result<ShippingMethodRecord, BillingError> {
        self.methods
            .get(id)
            .cloned()
            .ok_or_else(|| BillingError::ShippingMethodNotFound(id.to_string()))
    }

    fn last_used_method(&self, _order_id: &str) -> Option<ShippingMethodRecord> {
        self.last_used.clone()
    }
}

/// Flat-rate tax provider: taxes the line subtotal at a fixed percent
struct FlatTaxProvider {
    rate_percent: f64,
}

impl TaxProvider for FlatTaxProvider {
    fn compute_tax(&self, request: &TaxRequest) -> Result<TaxComputation, BillingError> {
        let tax_amount =
            (request.taxable_amount * self.rate_percent / 100.0 * 100.0).round() / 100.0;
        Ok(TaxComputation {
            tax_amount,
            tax_rate_percent: self.rate_percent,
            shipping_taxed: false,
            per_line: Vec::new(),
        })
    }
}

struct StubCoupons {
    eval: CouponEvaluation,
}

impl CouponService for StubCoupons {
    fn evaluate(&self, _request: &CouponRequest) -> Result<CouponEvaluation, BillingError> {
        Ok(self.eval.clone())
    }
}

fn flat_method(id: &str, amount: f64) -> ShippingMethodRecord {
    ShippingMethodRecord {
        id: id.to_string(),
        name: "Standard".to_string(),
        amount,
        threshold_amount: None,
        threshold_charge_amount: None,
        tax_percentage: 0.0,
    }
}

fn plain_order(id: &str, lines: Vec<LineItemSnapshot>) -> OrderSnapshot {
    let mut order = OrderSnapshot::new(id);
    order.line_items = lines;
    order
}

/// Rebuild the stored ledger side of an order from a forward forecast, the
/// way the billing system persists a charged order: per-line totals and
/// discount maps on the lines, the retry share as an order-level ledger
/// entry.
fn billed_from_forecast(order: &OrderSnapshot, forecast: &OrderForecast) -> OrderSnapshot {
    let mut billed = OrderSnapshot::new(format!("{}-billed", order.id));
    billed.retry_discount_percent = order.retry_discount_percent;
    billed.stored_total = Some(forecast.total);
    if forecast.shipping.amount > 0.0 {
        billed.stored_shipping_amount = Some(forecast.shipping.amount);
    }

    let mut retry_total = 0.0;
    for line in &forecast.lines {
        let mut snapshot = LineItemSnapshot::new(&line.product_id, line.unit_price, line.quantity);
        snapshot.stored_total = Some(line.total);
        snapshot.stored_unit_price = Some(line.unit_price);
        for (kind, amount) in line.discounts.iter() {
            if kind == DiscountKind::Retry {
                // Retry is only persisted order-level, as a total amount
                retry_total += amount;
            } else {
                snapshot.discounts.set(kind, amount);
            }
        }
        billed.line_items.push(snapshot);
    }
    if retry_total > 0.0 {
        billed.ledger.push(LedgerDiscount {
            name: DiscountKind::Retry.as_str().to_string(),
            amount: (retry_total * 100.0).round() / 100.0,
        });
    }
    billed
}

// =============================================================================
// Forward scenarios
// =============================================================================

#[test]
fn plain_line_forecast() {
    init_tracing();
    // 50.00 x 2, no discounts: subtotal 100.00, total 100.00
    let read_model = StubReadModel::default()
        .with_product("widget", 50.0)
        .with_order(plain_order("o1", vec![LineItemSnapshot::new("widget", 50.0, 2)]));
    let shipping = StubShipping::default();
    let calc = OrderPriceCalculator::new(&read_model, &shipping);

    let forecast = calc.calculate("o1", None).unwrap();
    assert_eq!(forecast.subtotal, 100.0);
    assert_eq!(forecast.total, 100.0);
}

#[test]
fn billing_model_discount_forecast() {
    init_tracing();
    // 10% of 50.00 = 5.00/unit, x2 = 10.00 off: total 90.00
    let mut order = plain_order("o1", vec![LineItemSnapshot::new("widget", 50.0, 2)]);
    order.offer.billing_model_percent = Some(10.0);
    let read_model = StubReadModel::default()
        .with_product("widget", 50.0)
        .with_order(order);
    let shipping = StubShipping::default();
    let calc = OrderPriceCalculator::new(&read_model, &shipping);

    let forecast = calc.calculate("o1", None).unwrap();
    assert_eq!(forecast.total, 90.0);
    assert_eq!(
        forecast.lines[0].discounts.amount(DiscountKind::BillingModel),
        10.0
    );
}

#[test]
fn prepaid_final_cycle_forecast() {
    init_tracing();
    // 20.00/cycle, 3 prepaid cycles, last cycle: the cycle count is folded
    // into the unit price (60.00), not re-multiplied into the subtotal.
    let mut line = LineItemSnapshot::new("widget", 20.0, 1);
    line.prepaid_cycles = 3;
    line.current_prepaid_cycle = 3;
    let mut order = plain_order("o1", vec![line]);
    order.offer.prepaid = Some(PrepaidProfile {
        cycles: 3,
        discount_percent: None,
        shipping_once: false,
        shipping_per_cycle: false,
    });

    let read_model = StubReadModel::default()
        .with_product("widget", 20.0)
        .with_order(order);
    let shipping = StubShipping::default();
    let calc = OrderPriceCalculator::new(&read_model, &shipping);

    let forecast = calc.calculate("o1", None).unwrap();
    assert_eq!(forecast.lines[0].unit_price, 60.0);
    assert_eq!(forecast.subtotal, 60.0);
    assert_eq!(forecast.total, 60.0);
}

#[test]
fn volume_discount_conserved_across_lines() {
    init_tracing();
    // Three lines, blended 25.00, 10% tier on 6 units: aggregate 15.00
    // spread proportionally and summing exactly.
    let mut order = plain_order(
        "o1",
        vec![
            LineItemSnapshot::new("a", 25.0, 2),
            LineItemSnapshot::new("b", 25.0, 2),
            LineItemSnapshot::new("c", 25.0, 2),
        ],
    );
    order.offer.volume_discount_enabled = true;

    let read_model = StubReadModel::default()
        .with_product("a", 25.0)
        .with_product("b", 25.0)
        .with_product("c", 25.0)
        .with_order(order);
    let shipping = StubShipping::default();
    let engine = VolumeDiscountEngine::new(VolumeDiscountConfig {
        tiers: vec![VolumeTier {
            min_units: 6,
            percent: Some(10.0),
            flat: None,
        }],
        exclude_non_recurring: false,
        product_whitelist: None,
    });
    let calc = OrderPriceCalculator::new(&read_model, &shipping).with_volume(engine);

    let forecast = calc.calculate("o1", None).unwrap();
    let volume_sum: f64 = forecast
        .lines
        .iter()
        .map(|l| l.discounts.amount(DiscountKind::Volume))
        .sum();
    assert_eq!(volume_sum, 15.0);
    assert_eq!(forecast.total, 135.0);
}

#[test]
fn full_stack_with_shipping_coupon_and_tax() {
    init_tracing();
    // 100.00 base, billing model 10% -> 90.00; shipping 5.00;
    // coupon 9.00 on the line -> 81.00; manual 10% tax on 81.00 = 8.10;
    // total = 81.00 + 5.00 + 8.10 = 94.10
    let mut order = plain_order("o1", vec![LineItemSnapshot::new("widget", 100.0, 1)]);
    order.offer.billing_model_percent = Some(10.0);
    order.shipping_method_id = Some("std".to_string());
    order.country = Some("US".to_string());
    order.coupon = Some(CouponRef {
        campaign_id: "camp-1".to_string(),
        code: Some("SAVE9".to_string()),
        bxgy_id: None,
    });

    let read_model = StubReadModel::default()
        .with_product("widget", 100.0)
        .with_order(order);
    let shipping = StubShipping::default().with_method(flat_method("std", 5.0));
    let coupons = StubCoupons {
        eval: CouponEvaluation {
            total_discount: 9.0,
            shipping_discount: 0.0,
            per_line: vec![CouponLineDiscount {
                product_id: "widget".to_string(),
                amount: 9.0,
            }],
            is_buy_x_get_y: false,
        },
    };
    let table = RegionalTaxTable::new(vec![RegionalTaxProfile {
        country: "US".to_string(),
        state: None,
        county: None,
        city: None,
        rate_percent: 10.0,
        vat_percent: 0.0,
        vat_minimum_order: None,
    }]);
    let calc = OrderPriceCalculator::new(&read_model, &shipping)
        .with_coupons(&coupons)
        .with_tax(TaxStrategy::Manual(table));

    let forecast = calc.calculate("o1", None).unwrap();
    assert_eq!(forecast.lines[0].total, 81.0);
    assert_eq!(forecast.shipping.amount, 5.0);
    assert_eq!(forecast.tax.tax_amount, 8.1);
    assert_eq!(forecast.total, 94.1);
}

#[test]
fn provider_tax_strategy() {
    init_tracing();
    // External provider at 8% over the 50.00 taxable subtotal
    let read_model = StubReadModel::default()
        .with_product("widget", 50.0)
        .with_order(plain_order("o1", vec![LineItemSnapshot::new("widget", 50.0, 1)]));
    let shipping = StubShipping::default();
    let provider = FlatTaxProvider { rate_percent: 8.0 };
    let calc = OrderPriceCalculator::new(&read_model, &shipping)
        .with_tax(TaxStrategy::Provider(&provider));

    let forecast = calc.calculate("o1", None).unwrap();
    assert_eq!(forecast.tax.tax_amount, 4.0);
    assert_eq!(forecast.total, 54.0);
}

#[test]
fn forecast_is_idempotent() {
    init_tracing();
    let mut order = plain_order("o1", vec![LineItemSnapshot::new("widget", 33.33, 3)]);
    order.offer.billing_model_percent = Some(7.5);
    order.rebill_discount_percent = Some(3.0);
    order.shipping_method_id = Some("std".to_string());

    let read_model = StubReadModel::default()
        .with_product("widget", 33.33)
        .with_order(order);
    let shipping = StubShipping::default().with_method(flat_method("std", 4.99));
    let calc = OrderPriceCalculator::new(&read_model, &shipping);

    let first = calc.calculate("o1", None).unwrap();
    let second = calc.calculate("o1", None).unwrap();
    assert_eq!(first, second);
}

#[test]
fn missing_catalog_reference_fails_fast() {
    init_tracing();
    let read_model = StubReadModel::default()
        .with_order(plain_order("o1", vec![LineItemSnapshot::new("ghost", 10.0, 1)]));
    let shipping = StubShipping::default();
    let calc = OrderPriceCalculator::new(&read_model, &shipping);

    let err = calc.calculate("o1", None).unwrap_err();
    assert!(matches!(err, BillingError::ProductNotFound(_)));
}

// =============================================================================
// Backward scenarios
// =============================================================================

#[test]
fn retry_reconstruction_recovers_subtotal() {
    init_tracing();
    // Stored line total 45.00 with a 10% retry recorded order-level as
    // 5.00: the reconstructed pre-discount subtotal must be 50.00.
    let mut line = LineItemSnapshot::new("widget", 45.0, 1);
    line.stored_total = Some(45.0);
    let mut order = plain_order("o1", vec![line]);
    order.retry_discount_percent = Some(10.0);
    order.stored_total = Some(45.0);
    order.ledger.push(LedgerDiscount {
        name: "RETRY".to_string(),
        amount: 5.0,
    });

    let read_model = StubReadModel::default().with_order(order);
    let recon = OrderBreakdownReconstructor::new(&read_model);

    let breakdown = recon.reconstruct("o1").unwrap();
    assert_eq!(breakdown.lines[0].subtotal, 50.0);
    assert_eq!(breakdown.lines[0].discounts.amount(DiscountKind::Retry), 5.0);
    assert!(breakdown.excluded_from_calculation.is_empty());
}

#[test]
fn stored_total_wins_over_recomputation() {
    init_tracing();
    // Recomputed 99.98 vs stored 100.00: the stored value is returned and
    // the 0.02 discrepancy only logged.
    let mut line = LineItemSnapshot::new("widget", 99.98, 1);
    line.stored_total = Some(99.98);
    let mut order = plain_order("o1", vec![line]);
    order.stored_total = Some(100.0);

    let read_model = StubReadModel::default().with_order(order);
    let recon = OrderBreakdownReconstructor::new(&read_model);

    let breakdown = recon.reconstruct("o1").unwrap();
    assert_eq!(breakdown.total, 100.0);
}

// =============================================================================
// Round trip
// =============================================================================

#[test]
fn forward_then_backward_recovers_base_price() -> Result<()> {
    init_tracing();
    // Forward: 100.00 -> billing model 10% (90.00) -> rebill 10% (81.00)
    // -> retry 10% (72.90). Persist the result the way billing does, then
    // reconstruct: the base unit price must come back within a cent.
    let mut order = plain_order("o1", vec![LineItemSnapshot::new("widget", 100.0, 1)]);
    order.offer.billing_model_percent = Some(10.0);
    order.rebill_discount_percent = Some(10.0);
    order.retry_discount_percent = Some(10.0);

    let read_model = StubReadModel::default()
        .with_product("widget", 100.0)
        .with_order(order.clone());
    let shipping = StubShipping::default();
    let calc = OrderPriceCalculator::new(&read_model, &shipping);
    let forecast = calc.calculate("o1", None)?;
    assert_eq!(forecast.total, 72.9);

    let billed = billed_from_forecast(&order, &forecast);
    let billed_store = StubReadModel::default().with_order(billed.clone());
    let recon = OrderBreakdownReconstructor::new(&billed_store);
    let breakdown = recon.reconstruct(&billed.id)?;

    // Ground-truth total preserved, base unit price recovered
    assert_eq!(breakdown.total, forecast.total);
    assert!((breakdown.lines[0].unit_price - 100.0).abs() < 0.01);
    assert_eq!(
        breakdown.lines[0].discounts.amount(DiscountKind::BillingModel),
        forecast.lines[0].discounts.amount(DiscountKind::BillingModel)
    );
    assert_eq!(
        breakdown.lines[0].discounts.amount(DiscountKind::Rebill),
        forecast.lines[0].discounts.amount(DiscountKind::Rebill)
    );
    assert!(breakdown.excluded_from_calculation.is_empty());
    Ok(())
}

#[test]
fn round_trip_with_quantity_and_uneven_amounts() -> Result<()> {
    init_tracing();
    // Awkward amounts that force intermediate rounding: 19.99 x 3 at
    // 12.5% billing model and 5% retry.
    let mut order = plain_order("o1", vec![LineItemSnapshot::new("widget", 19.99, 3)]);
    order.offer.billing_model_percent = Some(12.5);
    order.retry_discount_percent = Some(5.0);

    let read_model = StubReadModel::default()
        .with_product("widget", 19.99)
        .with_order(order.clone());
    let shipping = StubShipping::default();
    let calc = OrderPriceCalculator::new(&read_model, &shipping);
    let forecast = calc.calculate("o1", None)?;

    let billed = billed_from_forecast(&order, &forecast);
    let billed_store = StubReadModel::default().with_order(billed.clone());
    let recon = OrderBreakdownReconstructor::new(&billed_store);
    let breakdown = recon.reconstruct(&billed.id)?;

    assert_eq!(breakdown.total, forecast.total);
    assert!(
        (breakdown.lines[0].unit_price - 19.99).abs() < 0.01,
        "recovered unit price {} drifted from 19.99",
        breakdown.lines[0].unit_price
    );
    Ok(())
}

// =============================================================================
// Transported snapshots
// =============================================================================

#[test]
fn snapshot_fixture_from_json() -> Result<()> {
    init_tracing();
    // Orders arrive at the engine as serialized snapshots; a forecast over
    // a deserialized fixture must match one over the hand-built equivalent.
    let order: OrderSnapshot = serde_json::from_str(
        r#"{
            "id": "o-json",
            "line_items": [
                {"product_id": "widget", "quantity": 2, "base_price": 50.0}
            ],
            "offer": {"billing_model_percent": 10.0}
        }"#,
    )?;

    let read_model = StubReadModel::default()
        .with_product("widget", 50.0)
        .with_order(order);
    let shipping = StubShipping::default();
    let calc = OrderPriceCalculator::new(&read_model, &shipping);

    let forecast = calc.calculate("o-json", None)?;
    assert_eq!(forecast.subtotal, 100.0);
    assert_eq!(forecast.total, 90.0);
    Ok(())
}
