//! Tax computation strategies
//!
//! Either delegate to an external tax provider with itemized line data, or
//! apply a manually configured regional sales-tax/VAT profile. VAT
//! eligibility is gated by a minimum-order-value rule keyed to the order's
//! country.

use crate::common::error::BillingError;
use crate::gateway::{TaxProvider, TaxRequest, TaxRequestLine};
use crate::money::{round_cents, to_decimal, to_f64};
use rust_decimal::prelude::*;
use shared::billing::{LineTaxDetail, RegionalTaxProfile, ShippingQuote, TaxQuote};

/// One taxable line handed to the tax step
#[derive(Debug, Clone)]
pub struct TaxableLine {
    pub product_id: String,
    pub tax_code: Option<String>,
    /// Post-discount line amount
    pub amount: Decimal,
}

/// Manually configured regional profiles
#[derive(Debug, Clone, Default)]
pub struct RegionalTaxTable {
    pub profiles: Vec<RegionalTaxProfile>,
}

impl RegionalTaxTable {
    pub fn new(profiles: Vec<RegionalTaxProfile>) -> Self {
        Self { profiles }
    }

    /// Profile for a country, if one is configured
    pub fn lookup(&self, country: Option<&str>) -> Option<&RegionalTaxProfile> {
        let country = country?;
        self.profiles
            .iter()
            .find(|p| p.country.eq_ignore_ascii_case(country))
    }
}

/// How the order's tax is computed
pub enum TaxStrategy<'a> {
    /// Delegate to an external provider with itemized data
    Provider(&'a dyn TaxProvider),
    /// Apply a configured regional profile
    Manual(RegionalTaxTable),
    /// No tax configured
    Disabled,
}

impl std::fmt::Debug for TaxStrategy<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaxStrategy::Provider(_) => f.write_str("TaxStrategy::Provider"),
            TaxStrategy::Manual(_) => f.write_str("TaxStrategy::Manual"),
            TaxStrategy::Disabled => f.write_str("TaxStrategy::Disabled"),
        }
    }
}

/// Compute the order's tax quote.
///
/// `taxable_subtotal` is the post-discount amount of the taxable line
/// subset; `order_subtotal` is the full post-discount order amount the VAT
/// minimum is compared against.
pub fn compute_tax(
    strategy: &TaxStrategy<'_>,
    country: Option<&str>,
    lines: &[TaxableLine],
    taxable_subtotal: Decimal,
    order_subtotal: Decimal,
    shipping: &ShippingQuote,
) -> Result<TaxQuote, BillingError> {
    match strategy {
        TaxStrategy::Disabled => Ok(TaxQuote::default()),

        TaxStrategy::Provider(provider) => {
            let request = TaxRequest {
                taxable_amount: to_f64(taxable_subtotal),
                shipping_amount: shipping.total(),
                lines: lines
                    .iter()
                    .map(|l| TaxRequestLine {
                        product_id: l.product_id.clone(),
                        tax_code: l.tax_code.clone(),
                        amount: to_f64(l.amount),
                    })
                    .collect(),
                country: country.map(str::to_string),
            };
            let computed = provider.compute_tax(&request)?;

            Ok(TaxQuote {
                sales_tax_percent: computed.tax_rate_percent,
                tax_amount: computed.tax_amount,
                vat_percent: 0.0,
                vat_amount: 0.0,
                shipping_taxed: computed.shipping_taxed,
                per_line: computed.per_line,
            })
        }

        TaxStrategy::Manual(table) => {
            let Some(profile) = table.lookup(country) else {
                return Ok(TaxQuote::default());
            };

            let rate = to_decimal(profile.rate_percent);
            let mut tax_amount = round_cents(taxable_subtotal * rate / Decimal::ONE_HUNDRED);

            let per_line = lines
                .iter()
                .map(|l| LineTaxDetail {
                    product_id: l.product_id.clone(),
                    tax_amount: to_f64(round_cents(l.amount * rate / Decimal::ONE_HUNDRED)),
                    rate_percent: profile.rate_percent,
                })
                .collect();

            // Shipping tax uses the method's own rate
            let shipping_tax = round_cents(
                to_decimal(shipping.taxable_amount) * to_decimal(shipping.tax_percentage)
                    / Decimal::ONE_HUNDRED,
            );
            let shipping_taxed = shipping_tax > Decimal::ZERO;
            tax_amount += shipping_tax;

            // VAT only once the order crosses the configured minimum
            let vat_applies = profile.vat_percent > 0.0
                && profile
                    .vat_minimum_order
                    .map(|min| order_subtotal >= to_decimal(min))
                    .unwrap_or(true);
            let (vat_percent, vat_amount) = if vat_applies {
                let vat = round_cents(
                    taxable_subtotal * to_decimal(profile.vat_percent) / Decimal::ONE_HUNDRED,
                );
                (profile.vat_percent, to_f64(vat))
            } else {
                (0.0, 0.0)
            };

            Ok(TaxQuote {
                sales_tax_percent: profile.rate_percent,
                tax_amount: to_f64(tax_amount),
                vat_percent,
                vat_amount,
                shipping_taxed,
                per_line,
            })
        }
    }
}
