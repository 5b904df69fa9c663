//! Unified Error Handling
//!
//! Error taxonomy for the pricing engine. Catalog reference misses bubble
//! up uncaught - a wrong silent default would corrupt billing. Everything
//! that can degrade gracefully (unattributable discounts, reconciliation
//! drift) is not an error and is handled inside the calculators.

use thiserror::Error;

/// Result alias used throughout the engine
pub type BillingResult<T> = Result<T, BillingError>;

/// Engine-level error type
#[derive(Debug, Error)]
pub enum BillingError {
    // ========== Catalog Reference Errors ==========
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Variant not found: {0}")]
    VariantNotFound(String),

    #[error("Shipping method not found: {0}")]
    ShippingMethodNotFound(String),

    // ========== Snapshot Validation ==========
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Invalid discount ledger: {0}")]
    InvalidLedger(String),

    // ========== Collaborator Failures ==========
    #[error("Tax provider error: {0}")]
    TaxProvider(String),

    #[error("Coupon service error: {0}")]
    CouponService(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = BillingError::ProductNotFound("prod-9".to_string());
        assert_eq!(err.to_string(), "Product not found: prod-9");

        let err = BillingError::InvalidSnapshot("quantity must be positive".to_string());
        assert_eq!(err.to_string(), "Invalid snapshot: quantity must be positive");
    }
}
