//! Recurring-order pricing engine
//!
//! Computes the monetary total of a subscription order in two directions:
//!
//! - **Forward** (`pricing::OrderPriceCalculator`): predicts the next bill
//!   before it is charged.
//! - **Backward** (`pricing::OrderBreakdownReconstructor`): reconstructs the
//!   discount breakdown of an already-billed order from its stored amounts.
//!
//! Both directions run the same ordered discount stack and reconcile with
//! the ledger of record to the cent.
//!
//! # Module structure
//!
//! ```text
//! billing-engine/src/
//! ├── common/        # error types
//! ├── money.rs       # decimal arithmetic policy + snapshot validation
//! ├── gateway/       # read-only collaborator traits
//! └── pricing/       # line pricer, forward calculator, volume/distributor,
//!                    # shipping, tax, backward reconstructor
//! ```
//!
//! The engine is synchronous and request-scoped: each call operates on one
//! order's read-only snapshot and shares no mutable state across orders.
//! Identical input snapshots always yield identical output.

pub mod common;
pub mod gateway;
pub mod money;
pub mod pricing;

pub use common::error::{BillingError, BillingResult};
