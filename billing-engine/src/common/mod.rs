//! Shared engine infrastructure

pub mod error;

pub use error::{BillingError, BillingResult};
