//! Shared types for the recurring billing engine
//!
//! Domain snapshots, the discount catalog, and report shapes consumed by
//! both the pricing engine and its callers (recurring-billing cron,
//! forecast reports, breakdown UI).

pub mod billing;

// Re-exports
pub use serde::{Deserialize, Serialize};
