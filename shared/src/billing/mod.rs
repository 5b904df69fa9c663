//! Billing domain model
//!
//! Read-only snapshots of subscription orders plus the fixed discount
//! catalog. Snapshots are rehydrated fresh for every calculation; the
//! engine only ever mutates its own in-memory working copies.

pub mod discount;
pub mod line_item;
pub mod order;
pub mod report;
pub mod shipping;
pub mod tax;

pub use discount::*;
pub use line_item::*;
pub use order::*;
pub use report::*;
pub use shipping::*;
pub use tax::*;
