//! Pricing Engine Module
//!
//! Forward path: resolve each line's next-bill price, run the fixed
//! discount stack, then shipping, coupon and tax. Backward path: undo the
//! recorded discounts of a billed order in reverse order. Both directions
//! share the volume engine and the exact-cent distributor.

mod breakdown;
mod distributor;
mod line_pricer;
mod order_calculator;
mod shipping;
mod tax;
mod volume;

pub use breakdown::*;
pub use distributor::*;
pub use line_pricer::*;
pub use order_calculator::*;
pub use shipping::*;
pub use tax::*;
pub use volume::*;
