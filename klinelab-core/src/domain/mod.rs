//! Domain types shared across the workspace.

pub mod advice;
pub mod bar;
pub mod dataset;
pub mod position;
pub mod trade;

pub use advice::Advice;
pub use bar::Bar;
pub use dataset::{DataError, Dataset};
pub use position::{Position, Side};
pub use trade::{EquityPoint, ExitReason, TradeRecord};
