//! Strategy trait — the seam between the engine and decision logic.
//!
//! Any ML-based or rule-based signal generator lives behind this trait;
//! the engine only sees the per-bar `Advice` it returns. Implementations
//! must be pure functions of the dataset and bar index — no I/O in the hot
//! loop, no interior mutability — which is what makes engine runs
//! deterministic and optimizer fan-out safe.

mod reference;

pub use reference::{ChannelBreakout, HoldForever, Scripted};

use crate::domain::{Advice, Dataset};

/// Boxed error for strategy failures; the engine attaches the bar index.
pub type StrategyError = Box<dyn std::error::Error + Send + Sync>;

/// A pluggable entry/exit decision source.
pub trait Strategy: Send + Sync {
    /// Produce advice for `bar_index`. The strategy may read any bar or
    /// feature column up to and including `bar_index`; reading beyond it
    /// is look-ahead and invalidates the backtest.
    fn evaluate(&self, data: &Dataset, bar_index: usize) -> Result<Advice, StrategyError>;
}
