//! Advice — a strategy's per-bar instruction to the engine.

use serde::{Deserialize, Serialize};

/// What the strategy wants done at the current bar.
///
/// Produced once per bar and consumed immediately; never persisted. Entry
/// variants carry the requested lot and an optional protective stop. The
/// engine ignores entries while a position is open and `Exit` while flat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Advice {
    /// Do nothing this bar.
    Hold,
    /// Open a long at the bar's close (slippage applied by the engine).
    EnterLong { lot: f64, stop_price: Option<f64> },
    /// Open a short at the bar's close.
    EnterShort { lot: f64, stop_price: Option<f64> },
    /// Close the open position at the bar's close.
    Exit,
}

impl Advice {
    pub fn is_entry(&self) -> bool {
        matches!(self, Advice::EnterLong { .. } | Advice::EnterShort { .. })
    }
}
