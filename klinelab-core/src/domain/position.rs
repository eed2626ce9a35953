//! Position — the single open-position state owned by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a position or trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1.0 for longs, -1.0 for shorts. PnL = (exit - entry) * lot * sign.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// An open position. The engine holds at most one at a time (no pyramiding);
/// flat is modeled as `Option<Position>::None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub entry_price: f64,
    pub lot: f64,
    pub stop_price: Option<f64>,
    pub entry_time: DateTime<Utc>,
    pub entry_bar: usize,
}

impl Position {
    /// Unrealized PnL marked at `price`.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.lot * self.side.sign()
    }

    /// Whether `bar_low`/`bar_high` crossed the stop this bar.
    ///
    /// For a long the stop triggers when the bar's low trades at or through
    /// the stop; for a short, when the bar's high does.
    pub fn stop_hit(&self, bar_low: f64, bar_high: f64) -> bool {
        match (self.side, self.stop_price) {
            (Side::Long, Some(stop)) => bar_low <= stop,
            (Side::Short, Some(stop)) => bar_high >= stop,
            (_, None) => false,
        }
    }
}
