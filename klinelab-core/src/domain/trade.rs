//! TradeRecord and EquityPoint — the engine's append-only output ledgers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::position::Side;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// The strategy asked for the exit.
    Signal,
    /// The bar's range crossed the stored stop price.
    Stop,
    /// End of data with the position still open.
    ForcedClose,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Signal => write!(f, "signal"),
            ExitReason::Stop => write!(f, "stop"),
            ExitReason::ForcedClose => write!(f, "forced_close"),
        }
    }
}

/// A completed round-trip trade. Immutable once appended; the trade list is
/// the authoritative ledger for all downstream metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub side: Side,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub lot: f64,
    pub gross_pnl: f64,
    pub fees: f64,
    pub net_pnl: f64,
    pub bars_held: usize,
    pub exit_reason: ExitReason,
}

impl TradeRecord {
    /// Net return as a fraction of entry notional.
    pub fn return_frac(&self) -> f64 {
        let notional = self.entry_price * self.lot;
        if notional <= 0.0 {
            return 0.0;
        }
        self.net_pnl / notional
    }

    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }
}

/// One point of the per-bar equity curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
    /// Return versus the previous bar's equity; 0 at the first bar.
    pub return_pct: f64,
}
