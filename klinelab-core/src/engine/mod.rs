//! Bar-by-bar event loop — the heart of the backtester.
//!
//! Per bar, in order:
//! 1. Stop check against the bar's range (before the strategy is consulted —
//!    a bar that should stop out must not take a fresh same-direction signal)
//! 2. Strategy advice; entries/exits fill at the slippage-adjusted close
//! 3. Mark-to-market equity point
//! 4. At the final bar, force-close any open position so every run ends flat

mod fill;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    Advice, Bar, DataError, Dataset, EquityPoint, ExitReason, Position, Side, TradeRecord,
};
use crate::strategy::Strategy;

use fill::{entry_fill_price, exit_fill_price, round_trip_fees};

/// Errors that abort a backtest run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("invalid engine config: {reason}")]
    InvalidConfig { reason: String },
    #[error("strategy failed at bar {bar_index}: {source}")]
    Strategy {
        bar_index: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Engine configuration.
///
/// `slippage_rate` and `fee_rate` are fractions of price/notional
/// (0.0005 = 5 bps). Slippage is applied against the trader on every
/// signal-priced fill; fees are charged once per round trip at close.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EngineConfig {
    pub initial_balance: f64,
    pub slippage_rate: f64,
    pub fee_rate: f64,
}

impl EngineConfig {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            initial_balance,
            slippage_rate: 0.0,
            fee_rate: 0.0,
        }
    }

    fn validate(&self) -> Result<(), EngineError> {
        if !(self.initial_balance.is_finite() && self.initial_balance > 0.0) {
            return Err(EngineError::InvalidConfig {
                reason: format!("initial_balance must be positive, got {}", self.initial_balance),
            });
        }
        if !(self.slippage_rate.is_finite() && self.slippage_rate >= 0.0) {
            return Err(EngineError::InvalidConfig {
                reason: format!("slippage_rate must be non-negative, got {}", self.slippage_rate),
            });
        }
        if !(self.fee_rate.is_finite() && self.fee_rate >= 0.0) {
            return Err(EngineError::InvalidConfig {
                reason: format!("fee_rate must be non-negative, got {}", self.fee_rate),
            });
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(10_000.0)
    }
}

/// Output of one engine run: the trade ledger, the per-bar equity curve,
/// and provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<EquityPoint>,
    pub final_equity: f64,
    pub bar_count: usize,
    pub dataset_hash: String,
}

/// The backtest engine. Holds a borrowed, read-only dataset; all mutable
/// run state (position, ledgers, balance) is local to `run()`, so one
/// engine value can serve repeated deterministic runs and datasets can be
/// shared freely across optimizer workers.
pub struct Engine<'a> {
    dataset: &'a Dataset,
    config: EngineConfig,
}

impl<'a> Engine<'a> {
    /// Validate the config and bind the dataset.
    ///
    /// Construction already guarantees a valid dataset, but `slice()` can
    /// produce an empty one; an empty dataset is rejected here rather than
    /// yielding a zero-bar run.
    pub fn new(dataset: &'a Dataset, config: EngineConfig) -> Result<Self, EngineError> {
        if dataset.is_empty() {
            return Err(EngineError::Data(DataError::Empty));
        }
        config.validate()?;
        Ok(Self { dataset, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the strategy over every bar exactly once.
    ///
    /// A strategy error aborts the run immediately — a broken strategy
    /// invalidates the whole backtest, so there is no skip-and-continue.
    pub fn run(&self, strategy: &dyn Strategy) -> Result<RunResult, EngineError> {
        let bars = self.dataset.bars();
        let n = bars.len();
        let slippage = self.config.slippage_rate;
        let fee_rate = self.config.fee_rate;

        let mut balance = self.config.initial_balance;
        let mut position: Option<Position> = None;
        let mut trades: Vec<TradeRecord> = Vec::new();
        let mut equity_curve: Vec<EquityPoint> = Vec::with_capacity(n);
        let mut prev_equity = self.config.initial_balance;

        for t in 0..n {
            let bar = &bars[t];

            // ─── Stop check (before the strategy) ───
            let mut stopped_this_bar = false;
            if let Some(pos) = &position {
                if pos.stop_hit(bar.low, bar.high) {
                    // Stop fills at the stop level itself, not the close.
                    let stop = pos.stop_price.expect("stop_hit requires a stop");
                    let pos = position.take().expect("position checked above");
                    let trade =
                        close_position(pos, stop, bar.timestamp, t, ExitReason::Stop, fee_rate);
                    balance += trade.net_pnl;
                    trades.push(trade);
                    stopped_this_bar = true;
                }
            }

            // ─── Strategy advice ───
            if !stopped_this_bar {
                let advice = strategy
                    .evaluate(self.dataset, t)
                    .map_err(|source| EngineError::Strategy { bar_index: t, source })?;
                self.check_advice(t, &advice)?;

                match advice {
                    Advice::EnterLong { lot, stop_price } if position.is_none() => {
                        position = Some(open_position(
                            Side::Long, bar, t, lot, stop_price, slippage,
                        ));
                    }
                    Advice::EnterShort { lot, stop_price } if position.is_none() => {
                        position = Some(open_position(
                            Side::Short, bar, t, lot, stop_price, slippage,
                        ));
                    }
                    Advice::Exit => {
                        if let Some(pos) = position.take() {
                            let exit = exit_fill_price(pos.side, bar.close, slippage);
                            let trade = close_position(
                                pos, exit, bar.timestamp, t, ExitReason::Signal, fee_rate,
                            );
                            balance += trade.net_pnl;
                            trades.push(trade);
                        }
                    }
                    // Hold, or an entry while already in a position.
                    _ => {}
                }
            }

            // ─── Forced close at end of data ───
            if t + 1 == n {
                if let Some(pos) = position.take() {
                    let exit = exit_fill_price(pos.side, bar.close, slippage);
                    let trade = close_position(
                        pos, exit, bar.timestamp, t, ExitReason::ForcedClose, fee_rate,
                    );
                    balance += trade.net_pnl;
                    trades.push(trade);
                }
            }

            // ─── Mark-to-market equity point ───
            let unrealized = position
                .as_ref()
                .map(|p| p.unrealized_pnl(bar.close))
                .unwrap_or(0.0);
            let equity = balance + unrealized;
            let return_pct = if t == 0 || prev_equity <= 0.0 {
                0.0
            } else {
                (equity - prev_equity) / prev_equity
            };
            equity_curve.push(EquityPoint {
                timestamp: bar.timestamp,
                equity,
                return_pct,
            });
            prev_equity = equity;
        }

        debug_assert!(position.is_none(), "engine must end flat");

        Ok(RunResult {
            trades,
            final_equity: balance,
            equity_curve,
            bar_count: n,
            dataset_hash: self.dataset.fingerprint(),
        })
    }

    /// A malformed advice (non-finite or non-positive lot, non-finite stop)
    /// is a strategy bug and aborts the run like any other strategy error.
    fn check_advice(&self, bar_index: usize, advice: &Advice) -> Result<(), EngineError> {
        let (lot, stop) = match advice {
            Advice::EnterLong { lot, stop_price } | Advice::EnterShort { lot, stop_price } => {
                (*lot, *stop_price)
            }
            _ => return Ok(()),
        };
        if !(lot.is_finite() && lot > 0.0) {
            return Err(EngineError::Strategy {
                bar_index,
                source: format!("entry lot must be positive and finite, got {lot}").into(),
            });
        }
        if let Some(stop) = stop {
            if !stop.is_finite() {
                return Err(EngineError::Strategy {
                    bar_index,
                    source: format!("stop price must be finite, got {stop}").into(),
                });
            }
        }
        Ok(())
    }
}

fn open_position(
    side: Side,
    bar: &Bar,
    bar_index: usize,
    lot: f64,
    stop_price: Option<f64>,
    slippage: f64,
) -> Position {
    Position {
        side,
        entry_price: entry_fill_price(side, bar.close, slippage),
        lot,
        stop_price,
        entry_time: bar.timestamp,
        entry_bar: bar_index,
    }
}

fn close_position(
    pos: Position,
    exit_price: f64,
    exit_time: DateTime<Utc>,
    exit_bar: usize,
    exit_reason: ExitReason,
    fee_rate: f64,
) -> TradeRecord {
    let gross_pnl = (exit_price - pos.entry_price) * pos.lot * pos.side.sign();
    let fees = round_trip_fees(pos.entry_price, exit_price, pos.lot, fee_rate);
    TradeRecord {
        side: pos.side,
        entry_time: pos.entry_time,
        entry_price: pos.entry_price,
        exit_time,
        exit_price,
        lot: pos.lot,
        gross_pnl,
        fees,
        net_pnl: gross_pnl - fees,
        bars_held: exit_bar - pos.entry_bar,
        exit_reason,
    }
}
