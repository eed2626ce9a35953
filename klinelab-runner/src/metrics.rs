//! Performance metrics — pure functions that compute strategy statistics.
//!
//! Every metric is a pure function: trade list and/or equity series in,
//! scalar out. Degenerate inputs (zero variance, empty trade list) return
//! documented sentinels instead of NaN, so nothing non-finite ever reaches
//! a report. The one exception is an empty equity curve, which is an input
//! error, not a valid backtest outcome.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use klinelab_core::domain::TradeRecord;

/// Periods per year for hourly bars on a 24/7 crypto market.
pub const DEFAULT_PERIODS_PER_YEAR: f64 = 8760.0;

/// Cap applied to profit factor when there are wins and no losses, keeping
/// CSV/JSON artifacts finite.
pub const PROFIT_FACTOR_CAP: f64 = 100.0;

/// Errors from metric computation.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("equity curve is empty")]
    EmptyInput,
}

/// Aggregate performance metrics for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_profit: f64,
    pub win_rate: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub profit_factor: f64,
    pub cagr: f64,
    pub trade_count: usize,
    pub final_equity: f64,
}

impl Summary {
    /// Compute all metrics from an equity series and the trade ledger.
    ///
    /// `total_profit` comes from the ledger (sum of net PnL), not from the
    /// equity endpoints, so it is exact even under mark-to-market noise.
    pub fn compute(
        equity: &[f64],
        trades: &[TradeRecord],
        periods_per_year: f64,
    ) -> Result<Self, MetricsError> {
        if equity.is_empty() {
            return Err(MetricsError::EmptyInput);
        }
        let rets = returns(equity);
        Ok(Self {
            total_profit: trades.iter().map(|t| t.net_pnl).sum(),
            win_rate: win_rate(trades),
            sharpe: sharpe_ratio(&rets, 0.0, periods_per_year),
            max_drawdown: max_drawdown(equity)?,
            profit_factor: profit_factor(trades),
            cagr: cagr(equity, periods_per_year),
            trade_count: trades.len(),
            final_equity: equity[equity.len() - 1],
        })
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Maximum peak-to-trough decline as a fraction of the running peak.
///
/// Always in `[0, 1]`; 0 for a non-decreasing curve. An empty curve is an
/// input error.
pub fn max_drawdown(equity: &[f64]) -> Result<f64, MetricsError> {
    if equity.is_empty() {
        return Err(MetricsError::EmptyInput);
    }
    let mut peak = equity[0];
    let mut max_dd = 0.0_f64;
    for &eq in equity {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            let dd = (peak - eq) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    Ok(max_dd.min(1.0))
}

/// Compound annual growth rate from the first to the last equity value.
///
/// Returns 0.0 when fewer than two periods elapsed or the start value is
/// non-positive.
pub fn cagr(equity: &[f64], periods_per_year: f64) -> f64 {
    if equity.len() < 2 || periods_per_year <= 0.0 {
        return 0.0;
    }
    let initial = equity[0];
    let final_eq = equity[equity.len() - 1];
    if initial <= 0.0 || final_eq <= 0.0 {
        return 0.0;
    }
    let years = (equity.len() - 1) as f64 / periods_per_year;
    if years <= 0.0 {
        return 0.0;
    }
    (final_eq / initial).powf(1.0 / years) - 1.0
}

/// Annualized Sharpe ratio from per-period returns.
///
/// Sharpe = mean(excess returns) / std(returns) * sqrt(periods_per_year).
/// Returns 0.0 (never NaN) for zero variance or fewer than 2 returns.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> f64 {
    if returns.len() < 2 || periods_per_year <= 0.0 {
        return 0.0;
    }
    let per_period_rf = risk_free_rate / periods_per_year;
    let excess: Vec<f64> = returns.iter().map(|r| r - per_period_rf).collect();
    let mean = mean_f64(&excess);
    let std = std_dev(&excess);
    if std < 1e-15 {
        return 0.0;
    }
    (mean / std) * periods_per_year.sqrt()
}

/// Win rate: fraction of trades with positive net PnL. 0.0 for no trades.
pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64
}

/// Profit factor: gross profits / gross losses.
///
/// Capped at [`PROFIT_FACTOR_CAP`] when there are wins and no losses;
/// 0.0 when there are no wins.
pub fn profit_factor(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = trades
        .iter()
        .filter(|t| t.net_pnl > 0.0)
        .map(|t| t.net_pnl)
        .sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.net_pnl < 0.0)
        .map(|t| t.net_pnl.abs())
        .sum();

    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 {
            PROFIT_FACTOR_CAP
        } else {
            0.0
        };
    }
    (gross_profit / gross_loss).min(PROFIT_FACTOR_CAP)
}

// ─── Period aggregation ─────────────────────────────────────────────

/// Calendar bucket size for [`aggregate_by_period`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    Day,
    Week,
    Month,
}

/// One bucket of the period aggregation table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRow {
    pub period: String,
    pub trade_count: usize,
    pub win_rate: f64,
    pub avg_return: f64,
    pub total_pnl: f64,
}

/// Group closed trades by the period containing their **exit** time.
///
/// PnL is realized at exit, so a trade straddling a boundary is attributed
/// unambiguously to its exit bucket. Buckets come back chronologically.
pub fn aggregate_by_period(trades: &[TradeRecord], period: Period) -> Vec<PeriodRow> {
    use chrono::Datelike;

    let mut buckets: BTreeMap<String, Vec<&TradeRecord>> = BTreeMap::new();
    for trade in trades {
        let exit = trade.exit_time;
        let key = match period {
            Period::Day => exit.format("%Y-%m-%d").to_string(),
            Period::Week => {
                let week = exit.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Period::Month => exit.format("%Y-%m").to_string(),
        };
        buckets.entry(key).or_default().push(trade);
    }

    buckets
        .into_iter()
        .map(|(key, bucket)| {
            let count = bucket.len();
            let winners = bucket.iter().filter(|t| t.is_winner()).count();
            let avg_return =
                bucket.iter().map(|t| t.return_frac()).sum::<f64>() / count as f64;
            PeriodRow {
                period: key,
                trade_count: count,
                win_rate: winners as f64 / count as f64,
                avg_return,
                total_pnl: bucket.iter().map(|t| t.net_pnl).sum(),
            }
        })
        .collect()
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Per-period returns from an equity series.
pub fn returns(equity: &[f64]) -> Vec<f64> {
    if equity.len() < 2 {
        return Vec::new();
    }
    equity
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
