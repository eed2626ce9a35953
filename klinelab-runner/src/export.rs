//! Reporting and export — JSON, CSV, and Markdown artifact generation.
//!
//! Three export formats for backtest and scan results:
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: trade tape, equity curve, and scan tables for external tools
//! - **Markdown**: human-readable single-run reports
//!
//! All persisted artifacts carry a `schema_version` field. Versions newer
//! than this build understands are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use klinelab_core::domain::{EquityPoint, TradeRecord};
use klinelab_core::{EngineConfig, RunResult};

use crate::metrics::Summary;
use crate::optimizer::{ParamGrid, ScanResults};

/// Current artifact schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// The complete, serializable record of one backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub schema_version: u32,
    pub strategy: String,
    pub summary: Summary,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<EquityPoint>,
    pub initial_balance: f64,
    pub slippage_rate: f64,
    pub fee_rate: f64,
    pub bar_count: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub dataset_hash: String,
}

impl BacktestReport {
    /// Assemble a report from a finished run.
    ///
    /// A `RunResult` always has at least one equity point (datasets are
    /// non-empty by construction), which provides the time range.
    pub fn from_run(
        strategy: impl Into<String>,
        run: &RunResult,
        config: &EngineConfig,
        summary: Summary,
    ) -> Self {
        let start = run
            .equity_curve
            .first()
            .map(|p| p.timestamp)
            .unwrap_or_default();
        let end = run
            .equity_curve
            .last()
            .map(|p| p.timestamp)
            .unwrap_or_default();
        Self {
            schema_version: SCHEMA_VERSION,
            strategy: strategy.into(),
            summary,
            trades: run.trades.clone(),
            equity_curve: run.equity_curve.clone(),
            initial_balance: config.initial_balance,
            slippage_rate: config.slippage_rate,
            fee_rate: config.fee_rate,
            bar_count: run.bar_count,
            start,
            end,
            dataset_hash: run.dataset_hash.clone(),
        }
    }
}

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `BacktestReport` to pretty JSON.
pub fn export_json(report: &BacktestReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize BacktestReport to JSON")
}

/// Deserialize a `BacktestReport` from JSON, rejecting newer schema versions.
pub fn import_json(json: &str) -> Result<BacktestReport> {
    let report: BacktestReport =
        serde_json::from_str(json).context("failed to deserialize BacktestReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export the trade tape as CSV.
///
/// Columns: entry_time, exit_time, side, entry_price, exit_price, lot,
/// gross_pnl, fees, net_pnl, bars_held, exit_reason
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "entry_time",
        "exit_time",
        "side",
        "entry_price",
        "exit_price",
        "lot",
        "gross_pnl",
        "fees",
        "net_pnl",
        "bars_held",
        "exit_reason",
    ])?;

    for t in trades {
        wtr.write_record([
            &t.entry_time.to_rfc3339(),
            &t.exit_time.to_rfc3339(),
            &t.side.to_string(),
            &format!("{:.8}", t.entry_price),
            &format!("{:.8}", t.exit_price),
            &format!("{:.8}", t.lot),
            &format!("{:.2}", t.gross_pnl),
            &format!("{:.2}", t.fees),
            &format!("{:.2}", t.net_pnl),
            &t.bars_held.to_string(),
            &t.exit_reason.to_string(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export the equity curve as CSV with timestamp, equity, return_pct columns.
pub fn export_equity_csv(equity_curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "equity", "return_pct"])?;
    for point in equity_curve {
        wtr.write_record([
            &point.timestamp.to_rfc3339(),
            &format!("{:.2}", point.equity),
            &format!("{:.8}", point.return_pct),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export a scan result table as CSV.
///
/// Parameter columns come first, in the grid's axis order, followed by the
/// summary metrics. Rows keep the grid's enumeration order.
pub fn export_scan_csv(results: &ScanResults, grid: &ParamGrid) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header: Vec<String> = grid.axes().iter().map(|a| a.name.clone()).collect();
    header.extend(
        [
            "total_profit",
            "final_equity",
            "win_rate",
            "sharpe",
            "max_drawdown",
            "profit_factor",
            "cagr",
            "trade_count",
        ]
        .map(String::from),
    );
    wtr.write_record(&header)?;

    for row in results.all() {
        let mut record: Vec<String> = grid
            .axes()
            .iter()
            .map(|a| {
                row.params
                    .get(&a.name)
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            })
            .collect();
        let s = &row.summary;
        record.push(format!("{:.2}", s.total_profit));
        record.push(format!("{:.2}", s.final_equity));
        record.push(format!("{:.4}", s.win_rate));
        record.push(format!("{:.4}", s.sharpe));
        record.push(format!("{:.4}", s.max_drawdown));
        record.push(format!("{:.4}", s.profit_factor));
        record.push(format!("{:.6}", s.cagr));
        record.push(s.trade_count.to_string());
        wtr.write_record(&record)?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a single backtest run.
///
/// Creates a directory named `{strategy}_{timestamp}/` under `output_dir`
/// containing:
/// - `manifest.json` — the full `BacktestReport`
/// - `trades.csv` — the trade tape
/// - `equity.csv` — the per-bar equity curve
///
/// Returns the path to the created directory.
pub fn save_artifacts(report: &BacktestReport, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!(
        "{}_{}",
        report.strategy,
        Utc::now().format("%Y%m%d_%H%M%S")
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let json = export_json(report)?;
    std::fs::write(run_dir.join("manifest.json"), &json)?;

    let trades_csv = export_trades_csv(&report.trades)?;
    std::fs::write(run_dir.join("trades.csv"), &trades_csv)?;

    let equity_csv = export_equity_csv(&report.equity_curve)?;
    std::fs::write(run_dir.join("equity.csv"), &equity_csv)?;

    Ok(run_dir)
}

/// Load a `BacktestReport` from an artifact directory's manifest.json.
///
/// Rejects newer schema versions.
pub fn load_artifacts(dir: &Path) -> Result<BacktestReport> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}

// ─── Markdown report ────────────────────────────────────────────────

/// Generate a Markdown report for a single backtest run.
pub fn generate_report(report: &BacktestReport) -> String {
    let mut md = String::with_capacity(1024);

    md.push_str("# Backtest Report\n\n");

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Strategy | {} |\n", report.strategy));
    md.push_str(&format!(
        "| Period | {} to {} |\n",
        report.start.format("%Y-%m-%d %H:%M"),
        report.end.format("%Y-%m-%d %H:%M")
    ));
    md.push_str(&format!("| Bars | {} |\n", report.bar_count));
    md.push_str(&format!(
        "| Initial Balance | {:.2} |\n",
        report.initial_balance
    ));
    md.push_str(&format!(
        "| Slippage / Fee | {:.4} / {:.4} |\n",
        report.slippage_rate, report.fee_rate
    ));
    md.push_str(&format!("| Dataset Hash | {} |\n", report.dataset_hash));
    md.push('\n');

    let s = &report.summary;
    md.push_str("## Performance Summary\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Total Profit | {:.2} |\n", s.total_profit));
    md.push_str(&format!("| Final Equity | {:.2} |\n", s.final_equity));
    md.push_str(&format!("| CAGR | {:.2}% |\n", s.cagr * 100.0));
    md.push_str(&format!("| Sharpe | {:.3} |\n", s.sharpe));
    md.push_str(&format!("| Max Drawdown | {:.2}% |\n", s.max_drawdown * 100.0));
    md.push_str(&format!("| Win Rate | {:.1}% |\n", s.win_rate * 100.0));
    md.push_str(&format!("| Profit Factor | {:.2} |\n", s.profit_factor));
    md.push_str(&format!("| Trades | {} |\n", s.trade_count));
    md.push('\n');

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use klinelab_core::domain::{ExitReason, Side};

    // ─── Test helpers ────────────────────────────────────────────────

    fn sample_trade() -> TradeRecord {
        let entry = Utc.with_ymd_and_hms(2024, 3, 15, 8, 0, 0).unwrap();
        TradeRecord {
            side: Side::Long,
            entry_time: entry,
            entry_price: 45_050.0,
            exit_time: entry + Duration::hours(17),
            exit_price: 46_825.0,
            lot: 0.5,
            gross_pnl: 887.5,
            fees: 22.97,
            net_pnl: 864.53,
            bars_held: 17,
            exit_reason: ExitReason::Signal,
        }
    }

    fn sample_equity() -> Vec<EquityPoint> {
        let base = Utc.with_ymd_and_hms(2024, 3, 15, 8, 0, 0).unwrap();
        [10_000.0, 10_050.0, 10_120.0, 10_864.53]
            .iter()
            .enumerate()
            .map(|(i, &equity)| EquityPoint {
                timestamp: base + Duration::hours(i as i64),
                equity,
                return_pct: 0.0,
            })
            .collect()
    }

    fn sample_report() -> BacktestReport {
        let equity = sample_equity();
        BacktestReport {
            schema_version: SCHEMA_VERSION,
            strategy: "channel_breakout".into(),
            summary: Summary {
                total_profit: 864.53,
                win_rate: 1.0,
                sharpe: 1.25,
                max_drawdown: 0.08,
                profit_factor: 100.0,
                cagr: 0.12,
                trade_count: 1,
                final_equity: 10_864.53,
            },
            trades: vec![sample_trade()],
            start: equity.first().unwrap().timestamp,
            end: equity.last().unwrap().timestamp,
            equity_curve: equity,
            initial_balance: 10_000.0,
            slippage_rate: 0.0005,
            fee_rate: 0.001,
            bar_count: 4,
            dataset_hash: "abc123".into(),
        }
    }

    // ─── JSON round-trip ─────────────────────────────────────────────

    #[test]
    fn json_roundtrip() {
        let original = sample_report();
        let json = export_json(&original).unwrap();
        let restored = import_json(&json).unwrap();

        assert_eq!(restored.schema_version, SCHEMA_VERSION);
        assert_eq!(restored.strategy, original.strategy);
        assert_eq!(restored.trades.len(), original.trades.len());
        assert_eq!(restored.equity_curve.len(), original.equity_curve.len());
        assert_eq!(restored.dataset_hash, original.dataset_hash);
        assert!((restored.summary.sharpe - original.summary.sharpe).abs() < 1e-10);
        assert_eq!(restored.start, original.start);
    }

    #[test]
    fn json_rejects_newer_version() {
        let mut report = sample_report();
        report.schema_version = 99;
        let json = export_json(&report).unwrap();
        let err = import_json(&json).unwrap_err();
        assert!(err.to_string().contains("unsupported schema version 99"));
    }

    // ─── CSV trades ─────────────────────────────────────────────────

    #[test]
    fn csv_trades_columns_and_content() {
        let csv = export_trades_csv(&[sample_trade()]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2); // header + 1 data row

        assert_eq!(
            lines[0],
            "entry_time,exit_time,side,entry_price,exit_price,lot,\
             gross_pnl,fees,net_pnl,bars_held,exit_reason"
        );
        assert!(lines[1].contains("long"));
        assert!(lines[1].contains("864.53"));
        assert!(lines[1].contains("signal"));
        assert!(lines[1].contains("2024-03-15T08:00:00+00:00"));
    }

    #[test]
    fn csv_empty_trades_is_header_only() {
        let csv = export_trades_csv(&[]).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }

    // ─── CSV equity ─────────────────────────────────────────────────

    #[test]
    fn csv_equity_basic() {
        let csv = export_equity_csv(&sample_equity()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 5); // header + 4 rows
        assert_eq!(lines[0], "timestamp,equity,return_pct");
        assert!(lines[1].contains("10000.00"));
        assert!(lines[4].contains("10864.53"));
    }

    // ─── CSV scan table ─────────────────────────────────────────────

    #[test]
    fn csv_scan_param_columns_in_axis_order() {
        use crate::optimizer::{ParamGrid, Scanner, StrategyFactory};
        use klinelab_core::domain::{Bar, Dataset};
        use klinelab_core::strategy::{ChannelBreakout, Strategy, StrategyError};
        use klinelab_core::EngineConfig;

        struct F;
        impl StrategyFactory for F {
            fn build(
                &self,
                params: &crate::optimizer::ParamSet,
            ) -> Result<Box<dyn Strategy>, StrategyError> {
                Ok(Box::new(ChannelBreakout::new(
                    params.get("lookback").unwrap() as usize,
                    params.get("stop_pct").unwrap(),
                    1.0,
                )))
            }
        }

        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bars: Vec<Bar> = (0..150)
            .map(|i| {
                let close = 100.0 + ((i % 30) as f64 - 15.0).abs() + i as f64 * 0.05;
                Bar {
                    timestamp: base + Duration::hours(i as i64),
                    open: close - 0.1,
                    high: close + 0.5,
                    low: close - 0.5,
                    close,
                    volume: 1_000.0,
                }
            })
            .collect();
        let data = Dataset::from_bars(bars).unwrap();

        let grid = ParamGrid::default()
            .axis("lookback", vec![10.0, 20.0])
            .axis("stop_pct", vec![0.05]);
        let results = Scanner::new(&data, EngineConfig::default())
            .scan(&grid, &F)
            .unwrap();

        let csv = export_scan_csv(&results, &grid).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3); // header + 2 rows
        assert!(lines[0].starts_with("lookback,stop_pct,total_profit"));
        assert!(lines[0].ends_with("trade_count"));
        assert!(lines[1].starts_with("10,0.05,"));
        assert!(lines[2].starts_with("20,0.05,"));
    }

    // ─── Markdown report ────────────────────────────────────────────

    #[test]
    fn markdown_report_has_sections() {
        let md = generate_report(&sample_report());

        assert!(md.contains("# Backtest Report"));
        assert!(md.contains("## Metadata"));
        assert!(md.contains("## Performance Summary"));
        assert!(md.contains("| Strategy | channel_breakout |"));
        assert!(md.contains("| Sharpe | 1.250 |"));
        assert!(md.contains("| Win Rate | 100.0% |"));
        assert!(md.contains("abc123"));
    }

    // ─── Save/load artifacts ────────────────────────────────────────

    #[test]
    fn save_load_artifacts_roundtrip() {
        let report = sample_report();
        let dir = tempfile::tempdir().unwrap();
        let run_dir = save_artifacts(&report, dir.path()).unwrap();

        assert!(run_dir.join("manifest.json").exists());
        assert!(run_dir.join("trades.csv").exists());
        assert!(run_dir.join("equity.csv").exists());

        let loaded = load_artifacts(&run_dir).unwrap();
        assert_eq!(loaded.strategy, report.strategy);
        assert_eq!(loaded.schema_version, SCHEMA_VERSION);
        assert!((loaded.summary.total_profit - report.summary.total_profit).abs() < 1e-10);
    }
}
