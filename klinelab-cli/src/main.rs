//! KlineLab CLI — backtest, grid scan, and walk-forward commands.
//!
//! Commands:
//! - `run` — execute one backtest from a TOML config and save artifacts
//! - `scan` — sweep a parameter grid and write the result table as CSV
//! - `walkforward` — evaluate one parameter set across train/test folds

mod config;
mod data_loader;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use klinelab_core::Engine;
use klinelab_runner::export::{export_scan_csv, generate_report, save_artifacts, BacktestReport};
use klinelab_runner::metrics::DEFAULT_PERIODS_PER_YEAR;
use klinelab_runner::walk_forward::run_walk_forward;
use klinelab_runner::{Objective, ScanMode, Scanner, Summary};

use config::{AppConfig, BreakoutFactory};
use data_loader::load_bars_csv;

#[derive(Parser)]
#[command(
    name = "klinelab",
    about = "KlineLab CLI — kline backtesting and parameter optimization"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one backtest and save the artifact bundle.
    Run {
        /// Bar CSV (timestamp,open,high,low,close,volume).
        #[arg(long)]
        data: PathBuf,

        /// TOML config with [engine] and [strategy] sections.
        #[arg(long)]
        config: PathBuf,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Also print the full Markdown report.
        #[arg(long, default_value_t = false)]
        report: bool,
    },
    /// Sweep the [[param]] grid and write a scan table.
    Scan {
        /// Bar CSV (timestamp,open,high,low,close,volume).
        #[arg(long)]
        data: PathBuf,

        /// TOML config with [engine] and [[param]] sections.
        #[arg(long)]
        config: PathBuf,

        /// Output CSV path.
        #[arg(long, default_value = "scan.csv")]
        output: PathBuf,

        /// Ranking objective: total_profit, sharpe, max_drawdown.
        #[arg(long, default_value = "sharpe")]
        objective: String,

        /// Run grid points sequentially instead of across worker threads.
        #[arg(long, default_value_t = false)]
        no_parallel: bool,

        /// Record failed grid points and keep scanning instead of aborting.
        #[arg(long, default_value_t = false)]
        skip_failures: bool,
    },
    /// Evaluate the [strategy] parameters across walk-forward folds.
    Walkforward {
        /// Bar CSV (timestamp,open,high,low,close,volume).
        #[arg(long)]
        data: PathBuf,

        /// TOML config with [engine], [strategy], and [walk_forward] sections.
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            data,
            config,
            output_dir,
            report,
        } => run_cmd(data, config, output_dir, report),
        Commands::Scan {
            data,
            config,
            output,
            objective,
            no_parallel,
            skip_failures,
        } => scan_cmd(data, config, output, objective, no_parallel, skip_failures),
        Commands::Walkforward { data, config } => walkforward_cmd(data, config),
    }
}

fn run_cmd(data: PathBuf, config: PathBuf, output_dir: PathBuf, report: bool) -> Result<()> {
    let config = AppConfig::from_file(&config)?;
    let dataset = load_bars_csv(&data)?;
    let strategy = config.strategy()?;
    let engine_config = config.engine_config();

    let engine = Engine::new(&dataset, engine_config)?;
    let run = engine.run(&strategy)?;

    let equity: Vec<f64> = run.equity_curve.iter().map(|p| p.equity).collect();
    let summary = Summary::compute(&equity, &run.trades, DEFAULT_PERIODS_PER_YEAR)?;
    print_summary(&summary);

    let bt_report = BacktestReport::from_run("channel_breakout", &run, &engine_config, summary);
    if report {
        println!("\n{}", generate_report(&bt_report));
    }

    let run_dir = save_artifacts(&bt_report, &output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());

    Ok(())
}

fn scan_cmd(
    data: PathBuf,
    config: PathBuf,
    output: PathBuf,
    objective: String,
    no_parallel: bool,
    skip_failures: bool,
) -> Result<()> {
    let objective = parse_objective(&objective)?;
    let config = AppConfig::from_file(&config)?;
    let dataset = load_bars_csv(&data)?;
    let grid = config.grid()?;
    let factory = BreakoutFactory {
        defaults: config.strategy,
    };

    let mode = if skip_failures {
        ScanMode::SkipFailures
    } else {
        ScanMode::FailFast
    };
    let results = Scanner::new(&dataset, config.engine_config())
        .with_parallelism(!no_parallel)
        .with_mode(mode)
        .scan(&grid, &factory)?;

    println!(
        "Scanned {} grid points over {} bars ({} failed)",
        results.len() + results.failures().len(),
        dataset.len(),
        results.failures().len()
    );
    for failure in results.failures() {
        eprintln!("  failed [{}]: {}", failure.params, failure.reason);
    }

    println!("\nTop results:");
    for row in results.sorted_by(objective).iter().take(10) {
        println!(
            "  [{}]  profit={:.2}  sharpe={:.3}  dd={:.2}%  trades={}",
            row.params,
            row.summary.total_profit,
            row.summary.sharpe,
            row.summary.max_drawdown * 100.0,
            row.summary.trade_count
        );
    }

    let csv = export_scan_csv(&results, &grid)?;
    std::fs::write(&output, csv)?;
    println!("\nScan table written to: {}", output.display());

    Ok(())
}

fn walkforward_cmd(data: PathBuf, config: PathBuf) -> Result<()> {
    let config = AppConfig::from_file(&config)?;
    let dataset = load_bars_csv(&data)?;
    let strategy = config.strategy()?;
    let wf_config = config.walk_forward_config()?;

    let report = run_walk_forward(
        &dataset,
        &strategy,
        config.engine_config(),
        &wf_config,
        DEFAULT_PERIODS_PER_YEAR,
    )?;

    println!("fold  train_sharpe  test_sharpe  train_trades  test_trades");
    for fold in &report.fold_results {
        println!(
            "{:>4}  {:>12.3}  {:>11.3}  {:>12}  {:>11}",
            fold.fold_index,
            fold.train_sharpe,
            fold.test_sharpe,
            fold.train_trades,
            fold.test_trades
        );
    }
    println!(
        "\nmean train sharpe: {:.3}\nmean test sharpe:  {:.3}",
        report.mean_train_sharpe, report.mean_test_sharpe
    );

    Ok(())
}

fn parse_objective(name: &str) -> Result<Objective> {
    Ok(match name {
        "total_profit" => Objective::TotalProfit,
        "sharpe" => Objective::Sharpe,
        "max_drawdown" => Objective::MaxDrawdown,
        _ => bail!("unknown objective '{name}'. Valid: total_profit, sharpe, max_drawdown"),
    })
}

fn print_summary(s: &Summary) {
    println!("Trades:        {}", s.trade_count);
    println!("Total profit:  {:.2}", s.total_profit);
    println!("Final equity:  {:.2}", s.final_equity);
    println!("Win rate:      {:.1}%", s.win_rate * 100.0);
    println!("Sharpe:        {:.3}", s.sharpe);
    println!("Max drawdown:  {:.2}%", s.max_drawdown * 100.0);
    println!("Profit factor: {:.2}", s.profit_factor);
    println!("CAGR:          {:.2}%", s.cagr * 100.0);
}
