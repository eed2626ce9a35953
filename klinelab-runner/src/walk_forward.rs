//! Walk-forward validation — out-of-sample robustness checks.
//!
//! The dataset is cut into sequential train/test folds. Within a fold the
//! test window always starts at the bar after the train window ends, so no
//! test bar's timestamp can precede a train bar's timestamp. Slicing is
//! done on the validated `Dataset` itself, which keeps the no-look-ahead
//! property structural rather than something each strategy must respect.
//!
//! Fold geometry:
//! - **Anchored**: every train window starts at bar 0 and grows.
//! - **Rolling**: train windows keep a fixed length and slide forward.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use klinelab_core::domain::Dataset;
use klinelab_core::strategy::Strategy;
use klinelab_core::{Engine, EngineConfig, EngineError};

use crate::metrics::{returns, sharpe_ratio, MetricsError};

/// How the train window moves between folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitMode {
    Anchored,
    Rolling,
}

/// Walk-forward configuration.
///
/// Defaults assume hourly crypto bars: at least 30 days of training
/// (720 bars) and at least 7 days of testing (168 bars) per fold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    pub n_folds: usize,
    pub min_train_bars: usize,
    pub min_test_bars: usize,
    pub mode: SplitMode,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            n_folds: 5,
            min_train_bars: 720,
            min_test_bars: 168,
            mode: SplitMode::Anchored,
        }
    }
}

/// One fold's bar ranges, both half-open `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldSpec {
    pub fold_index: usize,
    pub train_start: usize,
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
}

/// Errors from fold creation or per-fold evaluation.
#[derive(Debug, Error)]
pub enum WalkForwardError {
    #[error("insufficient data: {total_bars} bars, need at least {min_bars}")]
    InsufficientData { total_bars: usize, min_bars: usize },
    #[error("cannot create {n_folds} folds from {total_bars} bars")]
    FoldCreationFailed { n_folds: usize, total_bars: usize },
    #[error("backtest failed in fold {fold}: {source}")]
    Backtest {
        fold: usize,
        #[source]
        source: EngineError,
    },
    #[error("metrics failed in fold {fold}: {source}")]
    Metrics {
        fold: usize,
        #[source]
        source: MetricsError,
    },
}

/// Cut `total_bars` into sequential train/test folds.
///
/// The test region after the first training window is divided evenly; any
/// remainder is simply left unused at the tail rather than producing a
/// short final fold.
pub fn create_folds(
    total_bars: usize,
    config: &WalkForwardConfig,
) -> Result<Vec<FoldSpec>, WalkForwardError> {
    // Zero-width train or test windows would slice empty datasets and
    // report sentinel-zero Sharpe rows that look like real results.
    if config.n_folds == 0 || config.min_train_bars == 0 || config.min_test_bars == 0 {
        return Err(WalkForwardError::FoldCreationFailed {
            n_folds: config.n_folds,
            total_bars,
        });
    }
    let min_bars = config.min_train_bars + config.min_test_bars;
    if total_bars < min_bars {
        return Err(WalkForwardError::InsufficientData {
            total_bars,
            min_bars,
        });
    }

    let test_size = (total_bars - config.min_train_bars) / config.n_folds;
    if test_size < config.min_test_bars {
        return Err(WalkForwardError::FoldCreationFailed {
            n_folds: config.n_folds,
            total_bars,
        });
    }

    let mut folds = Vec::with_capacity(config.n_folds);
    for i in 0..config.n_folds {
        let train_end = config.min_train_bars + i * test_size;
        let train_start = match config.mode {
            SplitMode::Anchored => 0,
            SplitMode::Rolling => train_end - config.min_train_bars,
        };
        let test_end = train_end + test_size;
        if test_end > total_bars {
            break;
        }
        folds.push(FoldSpec {
            fold_index: i,
            train_start,
            train_end,
            test_start: train_end,
            test_end,
        });
    }
    Ok(folds)
}

/// Per-fold in-sample vs out-of-sample comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldResult {
    pub fold_index: usize,
    pub train_sharpe: f64,
    pub test_sharpe: f64,
    pub train_trades: usize,
    pub test_trades: usize,
}

/// Full walk-forward report.
///
/// A `mean_test_sharpe` far below `mean_train_sharpe` is the classic
/// overfit signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardReport {
    pub fold_results: Vec<FoldResult>,
    pub mean_train_sharpe: f64,
    pub mean_test_sharpe: f64,
}

/// Backtest a strategy on each fold's train and test windows separately.
///
/// The same strategy (fixed parameters) runs on both windows; this
/// measures robustness of one parameter set, not per-fold re-fitting.
pub fn run_walk_forward(
    data: &Dataset,
    strategy: &dyn Strategy,
    engine_config: EngineConfig,
    wf_config: &WalkForwardConfig,
    periods_per_year: f64,
) -> Result<WalkForwardReport, WalkForwardError> {
    let folds = create_folds(data.len(), wf_config)?;

    let mut fold_results = Vec::with_capacity(folds.len());
    for fold in &folds {
        let train = data.slice(fold.train_start, fold.train_end);
        let test = data.slice(fold.test_start, fold.test_end);

        let train_run = run_window(&train, strategy, engine_config, fold.fold_index)?;
        let test_run = run_window(&test, strategy, engine_config, fold.fold_index)?;

        fold_results.push(FoldResult {
            fold_index: fold.fold_index,
            train_sharpe: window_sharpe(&train_run, periods_per_year),
            test_sharpe: window_sharpe(&test_run, periods_per_year),
            train_trades: train_run.trades.len(),
            test_trades: test_run.trades.len(),
        });
    }

    let mean = |f: fn(&FoldResult) -> f64| -> f64 {
        if fold_results.is_empty() {
            0.0
        } else {
            fold_results.iter().map(f).sum::<f64>() / fold_results.len() as f64
        }
    };
    Ok(WalkForwardReport {
        mean_train_sharpe: mean(|r| r.train_sharpe),
        mean_test_sharpe: mean(|r| r.test_sharpe),
        fold_results,
    })
}

fn run_window(
    window: &Dataset,
    strategy: &dyn Strategy,
    config: EngineConfig,
    fold: usize,
) -> Result<klinelab_core::RunResult, WalkForwardError> {
    let engine =
        Engine::new(window, config).map_err(|source| WalkForwardError::Backtest { fold, source })?;
    engine
        .run(strategy)
        .map_err(|source| WalkForwardError::Backtest { fold, source })
}

fn window_sharpe(run: &klinelab_core::RunResult, periods_per_year: f64) -> f64 {
    let equity: Vec<f64> = run.equity_curve.iter().map(|p| p.equity).collect();
    sharpe_ratio(&returns(&equity), 0.0, periods_per_year)
}
