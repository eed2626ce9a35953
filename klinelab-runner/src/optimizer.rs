//! Parameter grid optimizer — exhaustive scan over strategy parameters.
//!
//! The grid is the Cartesian product of named axes; combinations are
//! enumerated in lexicographic order (first axis slowest) and results come
//! back in that same order whether the scan runs sequentially or across
//! rayon workers. Each grid point gets a fresh engine and strategy over the
//! shared read-only dataset, so runs cannot contaminate each other.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use klinelab_core::domain::Dataset;
use klinelab_core::strategy::{Strategy, StrategyError};
use klinelab_core::{Engine, EngineConfig, EngineError};

use crate::metrics::{MetricsError, Summary, DEFAULT_PERIODS_PER_YEAR};

// ─── Grid ───────────────────────────────────────────────────────────

/// One named parameter dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamAxis {
    pub name: String,
    pub values: Vec<f64>,
}

/// The Cartesian product of parameter axes.
///
/// Axis order is significant: it fixes the enumeration order and the
/// column order of exported scan tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamGrid {
    axes: Vec<ParamAxis>,
}

impl ParamGrid {
    pub fn new(axes: Vec<ParamAxis>) -> Self {
        Self { axes }
    }

    pub fn axis(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.axes.push(ParamAxis {
            name: name.into(),
            values,
        });
        self
    }

    pub fn axes(&self) -> &[ParamAxis] {
        &self.axes
    }

    /// Number of combinations. Zero if any axis is empty or there are none.
    pub fn size(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.iter().map(|a| a.values.len()).product()
    }

    /// Materialize every combination, first axis varying slowest.
    pub fn combos(&self) -> Vec<ParamSet> {
        let size = self.size();
        let mut combos = Vec::with_capacity(size);
        for index in 0..size {
            let mut rem = index;
            let mut values: Vec<(String, f64)> = Vec::with_capacity(self.axes.len());
            for axis in self.axes.iter().rev() {
                let i = rem % axis.values.len();
                rem /= axis.values.len();
                values.push((axis.name.clone(), axis.values[i]));
            }
            values.reverse();
            combos.push(ParamSet { index, values });
        }
        combos
    }
}

/// One point in the grid: ordered `(name, value)` pairs plus its position
/// in the enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSet {
    pub index: usize,
    pub values: Vec<(String, f64)>,
}

impl ParamSet {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

/// Builds a concrete strategy from one grid point.
///
/// A factory error (unknown parameter name, out-of-range value) fails that
/// grid point the same way a strategy error would.
pub trait StrategyFactory: Send + Sync {
    fn build(&self, params: &ParamSet) -> Result<Box<dyn Strategy>, StrategyError>;
}

// ─── Scan control ───────────────────────────────────────────────────

/// What to do when one grid point fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMode {
    /// Abort the whole scan on the first failure (default).
    FailFast,
    /// Record the failure and keep scanning the remaining points.
    SkipFailures,
}

/// Cooperative cancellation handle, shared between the scan and its caller.
///
/// Checked between grid points, never mid-backtest; a cancelled scan
/// returns [`ScanError::Cancelled`] rather than partial results.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Errors that abort a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("parameter grid is empty")]
    EmptyGrid,
    #[error("scan cancelled")]
    Cancelled,
    #[error("factory rejected [{params}]: {reason}")]
    Factory { params: ParamSet, reason: String },
    #[error("backtest failed for [{params}]: {source}")]
    Engine {
        params: ParamSet,
        #[source]
        source: EngineError,
    },
    #[error("metrics failed for [{params}]: {source}")]
    Metrics {
        params: ParamSet,
        #[source]
        source: MetricsError,
    },
}

impl ScanError {
    fn into_failure(self) -> Result<ScanFailure, ScanError> {
        match self {
            ScanError::Factory { params, reason } => Ok(ScanFailure { params, reason }),
            ScanError::Engine { params, source } => Ok(ScanFailure {
                params,
                reason: source.to_string(),
            }),
            ScanError::Metrics { params, source } => Ok(ScanFailure {
                params,
                reason: source.to_string(),
            }),
            // Cancellation and an empty grid are never skippable.
            other => Err(other),
        }
    }
}

// ─── Results ────────────────────────────────────────────────────────

/// One completed grid point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRow {
    pub params: ParamSet,
    pub summary: Summary,
}

/// A grid point that failed in [`ScanMode::SkipFailures`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanFailure {
    pub params: ParamSet,
    pub reason: String,
}

/// Ranking criterion for scan results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    /// Highest total net profit first.
    TotalProfit,
    /// Highest Sharpe first.
    Sharpe,
    /// Smallest drawdown first.
    MaxDrawdown,
}

/// Scan output: completed rows in grid order, plus any recorded failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResults {
    rows: Vec<ScanRow>,
    failures: Vec<ScanFailure>,
}

impl ScanResults {
    pub fn all(&self) -> &[ScanRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn failures(&self) -> &[ScanFailure] {
        &self.failures
    }

    /// Rows re-ranked by the objective; ties keep grid order (stable sort).
    pub fn sorted_by(&self, objective: Objective) -> Vec<&ScanRow> {
        let mut rows: Vec<&ScanRow> = self.rows.iter().collect();
        rows.sort_by(|a, b| {
            let ord = match objective {
                Objective::TotalProfit => b
                    .summary
                    .total_profit
                    .partial_cmp(&a.summary.total_profit),
                Objective::Sharpe => b.summary.sharpe.partial_cmp(&a.summary.sharpe),
                Objective::MaxDrawdown => a
                    .summary
                    .max_drawdown
                    .partial_cmp(&b.summary.max_drawdown),
            };
            ord.unwrap_or(std::cmp::Ordering::Equal)
        });
        rows
    }

    pub fn best(&self, objective: Objective) -> Option<&ScanRow> {
        self.sorted_by(objective).into_iter().next()
    }
}

// ─── Scanner ────────────────────────────────────────────────────────

/// Runs a full backtest per grid point over a shared dataset.
pub struct Scanner<'a> {
    dataset: &'a Dataset,
    engine_config: EngineConfig,
    periods_per_year: f64,
    parallel: bool,
    mode: ScanMode,
    cancel: CancelToken,
}

impl<'a> Scanner<'a> {
    pub fn new(dataset: &'a Dataset, engine_config: EngineConfig) -> Self {
        Self {
            dataset,
            engine_config,
            periods_per_year: DEFAULT_PERIODS_PER_YEAR,
            parallel: true,
            mode: ScanMode::FailFast,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_mode(mut self, mode: ScanMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_periods_per_year(mut self, periods_per_year: f64) -> Self {
        self.periods_per_year = periods_per_year;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Evaluate every grid point.
    ///
    /// Result rows always come back in grid (lexicographic) order: the
    /// parallel path maps over an indexed slice, which rayon collects in
    /// input order.
    pub fn scan(
        &self,
        grid: &ParamGrid,
        factory: &dyn StrategyFactory,
    ) -> Result<ScanResults, ScanError> {
        let combos = grid.combos();
        if combos.is_empty() {
            return Err(ScanError::EmptyGrid);
        }

        let outcomes: Vec<Result<ScanRow, ScanError>> = if self.parallel {
            combos
                .par_iter()
                .map(|params| self.eval_point(params, factory))
                .collect()
        } else {
            combos
                .iter()
                .map(|params| self.eval_point(params, factory))
                .collect()
        };

        let mut rows = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(row) => rows.push(row),
                Err(err) => match self.mode {
                    ScanMode::FailFast => return Err(err),
                    ScanMode::SkipFailures => failures.push(err.into_failure()?),
                },
            }
        }
        Ok(ScanResults { rows, failures })
    }

    fn eval_point(
        &self,
        params: &ParamSet,
        factory: &dyn StrategyFactory,
    ) -> Result<ScanRow, ScanError> {
        if self.cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        let strategy = factory.build(params).map_err(|e| ScanError::Factory {
            params: params.clone(),
            reason: e.to_string(),
        })?;

        let engine = Engine::new(self.dataset, self.engine_config).map_err(|source| {
            ScanError::Engine {
                params: params.clone(),
                source,
            }
        })?;
        let run = engine
            .run(strategy.as_ref())
            .map_err(|source| ScanError::Engine {
                params: params.clone(),
                source,
            })?;

        let equity: Vec<f64> = run.equity_curve.iter().map(|p| p.equity).collect();
        let summary = Summary::compute(&equity, &run.trades, self.periods_per_year).map_err(
            |source| ScanError::Metrics {
                params: params.clone(),
                source,
            },
        )?;

        Ok(ScanRow {
            params: params.clone(),
            summary,
        })
    }
}
