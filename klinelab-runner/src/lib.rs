//! KlineLab Runner — metrics, walk-forward validation, grid optimization,
//! and result export on top of `klinelab-core`.

pub mod export;
pub mod metrics;
pub mod optimizer;
pub mod walk_forward;

pub use export::{save_artifacts, BacktestReport, SCHEMA_VERSION};
pub use metrics::{MetricsError, Period, PeriodRow, Summary};
pub use optimizer::{
    CancelToken, Objective, ParamAxis, ParamGrid, ParamSet, ScanError, ScanFailure, ScanMode,
    ScanResults, ScanRow, Scanner, StrategyFactory,
};
pub use walk_forward::{
    create_folds, run_walk_forward, FoldResult, FoldSpec, SplitMode, WalkForwardConfig,
    WalkForwardError, WalkForwardReport,
};
