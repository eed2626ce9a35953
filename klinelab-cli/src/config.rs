//! TOML configuration for the CLI commands.
//!
//! One file drives all three commands; unused sections are simply ignored:
//!
//! ```toml
//! [engine]
//! initial_balance = 100000.0
//! slippage_rate = 0.0005
//! fee_rate = 0.001
//!
//! [strategy]            # `run` and `walkforward`
//! lookback = 48
//! stop_pct = 0.03
//! lot = 0.1
//!
//! [[param]]             # `scan`; array-of-tables keeps axis order
//! name = "lookback"
//! values = [24.0, 48.0, 72.0]
//!
//! [[param]]
//! name = "stop_pct"
//! values = [0.01, 0.03]
//!
//! [walk_forward]        # `walkforward`, optional
//! n_folds = 5
//! min_train_bars = 720
//! min_test_bars = 168
//! mode = "anchored"
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use klinelab_core::strategy::{ChannelBreakout, Strategy, StrategyError};
use klinelab_core::EngineConfig;
use klinelab_runner::walk_forward::{SplitMode, WalkForwardConfig};
use klinelab_runner::{ParamAxis, ParamGrid, ParamSet, StrategyFactory};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineSection,
    pub strategy: Option<StrategySection>,
    #[serde(default)]
    pub param: Vec<ParamEntry>,
    pub walk_forward: Option<WalkForwardSection>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    #[serde(default = "default_balance")]
    pub initial_balance: f64,
    #[serde(default)]
    pub slippage_rate: f64,
    #[serde(default)]
    pub fee_rate: f64,
}

fn default_balance() -> f64 {
    10_000.0
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            initial_balance: default_balance(),
            slippage_rate: 0.0,
            fee_rate: 0.0,
        }
    }
}

/// Fixed channel-breakout parameters for single runs.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategySection {
    pub lookback: usize,
    pub stop_pct: f64,
    #[serde(default = "default_lot")]
    pub lot: f64,
}

fn default_lot() -> f64 {
    1.0
}

/// One grid axis: parameter name plus the values to sweep.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamEntry {
    pub name: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WalkForwardSection {
    pub n_folds: Option<usize>,
    pub min_train_bars: Option<usize>,
    pub min_test_bars: Option<usize>,
    pub mode: Option<String>,
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("failed to parse TOML config")
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            initial_balance: self.engine.initial_balance,
            slippage_rate: self.engine.slippage_rate,
            fee_rate: self.engine.fee_rate,
        }
    }

    /// The scan grid, axes in file order.
    pub fn grid(&self) -> Result<ParamGrid> {
        if self.param.is_empty() {
            bail!("config has no [[param]] entries; nothing to scan");
        }
        Ok(ParamGrid::new(
            self.param
                .iter()
                .map(|p| ParamAxis {
                    name: p.name.clone(),
                    values: p.values.clone(),
                })
                .collect(),
        ))
    }

    pub fn strategy(&self) -> Result<ChannelBreakout> {
        let s = self
            .strategy
            .context("config has no [strategy] section")?;
        Ok(ChannelBreakout::new(s.lookback, s.stop_pct, s.lot))
    }

    pub fn walk_forward_config(&self) -> Result<WalkForwardConfig> {
        let mut config = WalkForwardConfig::default();
        if let Some(section) = &self.walk_forward {
            if let Some(n) = section.n_folds {
                config.n_folds = n;
            }
            if let Some(n) = section.min_train_bars {
                config.min_train_bars = n;
            }
            if let Some(n) = section.min_test_bars {
                config.min_test_bars = n;
            }
            if let Some(mode) = &section.mode {
                config.mode = match mode.as_str() {
                    "anchored" => SplitMode::Anchored,
                    "rolling" => SplitMode::Rolling,
                    other => bail!("unknown walk_forward mode '{other}' (anchored | rolling)"),
                };
            }
        }
        Ok(config)
    }
}

/// Builds a `ChannelBreakout` from a grid point, falling back to the
/// `[strategy]` section for any axis the grid does not sweep.
pub struct BreakoutFactory {
    pub defaults: Option<StrategySection>,
}

impl StrategyFactory for BreakoutFactory {
    fn build(&self, params: &ParamSet) -> Result<Box<dyn Strategy>, StrategyError> {
        let fallback = |name: &str, default: Option<f64>| -> Result<f64, StrategyError> {
            params
                .get(name)
                .or(default)
                .ok_or_else(|| format!("parameter '{name}' not in grid or [strategy]").into())
        };
        let lookback = fallback("lookback", self.defaults.map(|d| d.lookback as f64))?;
        let stop_pct = fallback("stop_pct", self.defaults.map(|d| d.stop_pct))?;
        let lot = fallback("lot", self.defaults.map(|d| d.lot))?;
        if lookback < 1.0 || lookback.fract() != 0.0 {
            return Err(format!("lookback must be a positive integer, got {lookback}").into());
        }
        Ok(Box::new(ChannelBreakout::new(
            lookback as usize,
            stop_pct,
            lot,
        )))
    }
}
