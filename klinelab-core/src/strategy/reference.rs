//! Reference strategies shipped with the engine.
//!
//! `HoldForever` and `Scripted` exist for tests and baselines;
//! `ChannelBreakout` is a minimal real strategy used by the CLI and the
//! optimizer examples.

use crate::domain::{Advice, Dataset};

use super::{Strategy, StrategyError};

/// Never trades. Useful as a baseline: the equity curve must stay flat.
#[derive(Debug, Clone, Copy, Default)]
pub struct HoldForever;

impl Strategy for HoldForever {
    fn evaluate(&self, _data: &Dataset, _bar_index: usize) -> Result<Advice, StrategyError> {
        Ok(Advice::Hold)
    }
}

/// Long-only channel breakout over raw bars.
///
/// Enters long when the close breaks above the highest high of the previous
/// `lookback` bars, with a protective stop `stop_pct` below the breakout
/// close; exits when the close breaks below the lowest low of the previous
/// `lookback` bars. Holds during the warmup region.
#[derive(Debug, Clone, Copy)]
pub struct ChannelBreakout {
    pub lookback: usize,
    pub stop_pct: f64,
    pub lot: f64,
}

impl ChannelBreakout {
    pub fn new(lookback: usize, stop_pct: f64, lot: f64) -> Self {
        Self {
            lookback,
            stop_pct,
            lot,
        }
    }
}

impl Strategy for ChannelBreakout {
    fn evaluate(&self, data: &Dataset, bar_index: usize) -> Result<Advice, StrategyError> {
        if self.lookback == 0 {
            return Err("lookback must be at least 1".into());
        }
        if bar_index < self.lookback {
            return Ok(Advice::Hold);
        }
        let bars = data.bars();
        let window = &bars[bar_index - self.lookback..bar_index];
        let close = bars[bar_index].close;

        let channel_high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let channel_low = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);

        if close > channel_high {
            Ok(Advice::EnterLong {
                lot: self.lot,
                stop_price: Some(close * (1.0 - self.stop_pct)),
            })
        } else if close < channel_low {
            Ok(Advice::Exit)
        } else {
            Ok(Advice::Hold)
        }
    }
}

/// Replays a fixed advice sequence; `Hold` past the end.
///
/// Test helper for exercising exact engine paths (entry at bar k, exit at
/// bar m) without indicator noise.
#[derive(Debug, Clone, Default)]
pub struct Scripted {
    advices: Vec<Advice>,
}

impl Scripted {
    pub fn new(advices: Vec<Advice>) -> Self {
        Self { advices }
    }
}

impl Strategy for Scripted {
    fn evaluate(&self, _data: &Dataset, bar_index: usize) -> Result<Advice, StrategyError> {
        Ok(self.advices.get(bar_index).copied().unwrap_or(Advice::Hold))
    }
}
