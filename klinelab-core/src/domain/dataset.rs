//! Dataset — ordered bars plus precomputed feature columns.
//!
//! The engine only reads OHLCV; feature columns (indicator outputs produced
//! by an upstream pipeline) are opaque and passed through to strategies.
//! Validation happens once at construction, before any simulation starts:
//! bad data is rejected, never repaired.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::bar::Bar;

/// Errors detected while validating input data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("dataset is empty")]
    Empty,
    #[error("timestamps not strictly increasing at bar {index}")]
    NonMonotonicTimestamp { index: usize },
    #[error("invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: String },
    #[error("feature column '{name}' has {actual} values, expected {expected}")]
    FeatureLengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// A time-indexed table of OHLCV bars plus named feature columns.
///
/// Bars are strictly time-ordered with no duplicate timestamps. Feature
/// columns are index-aligned with the bars; NaN is allowed there (an
/// indicator's warmup region), but never in OHLC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    bars: Vec<Bar>,
    features: HashMap<String, Vec<f64>>,
}

impl Dataset {
    /// Build a dataset from bars only.
    pub fn from_bars(bars: Vec<Bar>) -> Result<Self, DataError> {
        Self::new(bars, HashMap::new())
    }

    /// Build and validate a dataset.
    pub fn new(bars: Vec<Bar>, features: HashMap<String, Vec<f64>>) -> Result<Self, DataError> {
        if bars.is_empty() {
            return Err(DataError::Empty);
        }
        for (i, bar) in bars.iter().enumerate() {
            if bar.is_void() {
                return Err(DataError::InvalidBar {
                    index: i,
                    reason: "NaN or infinite OHLC value".into(),
                });
            }
            if !bar.is_sane() {
                return Err(DataError::InvalidBar {
                    index: i,
                    reason: "OHLC range inconsistent or non-positive price".into(),
                });
            }
        }
        for i in 1..bars.len() {
            if bars[i].timestamp <= bars[i - 1].timestamp {
                return Err(DataError::NonMonotonicTimestamp { index: i });
            }
        }
        for (name, column) in &features {
            if column.len() != bars.len() {
                return Err(DataError::FeatureLengthMismatch {
                    name: name.clone(),
                    expected: bars.len(),
                    actual: column.len(),
                });
            }
        }
        Ok(Self { bars, features })
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Look up a feature column by name.
    pub fn feature(&self, name: &str) -> Option<&[f64]> {
        self.features.get(name).map(|v| v.as_slice())
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(|s| s.as_str())
    }

    /// Slice to the half-open bar range `[start, end)`, clamped to the data.
    ///
    /// Used by the walk-forward splitter; slices of a valid dataset are
    /// valid by construction (order and sanity are preserved).
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.bars.len());
        let start = start.min(end);
        let bars = self.bars[start..end].to_vec();
        let features = self
            .features
            .iter()
            .map(|(name, col)| (name.clone(), col[start..end].to_vec()))
            .collect();
        Self { bars, features }
    }

    /// Content hash of the bar series, for result provenance.
    ///
    /// Two runs over byte-identical bars report the same hash, so result
    /// tables from different sessions can be diffed with confidence.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for bar in &self.bars {
            hasher.update(&bar.timestamp.timestamp_millis().to_le_bytes());
            hasher.update(&bar.open.to_le_bytes());
            hasher.update(&bar.high.to_le_bytes());
            hasher.update(&bar.low.to_le_bytes());
            hasher.update(&bar.close.to_le_bytes());
            hasher.update(&bar.volume.to_le_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}
