//! Kline CSV loading.
//!
//! Expected header: `timestamp,open,high,low,close,volume`. Timestamps are
//! RFC 3339 or integer epoch seconds. A malformed row is an error, never
//! skipped — a backtest over silently-patched data is worse than no
//! backtest.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use klinelab_core::domain::{Bar, Dataset};

#[derive(Debug, Deserialize)]
struct RawRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Load a bar CSV into a validated `Dataset`.
pub fn load_bars_csv(path: &Path) -> Result<Dataset> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open data file: {}", path.display()))?;
    let dataset = read_bars(file)
        .with_context(|| format!("failed to load bars from {}", path.display()))?;
    Ok(dataset)
}

fn read_bars<R: std::io::Read>(reader: R) -> Result<Dataset> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut bars = Vec::new();
    for (i, row) in rdr.deserialize::<RawRow>().enumerate() {
        // Row 1 is the header, so data rows start at line 2.
        let line = i + 2;
        let row = row.with_context(|| format!("malformed row at line {line}"))?;
        let timestamp = parse_timestamp(&row.timestamp)
            .with_context(|| format!("bad timestamp '{}' at line {line}", row.timestamp))?;
        bars.push(Bar {
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }
    Dataset::from_bars(bars).context("dataset validation failed")
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let secs: i64 = s.parse().context("not RFC 3339 or epoch seconds")?;
    DateTime::from_timestamp(secs, 0).context("epoch seconds out of range")
}
