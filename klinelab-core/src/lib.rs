//! KlineLab Core — engine, domain types, strategy trait.
//!
//! This crate contains the heart of the backtester:
//! - Domain types (bars, datasets, positions, advice, trades, equity points)
//! - Bar-by-bar event loop with stop-first fill ordering
//! - Slippage and fee application
//! - Strategy trait plus reference strategies

pub mod domain;
pub mod engine;
pub mod strategy;

pub use domain::{Advice, Bar, Dataset, EquityPoint, ExitReason, Position, Side, TradeRecord};
pub use engine::{Engine, EngineConfig, EngineError, RunResult};
pub use strategy::{Strategy, StrategyError};
