//! Engine behavior tests: fill ordering, fees, stops, forced close,
//! determinism, and failure propagation.

use chrono::{Duration, TimeZone, Utc};
use klinelab_core::domain::{Advice, Bar, Dataset, ExitReason, Side};
use klinelab_core::strategy::{HoldForever, Scripted, Strategy, StrategyError};
use klinelab_core::{Engine, EngineConfig, EngineError};

fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            timestamp: base + Duration::hours(i as i64),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1_000.0,
        })
        .collect()
}

fn rising_dataset(n: usize) -> Dataset {
    let closes: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
    Dataset::from_bars(bars_from_closes(&closes)).unwrap()
}

fn flat_dataset(n: usize) -> Dataset {
    Dataset::from_bars(bars_from_closes(&vec![100.0; n])).unwrap()
}

fn config(balance: f64, slippage: f64, fee: f64) -> EngineConfig {
    EngineConfig {
        initial_balance: balance,
        slippage_rate: slippage,
        fee_rate: fee,
    }
}

struct FailAt(usize);

impl Strategy for FailAt {
    fn evaluate(&self, _data: &Dataset, bar_index: usize) -> Result<Advice, StrategyError> {
        if bar_index == self.0 {
            Err("synthetic strategy failure".into())
        } else {
            Ok(Advice::Hold)
        }
    }
}

// ─── Scenarios ──────────────────────────────────────────────────────

#[test]
fn flat_series_no_signals_no_trades() {
    let data = flat_dataset(10);
    let engine = Engine::new(&data, config(10_000.0, 0.0005, 0.001)).unwrap();
    let result = engine.run(&HoldForever).unwrap();

    assert!(result.trades.is_empty());
    assert_eq!(result.equity_curve.len(), 10);
    for point in &result.equity_curve {
        assert_eq!(point.equity, 10_000.0);
        assert_eq!(point.return_pct, 0.0);
    }
    assert_eq!(result.final_equity, 10_000.0);
}

#[test]
fn one_long_trade_net_is_gross_minus_fees() {
    let data = rising_dataset(10);
    let mut advices = vec![Advice::Hold; 10];
    advices[2] = Advice::EnterLong {
        lot: 2.0,
        stop_price: None,
    };
    advices[5] = Advice::Exit;
    let strat = Scripted::new(advices);

    let fee_rate = 0.001;
    let engine = Engine::new(&data, config(10_000.0, 0.0, fee_rate)).unwrap();
    let result = engine.run(&strat).unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.side, Side::Long);
    assert_eq!(trade.exit_reason, ExitReason::Signal);
    assert_eq!(trade.entry_price, 102.0);
    assert_eq!(trade.exit_price, 105.0);
    assert_eq!(trade.bars_held, 3);

    let expected_gross = (105.0 - 102.0) * 2.0;
    let expected_fees = (102.0 * 2.0 + 105.0 * 2.0) * fee_rate;
    assert!((trade.gross_pnl - expected_gross).abs() < 1e-12);
    assert!((trade.fees - expected_fees).abs() < 1e-12);
    assert!((trade.net_pnl - (expected_gross - expected_fees)).abs() < 1e-12);
    assert!(trade.net_pnl > 0.0);
    assert!(trade.net_pnl < trade.gross_pnl);

    assert!((result.final_equity - (10_000.0 + trade.net_pnl)).abs() < 1e-9);
}

#[test]
fn stop_fills_at_stop_price_not_close() {
    // Enter at bar 1 (close 100), stop at 98. Bar 3 dips to low 97.5.
    let closes = vec![100.0, 100.0, 99.0, 98.0, 99.0, 100.0];
    let mut bars = bars_from_closes(&closes);
    bars[3].low = 97.5;
    let data = Dataset::from_bars(bars).unwrap();

    let mut advices = vec![Advice::Hold; 6];
    advices[1] = Advice::EnterLong {
        lot: 1.0,
        stop_price: Some(98.0),
    };
    let strat = Scripted::new(advices);

    let engine = Engine::new(&data, config(10_000.0, 0.0, 0.0)).unwrap();
    let result = engine.run(&strat).unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::Stop);
    assert_eq!(trade.exit_price, 98.0); // the stop level, not bar close
    assert_eq!(trade.bars_held, 2);
}

#[test]
fn stop_has_priority_over_fresh_signal() {
    // Bar 2 both crosses the stop and (per the script) would re-enter.
    // The stop must win; the strategy is not consulted on the stop-out bar.
    let closes = vec![100.0, 100.0, 96.0, 100.0];
    let data = Dataset::from_bars(bars_from_closes(&closes)).unwrap();

    let mut advices = vec![Advice::Hold; 4];
    advices[0] = Advice::EnterLong {
        lot: 1.0,
        stop_price: Some(98.0),
    };
    advices[2] = Advice::EnterLong {
        lot: 5.0,
        stop_price: None,
    };
    let strat = Scripted::new(advices);

    let engine = Engine::new(&data, config(10_000.0, 0.0, 0.0)).unwrap();
    let result = engine.run(&strat).unwrap();

    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].exit_reason, ExitReason::Stop);
    // The bar-2 entry never happened.
    assert!(result.trades.iter().all(|t| t.lot == 1.0));
}

#[test]
fn short_stop_triggers_on_high() {
    let closes = vec![100.0, 100.0, 101.0, 103.0, 100.0];
    let data = Dataset::from_bars(bars_from_closes(&closes)).unwrap();

    let mut advices = vec![Advice::Hold; 5];
    advices[0] = Advice::EnterShort {
        lot: 1.0,
        stop_price: Some(102.0),
    };
    let strat = Scripted::new(advices);

    let engine = Engine::new(&data, config(10_000.0, 0.0, 0.0)).unwrap();
    let result = engine.run(&strat).unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.side, Side::Short);
    assert_eq!(trade.exit_reason, ExitReason::Stop);
    assert_eq!(trade.exit_price, 102.0);
    assert!(trade.net_pnl < 0.0);
}

#[test]
fn open_position_is_force_closed_at_end() {
    let data = rising_dataset(8);
    let mut advices = vec![Advice::Hold; 8];
    advices[3] = Advice::EnterLong {
        lot: 1.0,
        stop_price: None,
    };
    let strat = Scripted::new(advices);

    let engine = Engine::new(&data, config(10_000.0, 0.0, 0.0)).unwrap();
    let result = engine.run(&strat).unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::ForcedClose);
    assert_eq!(trade.exit_price, 107.0); // final bar close
    // Run ends flat: last equity point equals the realized balance.
    assert_eq!(
        result.equity_curve.last().unwrap().equity,
        result.final_equity
    );
}

#[test]
fn entry_while_open_and_exit_while_flat_are_ignored() {
    let data = rising_dataset(6);
    let advices = vec![
        Advice::Exit, // flat: ignored
        Advice::EnterLong {
            lot: 1.0,
            stop_price: None,
        },
        Advice::EnterLong {
            lot: 9.0,
            stop_price: None,
        }, // already open: ignored
        Advice::Hold,
        Advice::Exit,
        Advice::Hold,
    ];
    let strat = Scripted::new(advices);

    let engine = Engine::new(&data, config(10_000.0, 0.0, 0.0)).unwrap();
    let result = engine.run(&strat).unwrap();

    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].lot, 1.0);
    assert_eq!(result.trades[0].entry_price, 101.0);
}

#[test]
fn slippage_is_applied_against_the_trader() {
    let data = flat_dataset(6);
    let mut advices = vec![Advice::Hold; 6];
    advices[1] = Advice::EnterLong {
        lot: 1.0,
        stop_price: None,
    };
    advices[3] = Advice::Exit;
    let strat = Scripted::new(advices);

    let slippage = 0.001;
    let engine = Engine::new(&data, config(10_000.0, slippage, 0.0)).unwrap();
    let result = engine.run(&strat).unwrap();

    let trade = &result.trades[0];
    assert!((trade.entry_price - 100.0 * 1.001).abs() < 1e-12); // buy fills higher
    assert!((trade.exit_price - 100.0 * 0.999).abs() < 1e-12); // sell fills lower
    assert!(trade.net_pnl < 0.0); // round trip on a flat price loses the slippage
}

// ─── Determinism ────────────────────────────────────────────────────

#[test]
fn identical_runs_produce_identical_ledgers() {
    let data = rising_dataset(50);
    let mut advices = vec![Advice::Hold; 50];
    advices[5] = Advice::EnterLong {
        lot: 1.5,
        stop_price: Some(100.0),
    };
    advices[20] = Advice::Exit;
    advices[30] = Advice::EnterShort {
        lot: 0.5,
        stop_price: Some(140.0),
    };
    let strat = Scripted::new(advices);

    let engine = Engine::new(&data, config(25_000.0, 0.0005, 0.001)).unwrap();
    let a = engine.run(&strat).unwrap();
    let b = engine.run(&strat).unwrap();

    assert_eq!(
        serde_json::to_string(&a.trades).unwrap(),
        serde_json::to_string(&b.trades).unwrap()
    );
    assert_eq!(
        serde_json::to_string(&a.equity_curve).unwrap(),
        serde_json::to_string(&b.equity_curve).unwrap()
    );
    assert_eq!(a.dataset_hash, b.dataset_hash);
}

// ─── Failure semantics ──────────────────────────────────────────────

#[test]
fn strategy_error_aborts_with_bar_index() {
    let data = rising_dataset(10);
    let engine = Engine::new(&data, config(10_000.0, 0.0, 0.0)).unwrap();
    let err = engine.run(&FailAt(3)).unwrap_err();
    match err {
        EngineError::Strategy { bar_index, .. } => assert_eq!(bar_index, 3),
        other => panic!("expected Strategy error, got {other}"),
    }
}

#[test]
fn malformed_lot_is_a_strategy_error() {
    let data = rising_dataset(5);
    let mut advices = vec![Advice::Hold; 5];
    advices[1] = Advice::EnterLong {
        lot: -1.0,
        stop_price: None,
    };
    let strat = Scripted::new(advices);
    let engine = Engine::new(&data, config(10_000.0, 0.0, 0.0)).unwrap();
    assert!(matches!(
        engine.run(&strat),
        Err(EngineError::Strategy { bar_index: 1, .. })
    ));
}

#[test]
fn non_finite_stop_is_a_strategy_error() {
    let data = rising_dataset(5);
    let mut advices = vec![Advice::Hold; 5];
    advices[1] = Advice::EnterLong {
        lot: 1.0,
        stop_price: Some(f64::NAN),
    };
    let strat = Scripted::new(advices);
    let engine = Engine::new(&data, config(10_000.0, 0.0, 0.0)).unwrap();
    assert!(engine.run(&strat).is_err());
}
