//! Fill pricing — slippage and fee arithmetic.
//!
//! Slippage is modeled as a fraction of price applied against the trader:
//! buys fill higher than the signal price, sells fill lower. Stops are
//! exempt — a stop fill happens at the stop level itself, which already
//! encodes the adverse price.

use crate::domain::Side;

/// Fill price for opening a position at `price`.
pub fn entry_fill_price(side: Side, price: f64, slippage_rate: f64) -> f64 {
    match side {
        // Opening a long is a buy: fill higher.
        Side::Long => price * (1.0 + slippage_rate),
        // Opening a short is a sell: fill lower.
        Side::Short => price * (1.0 - slippage_rate),
    }
}

/// Fill price for closing a position at `price`.
pub fn exit_fill_price(side: Side, price: f64, slippage_rate: f64) -> f64 {
    match side {
        // Closing a long is a sell: fill lower.
        Side::Long => price * (1.0 - slippage_rate),
        // Closing a short is a buy: fill higher.
        Side::Short => price * (1.0 + slippage_rate),
    }
}

/// Round-trip fee on both legs' notional, charged once at trade completion.
pub fn round_trip_fees(entry_price: f64, exit_price: f64, lot: f64, fee_rate: f64) -> f64 {
    (entry_price * lot + exit_price * lot) * fee_rate
}

#[cfg(test)]
mod tests {
    use super::*;

    const BPS5: f64 = 0.0005;

    #[test]
    fn entry_slippage_is_adverse() {
        assert!(entry_fill_price(Side::Long, 100.0, BPS5) > 100.0);
        assert!(entry_fill_price(Side::Short, 100.0, BPS5) < 100.0);
    }

    #[test]
    fn exit_slippage_is_adverse() {
        assert!(exit_fill_price(Side::Long, 100.0, BPS5) < 100.0);
        assert!(exit_fill_price(Side::Short, 100.0, BPS5) > 100.0);
    }

    #[test]
    fn zero_slippage_fills_at_price() {
        assert_eq!(entry_fill_price(Side::Long, 100.0, 0.0), 100.0);
        assert_eq!(exit_fill_price(Side::Short, 100.0, 0.0), 100.0);
    }

    #[test]
    fn round_trip_fee_covers_both_legs() {
        // entry 100 * 2 + exit 110 * 2 = 420 notional at 10 bps = 0.42
        let fee = round_trip_fees(100.0, 110.0, 2.0, 0.001);
        assert!((fee - 0.42).abs() < 1e-12);
    }

    #[test]
    fn zero_fee_rate_is_free() {
        assert_eq!(round_trip_fees(100.0, 110.0, 2.0, 0.0), 0.0);
    }
}
