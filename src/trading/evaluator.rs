//! Condition evaluation against a market snapshot and closing-price history.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::{EngineError, EngineResult};
use crate::indicators::{self, moving_average};
use crate::models::{CrossOperator, RsiOperator, Signal, ThresholdOperator};

use super::execution::Ticker;

/// Relative tolerance for price `equals`.
const PRICE_EQUALS_TOLERANCE: Decimal = dec!(0.001);
/// Relative tolerance for volume `equals`.
const VOLUME_EQUALS_TOLERANCE: Decimal = dec!(0.1);
/// RSI reported when the series is too short to compute one.
const NEUTRAL_RSI: f64 = 50.0;

/// Decide whether `signal` fires.
///
/// `history` is only consulted by RSI and crossover signals; passing `None`
/// for those reports a market data error. A crossover with fewer than two
/// points per average is an indicator error. Errors mean "did not fire".
pub fn evaluate(signal: &Signal, ticker: &Ticker, history: Option<&[f64]>) -> EngineResult<bool> {
    match signal {
        Signal::Price { operator, value } => Ok(compare_threshold(
            ticker.last_price,
            *operator,
            *value,
            PRICE_EQUALS_TOLERANCE,
        )),
        Signal::Volume { operator, value } => Ok(compare_threshold(
            ticker.volume_24h,
            *operator,
            *value,
            VOLUME_EQUALS_TOLERANCE,
        )),
        Signal::Rsi {
            operator,
            value,
            period,
        } => {
            // a short series reads as neutral and is still compared
            let closes = require_history(history, signal)?;
            let rsi = indicators::rsi(closes, *period, NEUTRAL_RSI);
            Ok(match operator {
                RsiOperator::Above => rsi > *value,
                RsiOperator::Below => rsi < *value,
            })
        }
        Signal::MaCross {
            operator,
            period,
            second_period,
            ma_type,
        } => {
            let closes = require_history(history, signal)?;
            let fast = moving_average(closes, *period, *ma_type);
            let slow = moving_average(closes, *second_period, *ma_type);
            detect_cross(&fast, &slow, *operator)
        }
    }
}

fn compare_threshold(
    actual: Decimal,
    operator: ThresholdOperator,
    value: Decimal,
    tolerance: Decimal,
) -> bool {
    match operator {
        ThresholdOperator::Above => actual > value,
        ThresholdOperator::Below => actual < value,
        ThresholdOperator::Equals => (actual - value).abs() < tolerance * value,
    }
}

fn require_history<'a>(history: Option<&'a [f64]>, signal: &Signal) -> EngineResult<&'a [f64]> {
    history.ok_or_else(|| {
        EngineError::MarketData(format!("price history unavailable for {} condition", signal.kind()))
    })
}

/// Compare the last two points of a fast and a slow series.
pub fn detect_cross(fast: &[f64], slow: &[f64], operator: CrossOperator) -> EngineResult<bool> {
    if fast.len() < 2 || slow.len() < 2 {
        return Err(EngineError::Indicator(format!(
            "crossover needs 2 points per average, got {} fast / {} slow",
            fast.len(),
            slow.len()
        )));
    }

    let (f0, f1) = (fast[fast.len() - 2], fast[fast.len() - 1]);
    let (s0, s1) = (slow[slow.len() - 2], slow[slow.len() - 1]);

    Ok(match operator {
        CrossOperator::CrossesAbove => f0 <= s0 && f1 > s1,
        CrossOperator::CrossesBelow => f0 >= s0 && f1 < s1,
    })
}
