//! Trading conditions: a signal rule paired with the action it triggers.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::indicators::MaKind;

use super::TradeSide;

/// Comparison used by price and volume thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdOperator {
    Above,
    Below,
    Equals,
}

/// Comparison used by RSI thresholds. RSI has no equality test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsiOperator {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossOperator {
    CrossesAbove,
    CrossesBelow,
}

/// The rule half of a condition. Each variant carries only what it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Signal {
    Price {
        operator: ThresholdOperator,
        value: Decimal,
    },
    Volume {
        operator: ThresholdOperator,
        value: Decimal,
    },
    Rsi {
        operator: RsiOperator,
        value: f64,
        #[serde(default = "default_rsi_period")]
        period: usize,
    },
    MaCross {
        operator: CrossOperator,
        period: usize,
        second_period: usize,
        #[serde(default)]
        ma_type: MaKind,
    },
}

fn default_rsi_period() -> usize {
    14
}

impl Signal {
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Price { .. } => "price",
            Signal::Volume { .. } => "volume",
            Signal::Rsi { .. } => "rsi",
            Signal::MaCross { .. } => "ma_cross",
        }
    }

    /// Whether evaluating this signal needs the closing-price history.
    pub fn needs_history(&self) -> bool {
        matches!(self, Signal::Rsi { .. } | Signal::MaCross { .. })
    }

    /// Closes needed for a stable evaluation.
    pub fn lookback(&self) -> usize {
        match self {
            Signal::Price { .. } | Signal::Volume { .. } => 0,
            Signal::Rsi { period, .. } => period + 1,
            Signal::MaCross {
                period,
                second_period,
                ..
            } => 2 * (*period).max(*second_period),
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            Signal::Price { value, .. } | Signal::Volume { value, .. } => {
                if *value < Decimal::ZERO {
                    return Err(format!("{} threshold must not be negative", self.kind()));
                }
            }
            Signal::Rsi { value, period, .. } => {
                if *period == 0 {
                    return Err("rsi period must be positive".to_string());
                }
                if !(0.0..=100.0).contains(value) {
                    return Err(format!("rsi threshold {} outside 0-100", value));
                }
            }
            Signal::MaCross {
                period,
                second_period,
                ..
            } => {
                if *period == 0 || *second_period == 0 {
                    return Err("moving average periods must be positive".to_string());
                }
            }
        }
        Ok(())
    }
}

/// A rule plus the trade it opens when it fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default = "new_condition_id")]
    pub id: String,

    #[serde(flatten)]
    pub signal: Signal,

    pub action: TradeSide,

    pub quantity: Decimal,

    /// Stop-loss distance from entry, in percent
    #[serde(default)]
    pub stop_loss: Option<Decimal>,

    /// Take-profit distance from entry, in percent
    #[serde(default)]
    pub take_profit: Option<Decimal>,

    /// Percent of balance risked when a stop-loss is set
    #[serde(default = "default_risk_percent")]
    pub risk_percent: Decimal,
}

fn new_condition_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_risk_percent() -> Decimal {
    dec!(1)
}

impl Condition {
    pub fn new(signal: Signal, action: TradeSide, quantity: Decimal) -> Self {
        Self {
            id: new_condition_id(),
            signal,
            action,
            quantity,
            stop_loss: None,
            take_profit: None,
            risk_percent: default_risk_percent(),
        }
    }

    pub fn with_stop_loss(mut self, percent: Decimal) -> Self {
        self.stop_loss = Some(percent);
        self
    }

    pub fn with_take_profit(mut self, percent: Decimal) -> Self {
        self.take_profit = Some(percent);
        self
    }

    pub fn with_risk_percent(mut self, percent: Decimal) -> Self {
        self.risk_percent = percent;
        self
    }

    /// Stop-loss price for an entry at `price`: below for buys, above for sells.
    pub fn stop_loss_price(&self, price: Decimal) -> Option<Decimal> {
        let pct = self.stop_loss.filter(|p| *p > Decimal::ZERO)? / dec!(100);
        Some(match self.action {
            TradeSide::Buy => price * (Decimal::ONE - pct),
            TradeSide::Sell => price * (Decimal::ONE + pct),
        })
    }

    /// Take-profit price for an entry at `price`: above for buys, below for sells.
    pub fn take_profit_price(&self, price: Decimal) -> Option<Decimal> {
        let pct = self.take_profit.filter(|p| *p > Decimal::ZERO)? / dec!(100);
        Some(match self.action {
            TradeSide::Buy => price * (Decimal::ONE + pct),
            TradeSide::Sell => price * (Decimal::ONE - pct),
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        self.signal.validate()?;
        if self.quantity <= Decimal::ZERO {
            return Err(format!("condition {}: quantity must be positive", self.id));
        }
        if self.risk_percent < Decimal::ZERO || self.risk_percent > dec!(100) {
            return Err(format!("condition {}: risk percent outside 0-100", self.id));
        }
        Ok(())
    }
}
