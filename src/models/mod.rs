//! Data models for configurations, conditions and trades.

mod condition;
mod configuration;
mod trade;

pub use condition::{Condition, CrossOperator, RsiOperator, Signal, ThresholdOperator};
pub use configuration::{TradingConfiguration, DEFAULT_TIMEFRAME};
pub use trade::{EntryCondition, Trade, TradeSide, TradeStatus};
