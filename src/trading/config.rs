//! Engine-wide trading settings.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::DEFAULT_TIMEFRAME;

/// Defaults applied to every configuration the engine evaluates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Candle timeframe used when a configuration leaves it empty
    pub default_timeframe: String,

    /// Minimum number of candles requested for indicator history
    pub history_depth: usize,

    /// Lot step sizes are rounded down to; `None` keeps sizes unrounded
    pub size_step: Option<Decimal>,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            default_timeframe: DEFAULT_TIMEFRAME.to_string(),
            history_depth: 100,
            size_step: None,
        }
    }
}
