//! Trading configuration: a symbol, a polling interval and its conditions.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Condition;

pub const DEFAULT_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_TIMEFRAME: &str = "1h";

/// User-defined strategy evaluated on its own schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingConfiguration {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    pub symbol: String,

    /// Polling interval in milliseconds
    #[serde(default = "default_interval_ms", alias = "checkInterval")]
    pub interval_ms: u64,

    /// Candle timeframe for indicator history
    #[serde(default = "default_timeframe")]
    pub timeframe: String,

    #[serde(default)]
    pub active: bool,

    pub conditions: Vec<Condition>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

fn default_timeframe() -> String {
    DEFAULT_TIMEFRAME.to_string()
}

impl TradingConfiguration {
    pub fn new(symbol: impl Into<String>, interval_ms: u64, conditions: Vec<Condition>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: None,
            symbol: symbol.into(),
            interval_ms,
            timeframe: default_timeframe(),
            active: false,
            conditions,
            created_at: Utc::now(),
        }
    }

    /// Polling interval, falling back to one minute when unset.
    pub fn interval(&self) -> Duration {
        if self.interval_ms == 0 {
            Duration::from_millis(DEFAULT_INTERVAL_MS)
        } else {
            Duration::from_millis(self.interval_ms)
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn needs_history(&self) -> bool {
        self.conditions.iter().any(|c| c.signal.needs_history())
    }

    /// Largest number of closes any condition wants.
    pub fn history_lookback(&self) -> usize {
        self.conditions
            .iter()
            .map(|c| c.signal.lookback())
            .max()
            .unwrap_or(0)
    }

    /// Structural checks that hold for every stored configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.trim().is_empty() {
            return Err("symbol is required".to_string());
        }
        if self.interval_ms == 0 {
            return Err("interval must be greater than zero".to_string());
        }
        for condition in &self.conditions {
            condition.validate()?;
        }
        Ok(())
    }

    /// Checks required before the configuration may be scheduled.
    pub fn validate_for_activation(&self) -> Result<(), String> {
        self.validate()?;
        if self.conditions.is_empty() {
            return Err(format!(
                "configuration {} has no conditions",
                self.display_name()
            ));
        }
        Ok(())
    }
}
