//! Error taxonomy for the trading engine.
//!
//! Every variant except `Persistence`, `InvalidConfiguration` and
//! `ConfigurationNotFound` is recovered at condition or trade granularity and
//! only logged; those three are surfaced to whoever drove the tick.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Quote, ticker or price history unavailable.
    #[error("market data unavailable: {0}")]
    MarketData(String),

    /// Not enough history to compute an indicator.
    #[error("insufficient history: {0}")]
    Indicator(String),

    /// Order rejected by the exchange.
    #[error("order rejected: {0}")]
    Execution(String),

    /// Account balance could not be fetched for risk-based sizing.
    #[error("position sizing failed: {0}")]
    Sizing(String),

    /// Configuration or trade state could not be saved or loaded.
    #[error("persistence failed: {0:#}")]
    Persistence(#[source] anyhow::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("configuration not found: {0}")]
    ConfigurationNotFound(String),
}

impl EngineError {
    /// Errors that leave the schedule running and only fail the current step.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            EngineError::InvalidConfiguration(_) | EngineError::ConfigurationNotFound(_)
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(EngineError::MarketData("no quote".into()).is_recoverable());
        assert!(EngineError::Persistence(anyhow::anyhow!("disk full")).is_recoverable());
        assert!(!EngineError::ConfigurationNotFound("42".into()).is_recoverable());
    }

    #[test]
    fn test_persistence_message_includes_cause() {
        let err = EngineError::Persistence(
            anyhow::anyhow!("locked").context("Failed to save trades"),
        );
        assert_eq!(err.to_string(), "persistence failed: Failed to save trades: locked");
    }
}
