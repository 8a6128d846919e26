//! Position sizing: fixed quantity or balance-at-risk over stop distance.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, warn};

use super::execution::ExecutionAdapter;
use super::TradingConfig;

/// Inputs for sizing one entry.
#[derive(Debug, Clone, Copy)]
pub struct SizingRequest {
    /// Quantity configured on the condition or trade
    pub quantity: Decimal,
    pub risk_percent: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
    pub current_price: Decimal,
}

impl SizingRequest {
    /// Balance is only worth fetching when risk sizing can apply.
    fn wants_balance(&self) -> bool {
        self.stop_loss_price.is_some()
            && self.risk_percent.is_some_and(|r| r > Decimal::ZERO)
    }
}

/// Calculator for executable order sizes.
pub struct PositionSizer {
    size_step: Option<Decimal>,
}

impl PositionSizer {
    pub fn new(config: &TradingConfig) -> Self {
        Self {
            size_step: config.size_step,
        }
    }

    /// Size an entry, fetching the account balance only when risk sizing applies.
    ///
    /// A failed balance fetch falls back to the configured quantity.
    pub async fn size_for(&self, request: &SizingRequest, exchange: &dyn ExecutionAdapter) -> Decimal {
        let balance = if request.wants_balance() {
            match exchange.get_account_balance().await {
                Ok(balance) => Some(balance),
                Err(e) => {
                    warn!(error = %e, "Balance unavailable, using configured quantity");
                    None
                }
            }
        } else {
            None
        };

        self.calculate_size(request, balance)
    }

    /// Risk-based size when balance, risk percent and stop are all known.
    ///
    /// size = (balance * risk% / 100) / |price - stop|
    pub fn calculate_size(&self, request: &SizingRequest, balance: Option<Decimal>) -> Decimal {
        let (Some(stop), Some(risk_percent), Some(balance)) =
            (request.stop_loss_price, request.risk_percent, balance)
        else {
            return self.normalize(request.quantity);
        };

        let risk_amount = balance * risk_percent / dec!(100);
        let risk_per_unit = (request.current_price - stop).abs();

        if risk_per_unit <= Decimal::ZERO || risk_amount <= Decimal::ZERO {
            return self.normalize(request.quantity);
        }

        let size = risk_amount / risk_per_unit;
        debug!(
            %balance,
            %risk_amount,
            %risk_per_unit,
            %size,
            "Position size adjusted for risk"
        );

        let normalized = self.normalize(size);
        if normalized.is_zero() {
            warn!(%size, "Risk size rounds to zero, using configured quantity");
            return self.normalize(request.quantity);
        }
        normalized
    }

    /// Round down to the configured lot step.
    fn normalize(&self, size: Decimal) -> Decimal {
        match self.size_step {
            Some(step) if !step.is_zero() => (size / step).floor() * step,
            _ => size,
        }
    }
}
