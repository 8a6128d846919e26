//! Trade model: one tracked position moving through its lifecycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            TradeSide::Buy => TradeSide::Sell,
            TradeSide::Sell => TradeSide::Buy,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "buy" => Some(TradeSide::Buy),
            "sell" => Some(TradeSide::Sell),
            _ => None,
        }
    }
}

/// Lifecycle status. Moves forward only: pending -> active -> stopped | completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Pending,
    Active,
    Stopped,
    Completed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "pending",
            TradeStatus::Active => "active",
            TradeStatus::Stopped => "stopped",
            TradeStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TradeStatus::Pending),
            "active" => Some(TradeStatus::Active),
            "stopped" => Some(TradeStatus::Stopped),
            "completed" => Some(TradeStatus::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TradeStatus::Stopped | TradeStatus::Completed)
    }
}

/// How a pending trade decides to enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryCondition {
    /// Enter once price >= entry price
    Above,
    /// Enter once price <= entry price
    Below,
    /// Enter once price is within 1% of entry price
    Equals,
    /// Enter at the next evaluation, whatever the price
    Market,
}

impl EntryCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryCondition::Above => "above",
            EntryCondition::Below => "below",
            EntryCondition::Equals => "equals",
            EntryCondition::Market => "market",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "above" => Some(EntryCondition::Above),
            "below" => Some(EntryCondition::Below),
            "equals" => Some(EntryCondition::Equals),
            "market" => Some(EntryCondition::Market),
            _ => None,
        }
    }
}

/// A tracked trade. Retained as history once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: String,

    /// Owning configuration
    pub config_id: String,

    pub symbol: String,

    pub side: TradeSide,

    /// Configured quantity, used when risk sizing does not apply
    pub quantity: Decimal,

    /// Size actually sent with the entry order
    #[serde(default)]
    pub size: Option<Decimal>,

    /// Percent of account balance risked between entry and stop-loss
    #[serde(default)]
    pub risk_percent: Option<Decimal>,

    pub entry_condition: EntryCondition,

    /// Condition that created this trade, if any
    #[serde(default)]
    pub source_condition: Option<String>,

    pub status: TradeStatus,

    /// Trigger price while pending, fill reference once active
    #[serde(default)]
    pub entry_price: Option<Decimal>,

    #[serde(default)]
    pub stop_loss_price: Option<Decimal>,

    #[serde(default)]
    pub take_profit_price: Option<Decimal>,

    #[serde(default)]
    pub exit_price: Option<Decimal>,

    #[serde(default)]
    pub entry_order_id: Option<String>,

    #[serde(default)]
    pub exit_order_id: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub entry_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub exit_time: Option<DateTime<Utc>>,
}

impl Trade {
    /// Create a pending trade with a fresh id.
    pub fn new(
        config_id: impl Into<String>,
        symbol: impl Into<String>,
        side: TradeSide,
        quantity: Decimal,
        entry_condition: EntryCondition,
        entry_price: Option<Decimal>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            config_id: config_id.into(),
            symbol: symbol.into(),
            side,
            quantity,
            size: None,
            risk_percent: None,
            entry_condition,
            source_condition: None,
            status: TradeStatus::Pending,
            entry_price,
            stop_loss_price: None,
            take_profit_price: None,
            exit_price: None,
            entry_order_id: None,
            exit_order_id: None,
            created_at: Utc::now(),
            entry_time: None,
            exit_time: None,
        }
    }

    pub fn with_protection(
        mut self,
        stop_loss_price: Option<Decimal>,
        take_profit_price: Option<Decimal>,
    ) -> Self {
        self.stop_loss_price = stop_loss_price;
        self.take_profit_price = take_profit_price;
        self
    }

    pub fn with_risk_percent(mut self, risk_percent: Option<Decimal>) -> Self {
        self.risk_percent = risk_percent;
        self
    }

    pub fn with_source_condition(mut self, condition_id: impl Into<String>) -> Self {
        self.source_condition = Some(condition_id.into());
        self
    }

    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Size to close with: the executed size, or the configured quantity.
    pub fn open_size(&self) -> Decimal {
        self.size.unwrap_or(self.quantity)
    }

    /// Check the stop-loss sits on the losing side and the take-profit on
    /// the winning side, of each other and of `reference` when known.
    pub fn validate_protection(&self, reference: Option<Decimal>) -> Result<(), String> {
        // "worse than" for this side: lower for buys, higher for sells
        let worse = |a: Decimal, b: Decimal| match self.side {
            TradeSide::Buy => a < b,
            TradeSide::Sell => a > b,
        };
        let (loss_side, win_side) = match self.side {
            TradeSide::Buy => ("below", "above"),
            TradeSide::Sell => ("above", "below"),
        };

        if let (Some(stop), Some(target)) = (self.stop_loss_price, self.take_profit_price) {
            if !worse(stop, target) {
                return Err(format!(
                    "stop-loss {} must be {} take-profit {} for a {}",
                    stop, loss_side, target, self.side.as_str()
                ));
            }
        }

        let Some(reference) = reference else {
            return Ok(());
        };
        if let Some(stop) = self.stop_loss_price {
            if !worse(stop, reference) {
                return Err(format!(
                    "stop-loss {} must be {} the entry {} for a {}",
                    stop, loss_side, reference, self.side.as_str()
                ));
            }
        }
        if let Some(target) = self.take_profit_price {
            if !worse(reference, target) {
                return Err(format!(
                    "take-profit {} must be {} the entry {} for a {}",
                    target, win_side, reference, self.side.as_str()
                ));
            }
        }
        Ok(())
    }

    /// Realized P&L once the trade has an entry and an exit.
    pub fn realized_pnl(&self) -> Option<Decimal> {
        let entry = self.entry_price?;
        let exit = self.exit_price?;
        let diff = exit - entry;
        Some(match self.side {
            TradeSide::Buy => self.open_size() * diff,
            TradeSide::Sell => self.open_size() * -diff,
        })
    }
}
