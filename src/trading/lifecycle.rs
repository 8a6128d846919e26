//! Trade state machine: pending -> active -> stopped | completed.
//!
//! Deciding a transition is pure; applying it records prices and times. The
//! engine places the matching order in between and only applies the
//! transition once the order is accepted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::models::{EntryCondition, Trade, TradeSide, TradeStatus};

/// Relative tolerance for an `equals` entry.
const ENTRY_EQUALS_TOLERANCE: Decimal = dec!(0.01);

/// The single transition a trade should take at a given price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Hold,
    Enter,
    StopLoss,
    TakeProfit,
}

impl Transition {
    pub fn target_status(&self) -> Option<TradeStatus> {
        match self {
            Transition::Hold => None,
            Transition::Enter => Some(TradeStatus::Active),
            Transition::StopLoss => Some(TradeStatus::Stopped),
            Transition::TakeProfit => Some(TradeStatus::Completed),
        }
    }
}

impl Trade {
    /// Transition due at `price`. Stop-loss is checked before take-profit.
    pub fn next_transition(&self, price: Decimal) -> Transition {
        match self.status {
            TradeStatus::Pending => {
                if self.is_entry_met(price) {
                    Transition::Enter
                } else {
                    Transition::Hold
                }
            }
            TradeStatus::Active => {
                if self.is_stop_loss_hit(price) {
                    Transition::StopLoss
                } else if self.is_take_profit_hit(price) {
                    Transition::TakeProfit
                } else {
                    Transition::Hold
                }
            }
            TradeStatus::Stopped | TradeStatus::Completed => Transition::Hold,
        }
    }

    fn is_entry_met(&self, price: Decimal) -> bool {
        if self.entry_condition == EntryCondition::Market {
            return true;
        }
        let Some(target) = self.entry_price else {
            return false;
        };
        match self.entry_condition {
            EntryCondition::Above => price >= target,
            EntryCondition::Below => price <= target,
            EntryCondition::Equals => (price - target).abs() < ENTRY_EQUALS_TOLERANCE * target,
            EntryCondition::Market => true,
        }
    }

    fn is_stop_loss_hit(&self, price: Decimal) -> bool {
        match (self.stop_loss_price, self.side) {
            (Some(stop), TradeSide::Buy) => price <= stop,
            (Some(stop), TradeSide::Sell) => price >= stop,
            (None, _) => false,
        }
    }

    fn is_take_profit_hit(&self, price: Decimal) -> bool {
        match (self.take_profit_price, self.side) {
            (Some(target), TradeSide::Buy) => price >= target,
            (Some(target), TradeSide::Sell) => price <= target,
            (None, _) => false,
        }
    }

    /// Record the entry fill. No-op unless the trade is pending.
    pub fn mark_active(&mut self, price: Decimal, size: Decimal, order_id: String, at: DateTime<Utc>) {
        if self.status != TradeStatus::Pending {
            return;
        }
        self.status = TradeStatus::Active;
        self.entry_price = Some(price);
        self.size = Some(size);
        self.entry_order_id = Some(order_id);
        self.entry_time = Some(at);
    }

    /// Record the exit for a stop-loss or take-profit. No-op unless active.
    pub fn mark_closed(
        &mut self,
        transition: Transition,
        price: Decimal,
        order_id: String,
        at: DateTime<Utc>,
    ) {
        if self.status != TradeStatus::Active {
            return;
        }
        let status = match transition.target_status() {
            Some(status) if status.is_terminal() => status,
            _ => return,
        };
        self.status = status;
        self.exit_price = Some(price);
        self.exit_order_id = Some(order_id);
        self.exit_time = Some(at);
    }
}
