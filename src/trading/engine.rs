//! Per-configuration tick: advance open trades, then fire conditions.
//!
//! Flow for one tick:
//! 1. Save any trades a previous tick failed to persist
//! 2. Load the configuration and its trades from the store
//! 3. Fetch the ticker and, when any condition needs it, the close history
//! 4. Move each open trade through at most one transition
//! 5. Evaluate conditions; a firing condition opens and enters a new trade
//!
//! Every trade is saved as soon as its order is accepted. A failed save ends
//! the tick and the trade is held in memory until a later save succeeds, so a
//! live position is never forgotten and never entered twice.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::ConfigurationStore;
use crate::error::{EngineError, EngineResult};
use crate::models::{Condition, EntryCondition, Trade, TradeSide, TradingConfiguration};

use super::evaluator::evaluate;
use super::execution::{ExecutionAdapter, OrderRequest, Ticker};
use super::lifecycle::Transition;
use super::position_sizer::{PositionSizer, SizingRequest};
use super::scheduler::TickHandler;
use super::TradingConfig;

/// Summary of one tick, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub config_id: String,
    pub price: Option<Decimal>,
    pub conditions_fired: usize,
    pub trades_opened: usize,
    pub trades_closed: usize,
    /// Recoverable failures logged during the tick
    pub errors: usize,
}

impl TickReport {
    fn new(config_id: &str) -> Self {
        Self {
            config_id: config_id.to_string(),
            ..Default::default()
        }
    }
}

/// Result of evaluating one condition without trading.
#[derive(Debug)]
pub struct ConditionCheck {
    pub condition_id: String,
    pub kind: &'static str,
    pub action: TradeSide,
    pub result: EngineResult<bool>,
}

/// Decision engine shared by every scheduled configuration.
pub struct TradingEngine {
    exchange: Arc<dyn ExecutionAdapter>,
    store: Arc<dyn ConfigurationStore>,
    sizer: PositionSizer,
    config: TradingConfig,
    /// Trades with an accepted order whose save failed, by configuration id
    unsaved: Mutex<HashMap<String, Vec<Trade>>>,
}

impl TradingEngine {
    pub fn new(
        exchange: Arc<dyn ExecutionAdapter>,
        store: Arc<dyn ConfigurationStore>,
        config: TradingConfig,
    ) -> Self {
        Self {
            exchange,
            store,
            sizer: PositionSizer::new(&config),
            config,
            unsaved: Mutex::new(HashMap::new()),
        }
    }

    /// Run one evaluation cycle for a configuration.
    ///
    /// Only persistence failures and a missing configuration fail the tick;
    /// everything else is logged and counted in the report.
    pub async fn run_tick(
        &self,
        config_id: &str,
        cancel: &CancellationToken,
    ) -> EngineResult<TickReport> {
        let mut report = TickReport::new(config_id);

        // nothing is evaluated while an earlier order is still unrecorded
        self.save_unsaved(config_id).await?;

        let config = self
            .store
            .load_configuration(config_id)
            .await
            .map_err(EngineError::Persistence)?
            .ok_or_else(|| EngineError::ConfigurationNotFound(config_id.to_string()))?;

        if !config.active {
            debug!(config_id = %config_id, "Configuration inactive, skipping tick");
            return Ok(report);
        }

        let mut trades = self
            .store
            .load_trades(config_id)
            .await
            .map_err(EngineError::Persistence)?;

        let ticker = match self.exchange.get_ticker(&config.symbol).await {
            Ok(ticker) => ticker,
            Err(e) => {
                warn!(config_id = %config_id, symbol = %config.symbol, error = %e, "Ticker unavailable");
                report.errors += 1;
                return Ok(report);
            }
        };
        let price = ticker.last_price;
        report.price = Some(price);

        let history = self.load_history(&config).await;

        for trade in trades.iter_mut().filter(|t| t.is_open()) {
            match self.advance_trade(trade, price, cancel).await {
                Ok(Transition::Hold) => {}
                Ok(transition) => {
                    if matches!(transition, Transition::StopLoss | Transition::TakeProfit) {
                        report.trades_closed += 1;
                    }
                    self.persist(trade).await?;
                }
                Err(e) => {
                    warn!(config_id = %config_id, trade_id = %trade.id, error = %e, "Trade transition failed");
                    report.errors += 1;
                }
            }
        }

        for condition in &config.conditions {
            let has_open_trade = trades
                .iter()
                .any(|t| t.is_open() && t.source_condition.as_deref() == Some(condition.id.as_str()));
            if has_open_trade {
                debug!(condition_id = %condition.id, "Condition already has an open trade");
                continue;
            }

            match evaluate(&condition.signal, &ticker, history.as_deref()) {
                Ok(true) => {
                    report.conditions_fired += 1;
                    info!(
                        config_id = %config_id,
                        condition_id = %condition.id,
                        kind = condition.signal.kind(),
                        action = condition.action.as_str(),
                        price = %price,
                        "Condition fired"
                    );
                    match self.open_from_condition(&config, condition, price, cancel).await {
                        Ok(Some(trade)) => {
                            report.trades_opened += 1;
                            self.persist(&trade).await?;
                            trades.push(trade);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            error!(config_id = %config_id, condition_id = %condition.id, error = %e, "Entry failed");
                            report.errors += 1;
                        }
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(config_id = %config_id, condition_id = %condition.id, error = %e, "Condition evaluation failed");
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    /// Save a trade whose order was just accepted, holding it on failure.
    async fn persist(&self, trade: &Trade) -> EngineResult<()> {
        let Err(e) = self.store.save_trades(std::slice::from_ref(trade)).await else {
            return Ok(());
        };

        error!(
            config_id = %trade.config_id,
            trade_id = %trade.id,
            status = trade.status.as_str(),
            error = %e,
            "Trade save failed, holding it for the next tick"
        );

        let mut unsaved = self.unsaved.lock().await;
        let held = unsaved.entry(trade.config_id.clone()).or_default();
        match held.iter_mut().find(|t| t.id == trade.id) {
            Some(existing) => *existing = trade.clone(),
            None => held.push(trade.clone()),
        }

        Err(EngineError::Persistence(e))
    }

    /// Retry saving trades held by an earlier failed tick.
    async fn save_unsaved(&self, config_id: &str) -> EngineResult<()> {
        let mut unsaved = self.unsaved.lock().await;
        let Some(held) = unsaved.remove(config_id) else {
            return Ok(());
        };

        match self.store.save_trades(&held).await {
            Ok(()) => {
                info!(config_id = %config_id, count = held.len(), "Saved trades held from an earlier tick");
                Ok(())
            }
            Err(e) => {
                unsaved.insert(config_id.to_string(), held);
                Err(EngineError::Persistence(e))
            }
        }
    }

    /// Evaluate every condition once against live data, placing no orders.
    pub async fn evaluate_conditions(
        &self,
        config: &TradingConfiguration,
    ) -> EngineResult<(Ticker, Vec<ConditionCheck>)> {
        let ticker = self.exchange.get_ticker(&config.symbol).await?;
        let history = self.load_history(config).await;

        let checks = config
            .conditions
            .iter()
            .map(|condition| ConditionCheck {
                condition_id: condition.id.clone(),
                kind: condition.signal.kind(),
                action: condition.action,
                result: evaluate(&condition.signal, &ticker, history.as_deref()),
            })
            .collect();

        Ok((ticker, checks))
    }

    /// Closes as f64, fetched only when some condition needs them.
    async fn load_history(&self, config: &TradingConfiguration) -> Option<Vec<f64>> {
        if !config.needs_history() {
            return None;
        }

        let timeframe = if config.timeframe.is_empty() {
            self.config.default_timeframe.as_str()
        } else {
            config.timeframe.as_str()
        };
        let min_points = config.history_lookback().max(self.config.history_depth);

        match self
            .exchange
            .get_historical_closes(&config.symbol, timeframe, min_points)
            .await
        {
            Ok(closes) => Some(closes.iter().filter_map(|c| c.to_f64()).collect()),
            Err(e) => {
                warn!(config_id = %config.id, symbol = %config.symbol, error = %e, "Price history unavailable");
                None
            }
        }
    }

    /// Create the trade for a firing condition and enter it at market.
    ///
    /// Returns `None` when a stop was observed before the order went out; the
    /// trade is then dropped, as it is when the entry order is rejected.
    async fn open_from_condition(
        &self,
        config: &TradingConfiguration,
        condition: &Condition,
        price: Decimal,
        cancel: &CancellationToken,
    ) -> EngineResult<Option<Trade>> {
        let mut trade = Trade::new(
            &config.id,
            &config.symbol,
            condition.action,
            condition.quantity,
            EntryCondition::Market,
            None,
        )
        .with_protection(condition.stop_loss_price(price), condition.take_profit_price(price))
        .with_risk_percent(Some(condition.risk_percent))
        .with_source_condition(&condition.id);

        match self.advance_trade(&mut trade, price, cancel).await? {
            Transition::Enter => Ok(Some(trade)),
            _ => Ok(None),
        }
    }

    /// Apply the transition due at `price`, placing its order first.
    ///
    /// A rejected order leaves the trade untouched.
    async fn advance_trade(
        &self,
        trade: &mut Trade,
        price: Decimal,
        cancel: &CancellationToken,
    ) -> EngineResult<Transition> {
        let transition = trade.next_transition(price);
        if transition == Transition::Hold {
            return Ok(Transition::Hold);
        }

        if cancel.is_cancelled() {
            debug!(trade_id = %trade.id, "Stop requested, not placing order");
            return Ok(Transition::Hold);
        }

        match transition {
            Transition::Enter => {
                let size = self
                    .sizer
                    .size_for(
                        &SizingRequest {
                            quantity: trade.quantity,
                            risk_percent: trade.risk_percent,
                            stop_loss_price: trade.stop_loss_price,
                            current_price: price,
                        },
                        self.exchange.as_ref(),
                    )
                    .await;

                let order = match (trade.entry_condition, trade.entry_price) {
                    (EntryCondition::Market, _) | (_, None) => {
                        OrderRequest::market(&trade.symbol, trade.side, size)
                    }
                    (_, Some(limit)) => OrderRequest::limit(&trade.symbol, trade.side, size, limit),
                };

                let confirmation = self.exchange.place_order(&order).await?;
                let filled = confirmation.filled_size;
                if filled <= Decimal::ZERO {
                    return Err(EngineError::Execution(format!(
                        "order {} accepted with no size",
                        confirmation.order_id
                    )));
                }
                trade.mark_active(price, filled, confirmation.order_id, Utc::now());

                info!(
                    trade_id = %trade.id,
                    symbol = %trade.symbol,
                    side = trade.side.as_str(),
                    requested = %size,
                    size = %filled,
                    price = %price,
                    "Trade entered"
                );
            }
            Transition::StopLoss | Transition::TakeProfit => {
                let size = trade.open_size();
                let order = OrderRequest::market(&trade.symbol, trade.side.opposite(), size);

                let confirmation = self.exchange.place_order(&order).await?;
                trade.mark_closed(transition, price, confirmation.order_id, Utc::now());

                info!(
                    trade_id = %trade.id,
                    symbol = %trade.symbol,
                    status = trade.status.as_str(),
                    exit_price = %price,
                    pnl = %trade.realized_pnl().unwrap_or_default(),
                    "Trade closed"
                );
            }
            Transition::Hold => {}
        }

        Ok(transition)
    }
}

#[async_trait]
impl TickHandler for TradingEngine {
    async fn tick(&self, config_id: &str, cancel: &CancellationToken) -> EngineResult<TickReport> {
        self.run_tick(config_id, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::MaKind;
    use crate::models::{CrossOperator, RsiOperator, Signal, ThresholdOperator, TradeStatus};
    use crate::testing::{MemoryStore, MockExchange};
    use crate::trading::OrderType;
    use rust_decimal_macros::dec;

    struct Harness {
        exchange: Arc<MockExchange>,
        store: Arc<MemoryStore>,
        engine: TradingEngine,
    }

    fn harness(price: Decimal) -> Harness {
        let exchange = Arc::new(MockExchange::new(price));
        let store = Arc::new(MemoryStore::new());
        let engine = TradingEngine::new(exchange.clone(), store.clone(), TradingConfig::default());
        Harness {
            exchange,
            store,
            engine,
        }
    }

    fn price_above(value: Decimal) -> Condition {
        Condition::new(
            Signal::Price {
                operator: ThresholdOperator::Above,
                value,
            },
            TradeSide::Buy,
            dec!(2),
        )
    }

    fn active_config(conditions: Vec<Condition>) -> TradingConfiguration {
        let mut config = TradingConfiguration::new("BTCUSD", 1000, conditions);
        config.active = true;
        config
    }

    #[tokio::test]
    async fn test_condition_opens_single_trade() {
        let h = harness(dec!(101));
        let config = active_config(vec![price_above(dec!(100))
            .with_stop_loss(dec!(5))
            .with_take_profit(dec!(10))]);
        h.store.insert(config.clone());
        let cancel = CancellationToken::new();

        let report = h.engine.run_tick(&config.id, &cancel).await.unwrap();
        assert_eq!(report.conditions_fired, 1);
        assert_eq!(report.trades_opened, 1);
        assert_eq!(report.price, Some(dec!(101)));

        let trades = h.store.trades();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].status, TradeStatus::Active);
        assert_eq!(trades[0].stop_loss_price, Some(dec!(95.95)));
        assert_eq!(trades[0].take_profit_price, Some(dec!(111.1)));
        assert_eq!(trades[0].source_condition.as_deref(), Some(config.conditions[0].id.as_str()));

        // still true, but the condition's trade is open
        let report = h.engine.run_tick(&config.id, &cancel).await.unwrap();
        assert_eq!(report.trades_opened, 0);
        assert_eq!(h.store.trades().len(), 1);
        assert_eq!(h.exchange.orders().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_loss_closes_with_opposite_market_order() {
        let h = harness(dec!(101));
        let config = active_config(vec![price_above(dec!(100)).with_stop_loss(dec!(5))]);
        h.store.insert(config.clone());
        let cancel = CancellationToken::new();

        h.engine.run_tick(&config.id, &cancel).await.unwrap();
        h.exchange.set_price(dec!(90));
        let report = h.engine.run_tick(&config.id, &cancel).await.unwrap();
        assert_eq!(report.trades_closed, 1);

        let trades = h.store.trades();
        assert_eq!(trades[0].status, TradeStatus::Stopped);
        assert_eq!(trades[0].exit_price, Some(dec!(90)));

        let orders = h.exchange.orders();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[1].side, TradeSide::Sell);
        assert_eq!(orders[1].order_type, OrderType::Market);
        assert_eq!(orders[1].size, trades[0].open_size());
    }

    #[tokio::test]
    async fn test_rejected_entry_retries_next_tick() {
        let h = harness(dec!(101));
        let config = active_config(vec![price_above(dec!(100))]);
        h.store.insert(config.clone());
        let cancel = CancellationToken::new();

        h.exchange.reject_orders(true);
        let report = h.engine.run_tick(&config.id, &cancel).await.unwrap();
        assert_eq!(report.conditions_fired, 1);
        assert_eq!(report.trades_opened, 0);
        assert_eq!(report.errors, 1);
        assert!(h.store.trades().is_empty());

        h.exchange.reject_orders(false);
        let report = h.engine.run_tick(&config.id, &cancel).await.unwrap();
        assert_eq!(report.trades_opened, 1);
        assert_eq!(h.store.trades().len(), 1);
    }

    #[tokio::test]
    async fn test_risk_sizing_on_entry() {
        let h = harness(dec!(100));
        h.exchange.set_balance(dec!(10000));
        let config = active_config(vec![price_above(dec!(99)).with_stop_loss(dec!(5))]);
        h.store.insert(config.clone());

        h.engine.run_tick(&config.id, &CancellationToken::new()).await.unwrap();

        // 1% of 10000 over a 5 point stop
        let orders = h.exchange.orders();
        assert_eq!(orders[0].size, dec!(20));
        assert_eq!(h.store.trades()[0].size, Some(dec!(20)));
    }

    #[tokio::test]
    async fn test_manual_trade_uses_limit_entry() {
        let h = harness(dec!(99));
        let config = active_config(Vec::new());
        h.store.insert(config.clone());
        h.store.insert_trade(Trade::new(
            &config.id,
            "BTCUSD",
            TradeSide::Buy,
            dec!(1),
            EntryCondition::Above,
            Some(dec!(100)),
        ));
        let cancel = CancellationToken::new();

        h.engine.run_tick(&config.id, &cancel).await.unwrap();
        assert_eq!(h.store.trades()[0].status, TradeStatus::Pending);
        assert!(h.exchange.orders().is_empty());

        h.exchange.set_price(dec!(100));
        h.engine.run_tick(&config.id, &cancel).await.unwrap();
        assert_eq!(h.store.trades()[0].status, TradeStatus::Active);

        let orders = h.exchange.orders();
        assert_eq!(orders[0].order_type, OrderType::Limit);
        assert_eq!(orders[0].price, Some(dec!(100)));
    }

    #[tokio::test]
    async fn test_bad_condition_does_not_block_sibling() {
        let h = harness(dec!(101));
        h.exchange.fail_history(true);
        let rsi = Condition::new(
            Signal::Rsi {
                operator: RsiOperator::Below,
                value: 30.0,
                period: 14,
            },
            TradeSide::Buy,
            dec!(1),
        );
        let config = active_config(vec![rsi, price_above(dec!(100))]);
        h.store.insert(config.clone());

        let report = h.engine.run_tick(&config.id, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(report.trades_opened, 1);
    }

    #[tokio::test]
    async fn test_ticker_failure_is_recovered() {
        let h = harness(dec!(101));
        h.exchange.fail_ticker(true);
        let config = active_config(vec![price_above(dec!(100))]);
        h.store.insert(config.clone());

        let report = h.engine.run_tick(&config.id, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.errors, 1);
        assert!(report.price.is_none());
        assert!(h.exchange.orders().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_tick_places_no_orders() {
        let h = harness(dec!(101));
        let config = active_config(vec![price_above(dec!(100))]);
        h.store.insert(config.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = h.engine.run_tick(&config.id, &cancel).await.unwrap();
        assert_eq!(report.conditions_fired, 1);
        assert_eq!(report.trades_opened, 0);
        assert!(h.exchange.orders().is_empty());
        assert!(h.store.trades().is_empty());
    }

    #[tokio::test]
    async fn test_inactive_and_missing_configurations() {
        let h = harness(dec!(101));
        let mut config = active_config(vec![price_above(dec!(100))]);
        config.active = false;
        h.store.insert(config.clone());
        let cancel = CancellationToken::new();

        let report = h.engine.run_tick(&config.id, &cancel).await.unwrap();
        assert_eq!(report.conditions_fired, 0);
        assert!(h.exchange.orders().is_empty());

        let err = h.engine.run_tick("missing", &cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::ConfigurationNotFound(_)));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_save_failure_fails_tick() {
        let h = harness(dec!(101));
        let config = active_config(vec![price_above(dec!(100))]);
        h.store.insert(config.clone());
        h.store.fail_saves(true);

        let err = h
            .engine
            .run_tick(&config.id, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_evaluate_conditions_places_no_orders() {
        let h = harness(dec!(101));
        let config = active_config(vec![price_above(dec!(100)), price_above(dec!(200))]);

        let (ticker, checks) = h.engine.evaluate_conditions(&config).await.unwrap();
        assert_eq!(ticker.last_price, dec!(101));
        assert!(matches!(checks[0].result, Ok(true)));
        assert!(matches!(checks[1].result, Ok(false)));
        assert!(h.exchange.orders().is_empty());
    }

    #[tokio::test]
    async fn test_failed_save_holds_trade_until_store_recovers() {
        let h = harness(dec!(101));
        let config = active_config(vec![price_above(dec!(100))]);
        h.store.insert(config.clone());
        let cancel = CancellationToken::new();

        h.store.fail_saves(true);
        let err = h.engine.run_tick(&config.id, &cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::Persistence(_)));
        assert_eq!(h.exchange.orders().len(), 1);
        assert!(h.store.trades().is_empty());

        // still failing: the held trade blocks new orders
        let err = h.engine.run_tick(&config.id, &cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::Persistence(_)));
        assert_eq!(h.exchange.orders().len(), 1);

        h.store.fail_saves(false);
        let report = h.engine.run_tick(&config.id, &cancel).await.unwrap();
        assert_eq!(report.trades_opened, 0);
        assert_eq!(h.exchange.orders().len(), 1);

        let trades = h.store.trades();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].status, TradeStatus::Active);
        assert_eq!(trades[0].entry_order_id.as_deref(), Some("order-1"));
    }

    #[tokio::test]
    async fn test_failed_exit_save_does_not_exit_twice() {
        let h = harness(dec!(101));
        let config = active_config(vec![price_above(dec!(100)).with_stop_loss(dec!(5))]);
        h.store.insert(config.clone());
        let cancel = CancellationToken::new();

        h.engine.run_tick(&config.id, &cancel).await.unwrap();
        h.exchange.set_price(dec!(90));
        h.store.fail_saves(true);
        assert!(h.engine.run_tick(&config.id, &cancel).await.is_err());
        assert_eq!(h.exchange.orders().len(), 2);

        h.store.fail_saves(false);
        let report = h.engine.run_tick(&config.id, &cancel).await.unwrap();
        assert_eq!(report.trades_closed, 0);
        assert_eq!(h.store.trades()[0].status, TradeStatus::Stopped);
        assert_eq!(h.exchange.orders().len(), 2);
    }

    #[tokio::test]
    async fn test_records_executed_size_not_requested() {
        let h = harness(dec!(100));
        h.exchange.set_balance(dec!(10000));
        h.exchange.whole_contracts(true);
        let config = active_config(vec![price_above(dec!(99)).with_stop_loss(dec!(7))]);
        h.store.insert(config.clone());
        let cancel = CancellationToken::new();

        h.engine.run_tick(&config.id, &cancel).await.unwrap();

        // 100 at risk over a 7 point stop asks for 14.28..., 14 fill
        let orders = h.exchange.orders();
        assert!(orders[0].size > dec!(14) && orders[0].size < dec!(15));
        let trade = &h.store.trades()[0];
        assert_eq!(trade.size, Some(dec!(14)));
        assert_eq!(trade.open_size(), dec!(14));

        h.exchange.set_price(dec!(90));
        h.engine.run_tick(&config.id, &cancel).await.unwrap();
        let trade = &h.store.trades()[0];
        assert_eq!(trade.status, TradeStatus::Stopped);
        assert_eq!(h.exchange.orders()[1].size, dec!(14));
        assert_eq!(trade.realized_pnl(), Some(dec!(-140)));
    }

    fn ma_cross(period: usize, second_period: usize) -> Condition {
        Condition::new(
            Signal::MaCross {
                operator: CrossOperator::CrossesAbove,
                period,
                second_period,
                ma_type: MaKind::Sma,
            },
            TradeSide::Buy,
            dec!(1),
        )
    }

    #[tokio::test]
    async fn test_ma_cross_fires_from_fetched_history() {
        let h = harness(dec!(20));
        let mut closes = vec![10.0; 10];
        closes.push(20.0);
        h.exchange.set_closes(&closes);
        let config = active_config(vec![ma_cross(2, 5)]);
        h.store.insert(config.clone());

        let report = h.engine.run_tick(&config.id, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.errors, 0);
        assert_eq!(report.conditions_fired, 1);
        assert_eq!(report.trades_opened, 1);
        assert_eq!(h.exchange.orders()[0].side, TradeSide::Buy);
    }

    #[tokio::test]
    async fn test_short_history_counts_error_and_sibling_still_fires() {
        let h = harness(dec!(101));
        h.exchange.set_closes(&[10.0; 5]);
        let config = active_config(vec![ma_cross(2, 5), price_above(dec!(100))]);
        h.store.insert(config.clone());

        let report = h.engine.run_tick(&config.id, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(report.conditions_fired, 1);
        assert_eq!(report.trades_opened, 1);
        assert_eq!(
            h.store.trades()[0].source_condition.as_deref(),
            Some(config.conditions[1].id.as_str())
        );
    }

    #[tokio::test]
    async fn test_rsi_on_short_history_reads_neutral() {
        let h = harness(dec!(102));
        h.exchange.set_closes(&[100.0, 101.0, 102.0]);
        let below_60 = Condition::new(
            Signal::Rsi {
                operator: RsiOperator::Below,
                value: 60.0,
                period: 14,
            },
            TradeSide::Buy,
            dec!(1),
        );
        let config = active_config(vec![below_60]);
        h.store.insert(config.clone());

        let report = h.engine.run_tick(&config.id, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.errors, 0);
        assert_eq!(report.trades_opened, 1);
    }

    #[tokio::test]
    async fn test_volume_equals_uses_ticker_volume() {
        let h = harness(dec!(101));
        h.exchange.set_volume(dec!(1080));
        let volume = |value: Decimal| {
            Condition::new(
                Signal::Volume {
                    operator: ThresholdOperator::Equals,
                    value,
                },
                TradeSide::Sell,
                dec!(1),
            )
        };
        let config = active_config(vec![volume(dec!(1000)), volume(dec!(1200))]);
        h.store.insert(config.clone());

        let report = h.engine.run_tick(&config.id, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.conditions_fired, 1);
        let trades = h.store.trades();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].side, TradeSide::Sell);
        assert_eq!(trades[0].source_condition.as_deref(), Some(config.conditions[0].id.as_str()));
    }
}
