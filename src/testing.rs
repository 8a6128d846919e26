//! Test doubles: a scripted exchange and an in-memory configuration store.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::db::ConfigurationStore;
use crate::error::{EngineError, EngineResult};
use crate::models::{Trade, TradingConfiguration};
use crate::trading::{ExecutionAdapter, OrderConfirmation, OrderRequest, Ticker};

#[derive(Default)]
struct MockState {
    price: Decimal,
    volume: Decimal,
    closes: Vec<Decimal>,
    balance: Decimal,
    fail_ticker: bool,
    fail_history: bool,
    fail_balance: bool,
    reject_orders: bool,
    whole_contracts: bool,
    orders: Vec<OrderRequest>,
    balance_calls: usize,
}

pub struct MockExchange {
    state: Mutex<MockState>,
}

impl MockExchange {
    pub fn new(price: Decimal) -> Self {
        Self {
            state: Mutex::new(MockState {
                price,
                ..Default::default()
            }),
        }
    }

    pub fn set_price(&self, price: Decimal) {
        self.state.lock().unwrap().price = price;
    }

    pub fn set_volume(&self, volume: Decimal) {
        self.state.lock().unwrap().volume = volume;
    }

    pub fn set_closes(&self, closes: &[f64]) {
        self.state.lock().unwrap().closes = closes
            .iter()
            .map(|c| Decimal::try_from(*c).unwrap())
            .collect();
    }

    pub fn set_balance(&self, balance: Decimal) {
        self.state.lock().unwrap().balance = balance;
    }

    pub fn fail_ticker(&self, fail: bool) {
        self.state.lock().unwrap().fail_ticker = fail;
    }

    pub fn fail_history(&self, fail: bool) {
        self.state.lock().unwrap().fail_history = fail;
    }

    pub fn fail_balance(&self, fail: bool) {
        self.state.lock().unwrap().fail_balance = fail;
    }

    pub fn reject_orders(&self, reject: bool) {
        self.state.lock().unwrap().reject_orders = reject;
    }

    /// Fill only the whole-contract part of each order, as Delta does.
    pub fn whole_contracts(&self, whole: bool) {
        self.state.lock().unwrap().whole_contracts = whole;
    }

    pub fn orders(&self) -> Vec<OrderRequest> {
        self.state.lock().unwrap().orders.clone()
    }

    pub fn balance_calls(&self) -> usize {
        self.state.lock().unwrap().balance_calls
    }
}

#[async_trait]
impl ExecutionAdapter for MockExchange {
    async fn get_current_price(&self, symbol: &str) -> EngineResult<Decimal> {
        Ok(self.get_ticker(symbol).await?.last_price)
    }

    async fn get_ticker(&self, symbol: &str) -> EngineResult<Ticker> {
        let state = self.state.lock().unwrap();
        if state.fail_ticker {
            return Err(EngineError::MarketData(format!("no quote for {}", symbol)));
        }
        Ok(Ticker {
            symbol: symbol.to_string(),
            last_price: state.price,
            volume_24h: state.volume,
        })
    }

    async fn get_historical_closes(
        &self,
        symbol: &str,
        _timeframe: &str,
        _min_points: usize,
    ) -> EngineResult<Vec<Decimal>> {
        let state = self.state.lock().unwrap();
        if state.fail_history {
            return Err(EngineError::MarketData(format!("no history for {}", symbol)));
        }
        Ok(state.closes.clone())
    }

    async fn get_account_balance(&self) -> EngineResult<Decimal> {
        let mut state = self.state.lock().unwrap();
        state.balance_calls += 1;
        if state.fail_balance {
            return Err(EngineError::MarketData("wallet unavailable".to_string()));
        }
        Ok(state.balance)
    }

    async fn place_order(&self, order: &OrderRequest) -> EngineResult<OrderConfirmation> {
        let mut state = self.state.lock().unwrap();
        if state.reject_orders {
            return Err(EngineError::Execution("insufficient margin".to_string()));
        }
        let filled_size = if state.whole_contracts {
            order.size.trunc()
        } else {
            order.size
        };
        state.orders.push(order.clone());
        Ok(OrderConfirmation {
            order_id: format!("order-{}", state.orders.len()),
            status: "filled".to_string(),
            filled_size,
        })
    }
}

#[derive(Default)]
struct StoreState {
    configurations: HashMap<String, TradingConfiguration>,
    deleted: HashSet<String>,
    trades: Vec<Trade>,
    fail_saves: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, config: TradingConfiguration) {
        self.state
            .lock()
            .unwrap()
            .configurations
            .insert(config.id.clone(), config);
    }

    pub fn insert_trade(&self, trade: Trade) {
        self.state.lock().unwrap().trades.push(trade);
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.state.lock().unwrap().trades.clone()
    }

    /// Live configuration, `None` once deleted.
    pub fn configuration(&self, id: &str) -> Option<TradingConfiguration> {
        let state = self.state.lock().unwrap();
        if state.deleted.contains(id) {
            return None;
        }
        state.configurations.get(id).cloned()
    }

    /// Whether a row exists at all, deleted or not.
    pub fn has_row(&self, id: &str) -> bool {
        self.state.lock().unwrap().configurations.contains_key(id)
    }

    pub fn fail_saves(&self, fail: bool) {
        self.state.lock().unwrap().fail_saves = fail;
    }
}

#[async_trait]
impl ConfigurationStore for MemoryStore {
    async fn load_configurations(&self) -> Result<Vec<TradingConfiguration>> {
        let state = self.state.lock().unwrap();
        let mut configs: Vec<_> = state
            .configurations
            .values()
            .filter(|c| !state.deleted.contains(&c.id))
            .cloned()
            .collect();
        configs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(configs)
    }

    async fn load_configuration(&self, id: &str) -> Result<Option<TradingConfiguration>> {
        Ok(self.configuration(id))
    }

    async fn save_configuration(&self, config: &TradingConfiguration) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_saves {
            bail!("store is read-only");
        }
        state.deleted.remove(&config.id);
        state
            .configurations
            .insert(config.id.clone(), config.clone());
        Ok(())
    }

    async fn delete_configuration(&self, id: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if state.deleted.contains(id) {
            return Ok(false);
        }
        let Some(config) = state.configurations.get_mut(id) else {
            return Ok(false);
        };
        config.active = false;
        state.deleted.insert(id.to_string());
        Ok(true)
    }

    async fn deleted_configuration_ids(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().unwrap().deleted.iter().cloned().collect())
    }

    async fn purge_configuration(&self, id: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if !state.deleted.remove(id) {
            return Ok(false);
        }
        Ok(state.configurations.remove(id).is_some())
    }

    async fn load_trades(&self, config_id: &str) -> Result<Vec<Trade>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .trades
            .iter()
            .filter(|t| t.config_id == config_id)
            .cloned()
            .collect())
    }

    async fn save_trades(&self, trades: &[Trade]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_saves {
            bail!("store is read-only");
        }
        for trade in trades {
            match state.trades.iter_mut().find(|t| t.id == trade.id) {
                Some(existing) => *existing = trade.clone(),
                None => state.trades.push(trade.clone()),
            }
        }
        Ok(())
    }
}
