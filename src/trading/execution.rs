//! Boundary to the exchange: market data, balance and order placement.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::models::TradeSide;

/// Last price and 24h volume for a symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
    pub symbol: String,
    pub last_price: Decimal,
    pub volume_24h: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        }
    }
}

/// Order to submit. `price` is only meaningful for limit orders.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: TradeSide,
    pub size: Decimal,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: TradeSide, size: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size,
            order_type: OrderType::Market,
            price: None,
        }
    }

    pub fn limit(symbol: impl Into<String>, side: TradeSide, size: Decimal, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size,
            order_type: OrderType::Limit,
            price: Some(price),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub status: String,
    /// Size the exchange accepted, which may be less than requested
    pub filled_size: Decimal,
}

/// What the engine needs from an exchange client.
///
/// Implementations report `MarketData` for quote and history failures and
/// `Execution` for rejected orders. Orders are never retried here.
#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    async fn get_current_price(&self, symbol: &str) -> EngineResult<Decimal>;

    async fn get_ticker(&self, symbol: &str) -> EngineResult<Ticker>;

    /// Closing prices, oldest first, at least `min_points` long when available.
    async fn get_historical_closes(
        &self,
        symbol: &str,
        timeframe: &str,
        min_points: usize,
    ) -> EngineResult<Vec<Decimal>>;

    async fn get_account_balance(&self) -> EngineResult<Decimal>;

    async fn place_order(&self, order: &OrderRequest) -> EngineResult<OrderConfirmation>;
}
