//! Request and response types for the Delta Exchange v2 REST API.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Envelope every v2 endpoint wraps its payload in.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// Ticker from /v2/tickers/{symbol}.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerResponse {
    pub symbol: String,
    /// Last traded price
    #[serde(default)]
    pub close: Option<Decimal>,
    #[serde(default)]
    pub mark_price: Option<Decimal>,
    /// 24h volume in contracts
    #[serde(default)]
    pub volume: Option<Decimal>,
}

/// Candle from /v2/history/candles.
#[derive(Debug, Clone, Deserialize)]
pub struct CandleResponse {
    /// Candle open time, unix seconds
    pub time: i64,
    pub close: Decimal,
}

/// Wallet entry from /v2/wallet/balances.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    pub balance: Decimal,
}

/// Body for POST /v2/orders.
#[derive(Debug, Clone, Serialize)]
pub struct OrderBody {
    pub product_symbol: String,
    /// Whole contracts
    pub size: u64,
    pub side: String,
    /// `market_order` or `limit_order`
    pub order_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<String>,
}

/// Order acknowledgement.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
    pub id: i64,
    #[serde(default)]
    pub state: String,
    /// Contracts accepted
    #[serde(default)]
    pub size: Option<u64>,
}
