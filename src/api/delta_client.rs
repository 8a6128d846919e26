//! Delta Exchange REST client.
//!
//! Handles:
//! - HMAC-SHA256 request signing
//! - Ticker, candle history and wallet reads, retried with backoff
//! - Order placement, never retried

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::trading::{ExecutionAdapter, OrderConfirmation, OrderRequest, OrderType, Ticker};

use super::types::*;

type HmacSha256 = Hmac<Sha256>;

pub const DELTA_API_BASE: &str = "https://api.delta.exchange";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(15);
const USER_AGENT: &str = "delta-autotrader";

/// Client for the Delta Exchange v2 API.
pub struct DeltaClient {
    http: Client,
    api_key: String,
    api_secret: String,
    base_url: String,
}

impl DeltaClient {
    pub fn new(api_key: &str, api_secret: &str, base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the raw ticker for a product symbol.
    pub async fn ticker(&self, symbol: &str) -> Result<TickerResponse> {
        self.get(&format!("/v2/tickers/{}", symbol), &[]).await
    }

    /// Fetch up to `count` candles, oldest first.
    pub async fn candles(&self, symbol: &str, timeframe: &str, count: usize) -> Result<Vec<CandleResponse>> {
        let step = timeframe_secs(timeframe)
            .ok_or_else(|| anyhow!("Unsupported timeframe '{}'", timeframe))?;
        let end = Utc::now().timestamp();
        let start = end - step * count as i64;

        let mut candles: Vec<CandleResponse> = self
            .get(
                "/v2/history/candles",
                &[
                    ("resolution", timeframe.to_string()),
                    ("symbol", symbol.to_string()),
                    ("start", start.to_string()),
                    ("end", end.to_string()),
                ],
            )
            .await?;

        candles.sort_by_key(|c| c.time);
        Ok(candles)
    }

    /// Sum of wallet balances across assets.
    pub async fn total_balance(&self) -> Result<Decimal> {
        let balances: Vec<BalanceResponse> = self.get("/v2/wallet/balances", &[]).await?;
        Ok(balances.iter().map(|b| b.balance).sum())
    }

    /// Submit an order. Sizes are whole contracts; fractions are truncated.
    pub async fn submit_order(&self, order: &OrderRequest) -> Result<OrderResponse> {
        let size = contract_size(order.size)?;

        let body = OrderBody {
            product_symbol: order.symbol.clone(),
            size,
            side: order.side.as_str().to_string(),
            order_type: match order.order_type {
                OrderType::Market => "market_order".to_string(),
                OrderType::Limit => "limit_order".to_string(),
            },
            limit_price: order.price.map(|p| p.to_string()),
        };
        let payload = serde_json::to_string(&body).context("Failed to encode order")?;

        let path = "/v2/orders";
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, body = %payload, "Placing order");

        let response = self
            .http
            .post(&url)
            .headers(self.signed_headers("POST", path, "", &payload)?)
            .body(payload)
            .send()
            .await
            .context("Failed to send order")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("Order placement failed: {} - {}", status, text);
        }

        let envelope: ApiResponse<OrderResponse> = response
            .json()
            .await
            .context("Failed to parse order response")?;
        let mut placed = unwrap_result(envelope, "order")?;
        placed.size.get_or_insert(size);
        Ok(placed)
    }

    /// Signed GET, retried on transport errors, 429 and 5xx.
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let query_string = encode_query(query);
        let url = format!("{}{}{}", self.base_url, path, query_string);

        let policy = ExponentialBackoff {
            max_elapsed_time: Some(MAX_RETRY_ELAPSED),
            ..Default::default()
        };

        let client = self;
        let (url, path, query_string) = (url.as_str(), path, query_string.as_str());

        let envelope: ApiResponse<T> = retry(policy, move || async move {
            debug!(url = %url, "Fetching");

            let headers = client
                .signed_headers("GET", path, query_string, "")
                .map_err(backoff::Error::permanent)?;

            let response = client
                .http
                .get(url)
                .headers(headers)
                .send()
                .await
                .with_context(|| format!("Request to {} failed", path))
                .map_err(backoff::Error::transient)?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let err = anyhow!("{} request failed: {} - {}", path, status, body);
                return Err(if is_retryable(status) {
                    backoff::Error::transient(err)
                } else {
                    backoff::Error::permanent(err)
                });
            }

            response
                .json::<ApiResponse<T>>()
                .await
                .with_context(|| format!("Failed to parse {} response", path))
                .map_err(backoff::Error::permanent)
        })
        .await?;

        unwrap_result(envelope, path)
    }

    fn signed_headers(&self, method: &str, path: &str, query: &str, body: &str) -> Result<HeaderMap> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign(&self.api_secret, method, &timestamp, path, query, body)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("api-key"),
            HeaderValue::from_str(&self.api_key).context("Invalid API key")?,
        );
        headers.insert(
            HeaderName::from_static("timestamp"),
            HeaderValue::from_str(&timestamp)?,
        );
        headers.insert(
            HeaderName::from_static("signature"),
            HeaderValue::from_str(&signature)?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(headers)
    }
}

#[async_trait]
impl ExecutionAdapter for DeltaClient {
    async fn get_current_price(&self, symbol: &str) -> EngineResult<Decimal> {
        Ok(self.get_ticker(symbol).await?.last_price)
    }

    async fn get_ticker(&self, symbol: &str) -> EngineResult<Ticker> {
        let raw = self
            .ticker(symbol)
            .await
            .map_err(|e| EngineError::MarketData(format!("{:#}", e)))?;

        let last_price = raw
            .close
            .or(raw.mark_price)
            .ok_or_else(|| EngineError::MarketData(format!("no quote for {}", symbol)))?;

        Ok(Ticker {
            symbol: raw.symbol,
            last_price,
            volume_24h: raw.volume.unwrap_or_default(),
        })
    }

    async fn get_historical_closes(
        &self,
        symbol: &str,
        timeframe: &str,
        min_points: usize,
    ) -> EngineResult<Vec<Decimal>> {
        let candles = self
            .candles(symbol, timeframe, min_points)
            .await
            .map_err(|e| EngineError::MarketData(format!("{:#}", e)))?;

        Ok(candles.into_iter().map(|c| c.close).collect())
    }

    async fn get_account_balance(&self) -> EngineResult<Decimal> {
        self.total_balance()
            .await
            .map_err(|e| EngineError::Sizing(format!("{:#}", e)))
    }

    async fn place_order(&self, order: &OrderRequest) -> EngineResult<OrderConfirmation> {
        let response = self
            .submit_order(order)
            .await
            .map_err(|e| EngineError::Execution(format!("{:#}", e)))?;

        let filled_size = Decimal::from(response.size.unwrap_or_default());
        info!(
            order_id = response.id,
            symbol = %order.symbol,
            side = order.side.as_str(),
            requested = %order.size,
            size = %filled_size,
            order_type = order.order_type.as_str(),
            "Order placed"
        );

        Ok(OrderConfirmation {
            order_id: response.id.to_string(),
            status: response.state,
            filled_size,
        })
    }
}

/// hex(HMAC-SHA256(secret, method + timestamp + path + query + body))
fn sign(secret: &str, method: &str, timestamp: &str, path: &str, query: &str, body: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).context("Invalid secret key length")?;
    mac.update(method.as_bytes());
    mac.update(timestamp.as_bytes());
    mac.update(path.as_bytes());
    mac.update(query.as_bytes());
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Whole contracts in `size`, rejecting anything under one.
fn contract_size(size: Decimal) -> Result<u64> {
    size.trunc()
        .to_u64()
        .filter(|s| *s > 0)
        .ok_or_else(|| anyhow!("Order size {} is below one contract", size))
}

/// `?k=v&...`, or empty when there are no parameters.
fn encode_query(params: &[(&str, String)]) -> String {
    if params.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("?{}", pairs.join("&"))
}

fn timeframe_secs(timeframe: &str) -> Option<i64> {
    match timeframe {
        "1m" => Some(60),
        "5m" => Some(300),
        "15m" => Some(900),
        "1h" => Some(3_600),
        "4h" => Some(14_400),
        "1d" => Some(86_400),
        _ => None,
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn unwrap_result<T>(envelope: ApiResponse<T>, what: &str) -> Result<T> {
    match envelope {
        ApiResponse {
            success: true,
            result: Some(result),
            ..
        } => Ok(result),
        ApiResponse { error, .. } => bail!(
            "{} returned an error: {}",
            what,
            error.map(|e| e.to_string()).unwrap_or_else(|| "empty result".to_string())
        ),
    }
}
