//! Dry-run adapter: live market data, simulated orders and balance.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

use crate::error::EngineResult;
use crate::trading::{ExecutionAdapter, OrderConfirmation, OrderRequest, Ticker};

/// Wraps a real adapter for reads and fills every order locally.
pub struct PaperExchange {
    inner: Arc<dyn ExecutionAdapter>,
    balance: Decimal,
}

impl PaperExchange {
    pub fn new(inner: Arc<dyn ExecutionAdapter>, balance: Decimal) -> Self {
        Self { inner, balance }
    }
}

#[async_trait]
impl ExecutionAdapter for PaperExchange {
    async fn get_current_price(&self, symbol: &str) -> EngineResult<Decimal> {
        self.inner.get_current_price(symbol).await
    }

    async fn get_ticker(&self, symbol: &str) -> EngineResult<Ticker> {
        self.inner.get_ticker(symbol).await
    }

    async fn get_historical_closes(
        &self,
        symbol: &str,
        timeframe: &str,
        min_points: usize,
    ) -> EngineResult<Vec<Decimal>> {
        self.inner
            .get_historical_closes(symbol, timeframe, min_points)
            .await
    }

    async fn get_account_balance(&self) -> EngineResult<Decimal> {
        Ok(self.balance)
    }

    async fn place_order(&self, order: &OrderRequest) -> EngineResult<OrderConfirmation> {
        let order_id = format!("paper-{}", uuid::Uuid::new_v4());

        info!(
            order_id = %order_id,
            symbol = %order.symbol,
            side = order.side.as_str(),
            size = %order.size,
            order_type = order.order_type.as_str(),
            price = ?order.price,
            "[DRY RUN] Would place order"
        );

        Ok(OrderConfirmation {
            order_id,
            status: "filled".to_string(),
            filled_size: order.size,
        })
    }
}
