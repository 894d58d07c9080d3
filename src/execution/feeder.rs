use super::RetryPolicy;
use crate::api::{AccountGateway, ExchangeGateway, GatewayError};
use crate::models::{validate_candle_order, Balances, Candle, OpenOrder, Side};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;

/// Exchange access with primary/fallback precedence
///
/// Every call goes to the primary gateway first and only reaches the
/// fallback when the primary fails. Read calls (candles, balances, open
/// orders) are retried with the fixed-delay policy on each gateway; order
/// placement and cancellation are attempted once per gateway.
#[derive(Clone)]
pub struct Feeder {
    primary: Arc<dyn ExchangeGateway>,
    fallback: Option<Arc<dyn ExchangeGateway>>,
    retry: RetryPolicy,
}

impl Feeder {
    pub fn new(primary: Arc<dyn ExchangeGateway>) -> Self {
        Self {
            primary,
            fallback: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn ExchangeGateway>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn gateways(&self) -> Vec<Arc<dyn ExchangeGateway>> {
        let mut gateways = vec![self.primary.clone()];
        if let Some(fallback) = &self.fallback {
            gateways.push(fallback.clone());
        }
        gateways
    }

    /// Try each gateway in precedence order, returning the first success
    async fn first_success<T, F, Fut>(
        &self,
        operation: &str,
        retry: &RetryPolicy,
        mut call: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut(Arc<dyn ExchangeGateway>) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut last_error = None;

        for gateway in self.gateways() {
            match retry.run(operation, || call(gateway.clone())).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_unknown_order() => return Err(e),
                Err(e) => {
                    tracing::warn!("{} via {} failed: {}", operation, gateway.name(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| GatewayError::Decode(format!("{}: no gateway configured", operation))))
    }

    /// Latest `limit` candles, oldest first
    pub async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, GatewayError> {
        let candles = self
            .first_success("fetch candles", &self.retry, |g| async move {
                g.fetch_candles(symbol, interval, limit).await
            })
            .await?;

        validate_candle_order(&candles).map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(candles)
    }

    /// All free balances; empty when every gateway fails
    pub async fn fetch_balances(&self) -> Balances {
        match self
            .first_success("fetch balances", &self.retry, |g| async move { g.fetch_balances().await })
            .await
        {
            Ok(balances) => balances,
            Err(e) => {
                tracing::error!("Balance fetch failed: {}", e);
                Balances::new()
            }
        }
    }
}

#[async_trait]
impl AccountGateway for Feeder {
    async fn fetch_free_balance(&self, asset: &str) -> Decimal {
        self.fetch_balances()
            .await
            .get(asset)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    async fn fetch_open_orders(&self, symbol: &str) -> Vec<OpenOrder> {
        match self
            .first_success("fetch open orders", &self.retry, |g| async move {
                g.fetch_open_orders(symbol).await
            })
            .await
        {
            Ok(orders) => orders,
            Err(e) => {
                tracing::error!("Open order query for {} failed: {}", symbol, e);
                Vec::new()
            }
        }
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Option<String> {
        match self
            .first_success("place order", &RetryPolicy::none(), |g| async move {
                g.place_order(symbol, side, quantity, price).await
            })
            .await
        {
            Ok(order_id) => Some(order_id),
            Err(e) => {
                tracing::error!("Order {} {} @ {} failed: {}", side, quantity, price, e);
                None
            }
        }
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> bool {
        match self
            .first_success("cancel order", &RetryPolicy::none(), |g| async move {
                g.cancel_order(symbol, order_id).await
            })
            .await
        {
            Ok(()) => true,
            Err(e) if e.is_unknown_order() => {
                tracing::info!("Order {} already canceled", order_id);
                true
            }
            Err(e) => {
                tracing::error!("Cancel of order {} failed: {}", order_id, e);
                false
            }
        }
    }
}
