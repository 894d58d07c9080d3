use crate::api::{ExchangeGateway, GatewayError};
use crate::models::{Balances, Candle, OpenOrder, Side};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Starting point for simulated order ids
static PAPER_ORDER_ID: AtomicU64 = AtomicU64::new(1_000_000);

/// In-memory exchange account for paper trading
///
/// Buy orders lock `quantity * price` of the quote asset until cancelled.
/// Resting orders never fill. Candles come from an optional live market
/// gateway, otherwise from whatever was loaded with `set_candles`.
pub struct PaperExchange {
    quote_asset: String,
    market: Option<Arc<dyn ExchangeGateway>>,
    state: Mutex<PaperState>,
}

#[derive(Default)]
struct PaperState {
    balances: Balances,
    orders: Vec<OpenOrder>,
    candles: Vec<Candle>,
    placed: usize,
    cancelled: usize,
}

impl PaperExchange {
    pub fn new(quote_asset: impl Into<String>, initial_quote: Decimal) -> Self {
        let quote_asset = quote_asset.into();
        let mut state = PaperState::default();
        state.balances.insert(quote_asset.clone(), initial_quote);

        Self {
            quote_asset,
            market: None,
            state: Mutex::new(state),
        }
    }

    /// Serve candles from a live gateway instead of the local set
    pub fn with_market(mut self, market: Arc<dyn ExchangeGateway>) -> Self {
        self.market = Some(market);
        self
    }

    fn state(&self) -> MutexGuard<'_, PaperState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_candles(&self, candles: Vec<Candle>) {
        self.state().candles = candles;
    }

    /// Insert a resting order without touching balances
    pub fn seed_order(&self, order: OpenOrder) {
        self.state().orders.push(order);
    }

    pub fn free_balance(&self) -> Decimal {
        self.state()
            .balances
            .get(&self.quote_asset)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn open_orders(&self) -> Vec<OpenOrder> {
        self.state().orders.clone()
    }

    /// Number of successful placements since creation
    pub fn placed_count(&self) -> usize {
        self.state().placed
    }

    /// Number of successful cancellations since creation
    pub fn cancelled_count(&self) -> usize {
        self.state().cancelled
    }
}

#[async_trait]
impl ExchangeGateway for PaperExchange {
    fn name(&self) -> &str {
        "paper"
    }

    async fn fetch_candles(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>, GatewayError> {
        if let Some(market) = &self.market {
            return market.fetch_candles(symbol, interval, limit).await;
        }

        let state = self.state();
        let skip = state.candles.len().saturating_sub(limit as usize);
        Ok(state.candles.iter().skip(skip).cloned().collect())
    }

    async fn fetch_balances(&self) -> Result<Balances, GatewayError> {
        Ok(self.state().balances.clone())
    }

    async fn fetch_open_orders(&self, _symbol: &str) -> Result<Vec<OpenOrder>, GatewayError> {
        Ok(self.open_orders())
    }

    async fn place_order(
        &self,
        _symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<String, GatewayError> {
        let mut state = self.state();

        if side == Side::Buy {
            let cost = quantity
                .checked_mul(price)
                .ok_or_else(|| GatewayError::Decode(format!("order notional overflows: {} @ {}", quantity, price)))?;
            let free = state
                .balances
                .entry(self.quote_asset.clone())
                .or_insert(Decimal::ZERO);
            if cost > *free {
                return Err(GatewayError::Api {
                    code: 30004,
                    msg: "Insufficient balance".to_string(),
                });
            }
            *free -= cost;
        }

        let order_id = PAPER_ORDER_ID.fetch_add(1, Ordering::Relaxed).to_string();
        state.orders.push(OpenOrder {
            order_id: order_id.clone(),
            side,
            quantity,
            price,
        });
        state.placed += 1;

        tracing::debug!("Paper order {} {} {} @ {}", order_id, side, quantity, price);
        Ok(order_id)
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> Result<(), GatewayError> {
        let mut state = self.state();

        let idx = state
            .orders
            .iter()
            .position(|o| o.order_id == order_id)
            .ok_or_else(|| GatewayError::UnknownOrder(order_id.to_string()))?;
        let refund = match state.orders[idx].side {
            Side::Buy => state.orders[idx]
                .notional()
                .ok_or_else(|| GatewayError::Decode(format!("order {} notional overflows", order_id)))?,
            Side::Sell => Decimal::ZERO,
        };
        state.orders.remove(idx);

        let free = state
            .balances
            .entry(self.quote_asset.clone())
            .or_insert(Decimal::ZERO);
        *free = free.saturating_add(refund);
        state.cancelled += 1;

        Ok(())
    }
}

/// One-minute candle with open == high == low == close
#[cfg(test)]
pub(crate) fn flat_candle(symbol: &str, index: i64, price: Decimal) -> Candle {
    Candle {
        open_time: index * 60_000,
        open: price,
        high: price,
        low: price,
        close: price,
        volume: Decimal::ONE,
        close_time: index * 60_000 + 59_999,
        symbol: symbol.to_string(),
    }
}
