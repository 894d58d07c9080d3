pub mod error;
pub mod mexc;
pub mod telegram;

pub use error::GatewayError;
pub use mexc::MexcClient;
pub use telegram::TelegramClient;

use crate::models::{Balances, Candle, OpenOrder, Side};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Raw exchange connectivity; every call may fail
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, GatewayError>;

    async fn fetch_balances(&self) -> Result<Balances, GatewayError>;

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, GatewayError>;

    async fn place_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<String, GatewayError>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), GatewayError>;
}

/// Best-effort account operations seen by the reconciler
///
/// Failures never surface here: they degrade to zero balance, no orders,
/// `None` or `false` and are logged by the implementation.
#[async_trait]
pub trait AccountGateway: Send + Sync {
    async fn fetch_free_balance(&self, asset: &str) -> Decimal;

    async fn fetch_open_orders(&self, symbol: &str) -> Vec<OpenOrder>;

    async fn place_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Option<String>;

    /// True also when the exchange reports the order is already gone
    async fn cancel_order(&self, symbol: &str, order_id: &str) -> bool;
}
