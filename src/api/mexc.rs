use super::{ExchangeGateway, GatewayError};
use crate::models::{string_or_number, Balances, Candle, OpenOrder, Side};
use async_trait::async_trait;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

// MEXC Spot API v3
// Docs: https://mexcdevelop.github.io/apidocs/spot_v3_en/
const REQUESTS_PER_SECOND: u32 = 10;
const REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RECV_WINDOW_MS: u64 = 5000;

type HmacSha256 = Hmac<Sha256>;

type MexcRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// REST client for the MEXC spot exchange
///
/// Market data is public; account and order endpoints are signed with
/// HMAC-SHA256 over the query string. Clones share one rate limiter.
#[derive(Clone)]
pub struct MexcClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    recv_window_ms: u64,
    rate_limiter: Arc<MexcRateLimiter>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balances: Vec<BalanceEntry>,
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    asset: String,
    free: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderEntry {
    #[serde(deserialize_with = "string_or_number")]
    order_id: String,
    price: Decimal,
    orig_qty: Decimal,
    side: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewOrderResponse {
    #[serde(deserialize_with = "string_or_number")]
    order_id: String,
}

impl MexcClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let per_second = NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            recv_window_ms: DEFAULT_RECV_WINDOW_MS,
            rate_limiter,
        })
    }

    pub fn with_recv_window(mut self, recv_window_ms: u64) -> Self {
        self.recv_window_ms = recv_window_ms;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Append timestamp, recvWindow and signature to a query string
    fn signed_query(&self, params: &[(&str, String)]) -> Result<String, GatewayError> {
        if self.api_key.is_empty() || self.api_secret.is_empty() {
            return Err(GatewayError::MissingCredentials);
        }

        let mut query = encode_query(params);
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!(
            "recvWindow={}&timestamp={}",
            self.recv_window_ms,
            Utc::now().timestamp_millis()
        ));

        let signature = sign_payload(&self.api_secret, &query)?;
        Ok(format!("{}&signature={}", query, signature))
    }

    async fn send(&self, method: Method, path: &str, query: &str, signed: bool) -> Result<String, GatewayError> {
        self.rate_limiter.until_ready().await;

        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };

        let mut request = self.client.request(method.clone(), &url);
        if signed {
            request = request
                .header("X-MEXC-APIKEY", &self.api_key)
                .header(reqwest::header::CONTENT_TYPE, "application/json");
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::debug!("MEXC {} {} -> {}: {}", method, path, status, body);
            return Err(GatewayError::from_response(status.as_u16(), &body));
        }

        Ok(body)
    }

    async fn get_public<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T, GatewayError> {
        let body = self.send(Method::GET, path, &encode_query(params), false).await?;
        decode(&body)
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        let query = self.signed_query(params)?;
        let body = self.send(method, path, &query, true).await?;
        decode(&body)
    }
}

#[async_trait]
impl ExchangeGateway for MexcClient {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn fetch_candles(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>, GatewayError> {
        let rows: Vec<Vec<Value>> = self
            .get_public(
                "/api/v3/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        rows.iter().map(|row| parse_kline(row, symbol)).collect()
    }

    async fn fetch_balances(&self) -> Result<Balances, GatewayError> {
        let account: AccountResponse = self.signed(Method::GET, "/api/v3/account", &[]).await?;

        Ok(account
            .balances
            .into_iter()
            .filter(|b| b.free > Decimal::ZERO)
            .map(|b| (b.asset, b.free))
            .collect())
    }

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, GatewayError> {
        let orders: Vec<OrderEntry> = self
            .signed(Method::GET, "/api/v3/openOrders", &[("symbol", symbol.to_string())])
            .await?;

        Ok(orders
            .into_iter()
            .map(|o| OpenOrder {
                order_id: o.order_id,
                side: if o.side.eq_ignore_ascii_case("BUY") {
                    Side::Buy
                } else {
                    Side::Sell
                },
                quantity: o.orig_qty,
                price: o.price,
            })
            .collect())
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<String, GatewayError> {
        let response: NewOrderResponse = self
            .signed(
                Method::POST,
                "/api/v3/order",
                &[
                    ("symbol", symbol.to_string()),
                    ("side", side.as_exchange_str().to_string()),
                    ("type", "LIMIT".to_string()),
                    ("quantity", quantity.normalize().to_string()),
                    ("price", price.normalize().to_string()),
                ],
            )
            .await?;

        Ok(response.order_id)
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), GatewayError> {
        let _: Value = self
            .signed(
                Method::DELETE,
                "/api/v3/order",
                &[("symbol", symbol.to_string()), ("orderId", order_id.to_string())],
            )
            .await?;

        Ok(())
    }
}

fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Hex-encoded HMAC-SHA256 of `payload`
pub(crate) fn sign_payload(secret: &str, payload: &str) -> Result<String, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::Decode(format!("invalid API secret: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, GatewayError> {
    serde_json::from_str(body).map_err(|e| GatewayError::Decode(e.to_string()))
}

/// `[openTime, open, high, low, close, volume, closeTime, quoteVolume]`
fn parse_kline(row: &[Value], symbol: &str) -> Result<Candle, GatewayError> {
    Ok(Candle {
        open_time: int_field(row, 0)?,
        open: decimal_field(row, 1)?,
        high: decimal_field(row, 2)?,
        low: decimal_field(row, 3)?,
        close: decimal_field(row, 4)?,
        volume: decimal_field(row, 5)?,
        close_time: int_field(row, 6)?,
        symbol: symbol.to_string(),
    })
}

fn int_field(row: &[Value], idx: usize) -> Result<i64, GatewayError> {
    match row.get(idx) {
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| GatewayError::Decode(format!("kline field {} is not an integer", idx))),
        Some(Value::String(s)) => s
            .parse()
            .map_err(|_| GatewayError::Decode(format!("kline field {} is not an integer", idx))),
        _ => Err(GatewayError::Decode(format!("kline field {} missing", idx))),
    }
}

fn decimal_field(row: &[Value], idx: usize) -> Result<Decimal, GatewayError> {
    let raw = match row.get(idx) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(GatewayError::Decode(format!("kline field {} missing", idx))),
    };

    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|_| GatewayError::Decode(format!("kline field {} is not numeric: {}", idx, raw)))
}
