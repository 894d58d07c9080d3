use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Free balance per asset symbol
pub type Balances = HashMap<String, Decimal>;

/// OHLCV candlestick for one exchange interval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub open_time: i64, // ms epoch
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: i64, // ms epoch
    pub symbol: String,
}

impl Candle {
    /// True when the candle closed at or above its open
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }
}

/// Check that candles are strictly increasing by `open_time`
pub fn validate_candle_order(candles: &[Candle]) -> anyhow::Result<()> {
    for window in candles.windows(2) {
        if window[1].open_time <= window[0].open_time {
            anyhow::bail!(
                "Candles are not strictly increasing: {} followed by {}",
                window[0].open_time,
                window[1].open_time
            );
        }
    }
    Ok(())
}

/// Order side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Exchange wire representation
    pub fn as_exchange_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Resting order live on the exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenOrder {
    #[serde(deserialize_with = "string_or_number")]
    pub order_id: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
}

impl OpenOrder {
    /// Capital committed by this order (quantity * price), None on overflow
    pub fn notional(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.price)
    }
}

/// Order a reconciler wants resting on the book
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredOrder {
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
}

/// Accept order ids as either JSON strings or integers
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Int(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Int(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle_at(open_time: i64) -> Candle {
        Candle {
            open_time,
            open: dec!(1),
            high: dec!(1),
            low: dec!(1),
            close: dec!(1),
            volume: dec!(0),
            close_time: open_time + 59_999,
            symbol: "USDCUSDT".to_string(),
        }
    }

    #[test]
    fn test_validate_candle_order() {
        assert!(validate_candle_order(&[]).is_ok());
        assert!(validate_candle_order(&[candle_at(0), candle_at(60_000)]).is_ok());
        assert!(validate_candle_order(&[candle_at(60_000), candle_at(60_000)]).is_err());
        assert!(validate_candle_order(&[candle_at(60_000), candle_at(0)]).is_err());
    }

    #[test]
    fn test_open_order_notional() {
        let order = OpenOrder {
            order_id: "1".to_string(),
            side: Side::Buy,
            quantity: dec!(50),
            price: dec!(1.0),
        };

        assert_eq!(order.notional(), Some(dec!(50)));

        let huge = OpenOrder {
            quantity: Decimal::MAX,
            price: dec!(2),
            ..order
        };
        assert_eq!(huge.notional(), None);
    }

    #[test]
    fn test_order_id_accepts_integers() {
        let json = r#"{"order_id": 12345, "side": "buy", "quantity": "10", "price": "1.0"}"#;
        let order: OpenOrder = serde_json::from_str(json).unwrap();

        assert_eq!(order.order_id, "12345");
        assert_eq!(order.side, Side::Buy);
    }

    #[test]
    fn test_side_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Side::Sell).unwrap(), "\"sell\"");
        assert_eq!(Side::Buy.as_exchange_str(), "BUY");
    }
}
