use serde::Deserialize;
use thiserror::Error;

/// MEXC error code for cancelling an order the exchange no longer knows
pub const UNKNOWN_ORDER_CODE: i64 = -2011;

/// Failure of a single gateway call
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("exchange error {code}: {msg}")]
    Api { code: i64, msg: String },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("unknown order {0}")]
    UnknownOrder(String),

    #[error("malformed payload: {0}")]
    Decode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing API credentials")]
    MissingCredentials,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    #[serde(default)]
    msg: String,
}

impl GatewayError {
    /// Classify a non-success HTTP response
    pub fn from_response(status: u16, body: &str) -> Self {
        if status == 429 {
            return GatewayError::RateLimited(body.to_string());
        }

        match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(parsed) if parsed.code == UNKNOWN_ORDER_CODE => GatewayError::UnknownOrder(parsed.msg),
            Ok(parsed) => GatewayError::Api {
                code: parsed.code,
                msg: parsed.msg,
            },
            Err(_) => GatewayError::Status {
                status,
                body: body.to_string(),
            },
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GatewayError::RateLimited(_))
    }

    pub fn is_unknown_order(&self) -> bool {
        matches!(self, GatewayError::UnknownOrder(_))
    }
}
