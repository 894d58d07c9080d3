// Bot configuration: defaults, optional TOML file, then `SPREADBOT_*` environment

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "SPREADBOT";

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default = "default_candle_limit")]
    pub candle_limit: u32,
    /// Constant delay between polling cycles
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    /// Spread (percent) above which the high-spread profile is chosen
    #[serde(default = "default_spread_threshold_pct")]
    pub spread_threshold_pct: Decimal,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Timestamped candle snapshots kept on disk
    #[serde(default = "default_snapshot_retention")]
    pub snapshot_retention: usize,
    #[serde(default = "StrategyProfile::high_spread")]
    pub high_spread: StrategyProfile,
    #[serde(default = "StrategyProfile::low_spread")]
    pub low_spread: StrategyProfile,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub exchange: ExchangeSettings,
    #[serde(default)]
    pub telegram: TelegramSettings,
    #[serde(default)]
    pub dashboard: DashboardSettings,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            quote_asset: default_quote_asset(),
            interval: default_interval(),
            candle_limit: default_candle_limit(),
            check_interval_secs: default_check_interval_secs(),
            spread_threshold_pct: default_spread_threshold_pct(),
            data_dir: default_data_dir(),
            snapshot_retention: default_snapshot_retention(),
            high_spread: StrategyProfile::high_spread(),
            low_spread: StrategyProfile::low_spread(),
            retry: RetrySettings::default(),
            exchange: ExchangeSettings::default(),
            telegram: TelegramSettings::default(),
            dashboard: DashboardSettings::default(),
        }
    }
}

/// Order cap and sizing tiers for one strategy
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StrategyProfile {
    pub max_orders: usize,
    pub tiers: Vec<SizingTier>,
}

/// One desired order: `capital_fraction` of total capital, resting at `price`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SizingTier {
    pub capital_fraction: Decimal,
    pub price: Decimal,
}

impl StrategyProfile {
    pub fn high_spread() -> Self {
        Self {
            max_orders: 3,
            tiers: vec![
                SizingTier {
                    capital_fraction: dec!(0.5),
                    price: dec!(1.0),
                },
                SizingTier {
                    capital_fraction: dec!(1.0),
                    price: dec!(1.0),
                },
            ],
        }
    }

    pub fn low_spread() -> Self {
        Self {
            max_orders: 1,
            tiers: vec![SizingTier {
                capital_fraction: dec!(1.0),
                price: dec!(1.0),
            }],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    pub count: u32,
    pub delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            count: 3,
            delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeSettings {
    #[serde(default = "default_exchange_base_url")]
    pub base_url: String,
    /// Second gateway consulted when the primary fails
    #[serde(default)]
    pub fallback_base_url: Option<String>,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            base_url: default_exchange_base_url(),
            fallback_base_url: None,
            api_key: String::new(),
            api_secret: String::new(),
            recv_window_ms: default_recv_window_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSettings {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
    /// Cooldown applied after a rate-limit response (~4.5 hours)
    #[serde(default = "default_ban_duration_secs")]
    pub ban_duration_secs: u64,
}

impl TelegramSettings {
    /// Rate-limit cooldown, None when it does not fit a chrono duration
    pub fn ban_duration(&self) -> Option<chrono::Duration> {
        i64::try_from(self.ban_duration_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
    }
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: default_telegram_api_base(),
            ban_duration_secs: default_ban_duration_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_dashboard_bind")]
    pub bind: String,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_dashboard_bind(),
        }
    }
}

fn default_symbol() -> String {
    "USDCUSDT".to_string()
}
fn default_quote_asset() -> String {
    "USDT".to_string()
}
fn default_interval() -> String {
    "1m".to_string()
}
fn default_candle_limit() -> u32 {
    50
}
fn default_check_interval_secs() -> u64 {
    60
}
fn default_spread_threshold_pct() -> Decimal {
    dec!(0.5)
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("logs")
}
fn default_snapshot_retention() -> usize {
    1440
}
fn default_exchange_base_url() -> String {
    "https://api.mexc.com".to_string()
}
fn default_recv_window_ms() -> u64 {
    5000
}
fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}
fn default_ban_duration_secs() -> u64 {
    16514
}
fn default_true() -> bool {
    true
}
fn default_dashboard_bind() -> String {
    "0.0.0.0:5000".to_string()
}

impl BotConfig {
    /// Load configuration
    ///
    /// Sources, lowest precedence first: built-in defaults, the TOML file at
    /// `path` (optional), then environment variables such as
    /// `SPREADBOT_SYMBOL` or `SPREADBOT_EXCHANGE__API_KEY`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("spreadbot.toml"));

        let settings = config::Config::builder()
            .add_source(config::File::from(file.as_path()).required(path.is_some()))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", file.display()))?;

        let cfg: BotConfig = settings
            .try_deserialize()
            .context("Invalid bot configuration")?;
        cfg.validate()?;

        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        for (name, profile) in [("high_spread", &self.high_spread), ("low_spread", &self.low_spread)] {
            if profile.max_orders == 0 {
                anyhow::bail!("{}.max_orders must be at least 1", name);
            }
            if profile.tiers.iter().any(|t| t.price <= Decimal::ZERO) {
                anyhow::bail!("{}.tiers must all have a positive price", name);
            }
        }
        if self.check_interval_secs == 0 {
            anyhow::bail!("check_interval_secs must be at least 1");
        }
        if self.telegram.ban_duration().is_none() {
            anyhow::bail!("telegram.ban_duration_secs is out of range: {}", self.telegram.ban_duration_secs);
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Telegram credentials, when both are configured
    pub fn telegram_credentials(&self) -> Option<(&str, &str)> {
        match (&self.telegram.bot_token, &self.telegram.chat_id) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => {
                Some((token.as_str(), chat.as_str()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");

        // An explicit path must exist
        assert!(BotConfig::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
symbol = "USD1USDT"
check_interval_secs = 30

[low_spread]
max_orders = 1
tiers = [{{ capital_fraction = 0.8, price = 0.999 }}]

[telegram]
bot_token = "token"
chat_id = "42"
"#
        )
        .unwrap();

        let cfg = BotConfig::load(Some(file.path())).unwrap();

        assert_eq!(cfg.symbol, "USD1USDT");
        assert_eq!(cfg.check_interval(), Duration::from_secs(30));
        assert_eq!(cfg.low_spread.tiers[0].capital_fraction, dec!(0.8));
        assert_eq!(cfg.low_spread.tiers[0].price, dec!(0.999));
        assert_eq!(cfg.high_spread, StrategyProfile::high_spread());
        assert_eq!(cfg.spread_threshold_pct, dec!(0.5));
        assert_eq!(cfg.telegram.ban_duration_secs, 16514);
        assert_eq!(cfg.telegram_credentials(), Some(("token", "42")));
        assert_eq!(cfg.candle_limit, 50);
        assert_eq!(cfg.retry.count, RetrySettings::default().count);
    }

    #[test]
    fn test_rejects_zero_order_cap() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[high_spread]
max_orders = 0
tiers = []
"#
        )
        .unwrap();

        assert!(BotConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_ban_duration() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[telegram]
ban_duration_secs = 9223372036854775807
"#
        )
        .unwrap();

        assert!(BotConfig::load(Some(file.path())).is_err());

        let settings = TelegramSettings {
            ban_duration_secs: u64::MAX,
            ..TelegramSettings::default()
        };
        assert_eq!(settings.ban_duration(), None);
        assert_eq!(
            TelegramSettings::default().ban_duration(),
            Some(chrono::Duration::seconds(16514))
        );
    }

    #[test]
    fn test_default_profiles() {
        let high = StrategyProfile::high_spread();
        let low = StrategyProfile::low_spread();

        assert_eq!(high.max_orders, 3);
        assert_eq!(high.tiers.len(), 2);
        assert_eq!(low.max_orders, 1);
        assert_eq!(low.tiers[0].capital_fraction, dec!(1.0));
    }
}
