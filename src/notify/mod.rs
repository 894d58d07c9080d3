// Best-effort Telegram notifications behind a rate-limit gate

use crate::api::{GatewayError, TelegramClient};
use crate::config::{BotConfig, TelegramSettings};
use crate::persistence::{read_json, write_json_atomic};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Whether notifications may be sent right now
///
/// Owned by the driver and replaced by value after a rate-limit signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationGate {
    pub banned_until: Option<DateTime<Utc>>,
}

impl NotificationGate {
    pub fn open() -> Self {
        Self::default()
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        match self.banned_until {
            Some(until) => now >= until,
            None => true,
        }
    }

    /// Gate closed until `now + ban`
    pub fn after_rate_limit(self, now: DateTime<Utc>, ban: Duration) -> Self {
        Self {
            banned_until: Some(now + ban),
        }
    }

    /// Read a persisted gate; missing or unreadable files mean open
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::open();
        }
        match read_json(path) {
            Ok(gate) => gate,
            Err(e) => {
                tracing::warn!("Ignoring unreadable notification gate {}: {}", path.display(), e);
                Self::open()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }
}

/// Sends text and chart files to the configured chat
///
/// Without Telegram credentials every call is a no-op that returns the gate
/// unchanged.
pub struct Notifier {
    client: Option<TelegramClient>,
    ban: Duration,
}

impl Notifier {
    pub fn new(client: Option<TelegramClient>, ban: Duration) -> Self {
        Self { client, ban }
    }

    pub fn from_config(cfg: &BotConfig) -> Result<Self> {
        let client = match cfg.telegram_credentials() {
            Some((token, chat_id)) => Some(TelegramClient::new(&cfg.telegram.api_base, token, chat_id)?),
            None => {
                tracing::info!("Telegram not configured, notifications disabled");
                None
            }
        };

        let ban = cfg.telegram.ban_duration().unwrap_or_else(|| {
            tracing::warn!(
                "Telegram ban duration {}s out of range, using default",
                cfg.telegram.ban_duration_secs
            );
            TelegramSettings::default().ban_duration().unwrap_or_else(Duration::zero)
        });

        Ok(Self::new(client, ban))
    }

    pub fn disabled() -> Self {
        Self::new(None, Duration::zero())
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    pub async fn notify_text(&self, gate: NotificationGate, text: &str) -> NotificationGate {
        let Some(client) = self.ready(&gate) else {
            return gate;
        };
        let result = client.send_message(text).await;
        self.after_send(gate, "Message", result)
    }

    pub async fn notify_document(&self, gate: NotificationGate, path: &Path, caption: &str) -> NotificationGate {
        let Some(client) = self.ready(&gate) else {
            return gate;
        };
        let result = client.send_document(path, caption).await;
        self.after_send(gate, "Chart", result)
    }

    fn ready(&self, gate: &NotificationGate) -> Option<&TelegramClient> {
        let client = self.client.as_ref()?;
        if !gate.is_open(Utc::now()) {
            if let Some(until) = gate.banned_until {
                tracing::info!("Telegram banned until {}, skipping notification", until);
            }
            return None;
        }
        Some(client)
    }

    fn after_send(
        &self,
        gate: NotificationGate,
        what: &str,
        result: std::result::Result<(), GatewayError>,
    ) -> NotificationGate {
        match result {
            Ok(()) => {
                tracing::info!("{} sent to Telegram", what);
                gate
            }
            Err(e) if e.is_rate_limited() => {
                let gate = gate.after_rate_limit(Utc::now(), self.ban);
                if let Some(until) = gate.banned_until {
                    tracing::warn!("Telegram ban until {}", until);
                }
                tracing::error!("Telegram {} error: {}", what.to_lowercase(), e);
                gate
            }
            Err(e) => {
                tracing::error!("Telegram {} error: {}", what.to_lowercase(), e);
                gate
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn notifier(url: &str) -> Notifier {
        let client = TelegramClient::new(url, "TOKEN", "42").unwrap();
        Notifier::new(Some(client), Duration::seconds(16514))
    }

    #[test]
    fn test_gate_window() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let gate = NotificationGate::open().after_rate_limit(now, Duration::seconds(16514));

        assert!(NotificationGate::open().is_open(now));
        assert!(!gate.is_open(now));
        assert!(!gate.is_open(now + Duration::seconds(16513)));
        assert!(gate.is_open(now + Duration::seconds(16514)));
    }

    #[test]
    fn test_gate_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notification_gate.json");
        assert_eq!(NotificationGate::load(&path), NotificationGate::open());

        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let gate = NotificationGate::open().after_rate_limit(now, Duration::hours(1));
        gate.save(&path).unwrap();
        assert_eq!(NotificationGate::load(&path), gate);

        std::fs::write(&path, b"{broken").unwrap();
        assert_eq!(NotificationGate::load(&path), NotificationGate::open());
    }

    #[tokio::test]
    async fn test_rate_limit_closes_gate() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/botTOKEN/sendMessage")
            .with_status(429)
            .with_body(r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 30"}"#)
            .create_async()
            .await;

        let gate = notifier(&server.url())
            .notify_text(NotificationGate::open(), "hello")
            .await;

        assert!(!gate.is_open(Utc::now()));
        let until = gate.banned_until.unwrap();
        assert!(until > Utc::now() + Duration::seconds(16000));
    }

    #[tokio::test]
    async fn test_closed_gate_sends_nothing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .expect(0)
            .create_async()
            .await;

        let closed = NotificationGate::open().after_rate_limit(Utc::now(), Duration::hours(1));
        let gate = notifier(&server.url()).notify_text(closed, "hello").await;

        assert_eq!(gate, closed);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_other_failures_keep_gate_open() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/botTOKEN/sendMessage")
            .with_status(400)
            .with_body(r#"{"ok":false,"description":"Bad Request: chat not found"}"#)
            .create_async()
            .await;

        let gate = notifier(&server.url())
            .notify_text(NotificationGate::open(), "hello")
            .await;

        assert_eq!(gate, NotificationGate::open());
    }

    #[test]
    fn test_out_of_range_ban_uses_default() {
        let mut cfg = BotConfig::default();
        cfg.telegram.ban_duration_secs = u64::MAX;

        let notifier = Notifier::from_config(&cfg).unwrap();

        assert!(!notifier.is_configured());
        assert_eq!(notifier.ban, Duration::seconds(16514));
    }

    #[tokio::test]
    async fn test_unconfigured_is_noop() {
        let gate = Notifier::disabled()
            .notify_text(NotificationGate::open(), "hello")
            .await;

        assert_eq!(gate, NotificationGate::open());
        assert!(!Notifier::disabled().is_configured());
    }
}
