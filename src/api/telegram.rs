use super::GatewayError;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::json;
use std::path::Path;
use std::time::Duration;

/// Client for the Telegram Bot API (one bot, one chat)
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramClient {
    pub fn new(
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// POST /bot{token}/sendMessage
    pub async fn send_message(&self, text: &str) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await?;

        check_response(response).await
    }

    /// POST /bot{token}/sendDocument (multipart upload of a local file)
    pub async fn send_document(&self, path: &Path, caption: &str) -> Result<(), GatewayError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "chart".to_string());

        let part = Part::bytes(bytes).file_name(file_name).mime_str(mime_for(path))?;
        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .part("document", part);

        let response = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?;

        check_response(response).await
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

async fn check_response(response: reqwest::Response) -> Result<(), GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    if is_flood_signal(status.as_u16(), &body) {
        return Err(GatewayError::RateLimited(body));
    }

    Err(GatewayError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Telegram signals flood control with 429 and a "retry after" description
fn is_flood_signal(status: u16, body: &str) -> bool {
    status == 429 || body.contains("Flood control exceeded") || body.contains("Too Many Requests")
}
