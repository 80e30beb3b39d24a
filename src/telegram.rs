use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::alerts::AlertTransport;
use crate::config::AlertSettings;
use crate::error::AlertError;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct SendMessage<'a> {
    pub chat_id: &'a str,
    pub text: &'a str,
    pub parse_mode: &'a str,
    pub disable_web_page_preview: bool,
}

/// Envelope of every Bot API response
#[derive(Debug, Clone, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends alerts through the Telegram Bot API `sendMessage` method
#[derive(Clone)]
pub struct TelegramTransport {
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl fmt::Debug for TelegramTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramTransport")
            .field("api_base", &self.api_base)
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}

impl TelegramTransport {
    pub fn new(settings: &AlertSettings) -> Result<Self, AlertError> {
        if !settings.is_configured() {
            return Err(AlertError::NotConfigured);
        }

        let client = Client::builder().timeout(SEND_TIMEOUT).build()?;

        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            bot_token: settings.bot_token.clone(),
            chat_id: settings.chat_id.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

#[async_trait]
impl AlertTransport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    #[instrument(skip(self, text))]
    async fn send(&self, text: &str) -> Result<(), AlertError> {
        let message = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&message)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        let status = response.status();
        let body = response.text().await.map_err(reqwest::Error::without_url)?;
        debug!("telegram answered {status}");

        match serde_json::from_str::<ApiResponse>(&body) {
            Ok(ApiResponse { ok: true, .. }) if status.is_success() => Ok(()),
            Ok(ApiResponse { description, .. }) => Err(AlertError::Rejected(
                description.unwrap_or_else(|| format!("status {status}")),
            )),
            Err(_) => Err(AlertError::Rejected(format!("status {status}"))),
        }
    }
}
