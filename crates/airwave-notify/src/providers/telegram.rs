use crate::message::NotifyMessage;
use crate::notifier::{Notifier, NotifyResult};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Telegram Bot 配置
///
/// `bot_token` / `chat_id` 一般通过环境变量 `AIRWAVE__NOTIFY__TELEGRAM__BOT_TOKEN` 注入。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

pub struct TelegramNotifier {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }

    fn build_payload(&self, message: &NotifyMessage) -> serde_json::Value {
        serde_json::json!({
            "chat_id": self.config.chat_id,
            "parse_mode": "Markdown",
            "text": format!("*{}*\n{}", message.title, message.content),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &NotifyMessage) -> Result<NotifyResult> {
        let response = self
            .client
            .post(self.endpoint())
            .json(&self.build_payload(message))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(NotifyResult::success())
        } else {
            let body = response.text().await.unwrap_or_default();
            Ok(NotifyResult::failure(format!(
                "Telegram failed with status {}: {}",
                status, body
            )))
        }
    }

    fn name(&self) -> &str {
        "telegram"
    }
}
