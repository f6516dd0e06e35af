use crate::message::NotifyMessage;
use crate::notifier::{Notifier, NotifyResult};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// 通用 Webhook（告警转发到自建服务）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,

    /// 附加请求头，例如鉴权 token
    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

pub struct WebhookNotifier {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    fn payload(message: &NotifyMessage) -> Value {
        json!({
            "level": message.level,
            "title": message.title,
            "text": message.render_plain(),
            "channel": message.source,
            "timestamp": message.timestamp.timestamp(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &NotifyMessage) -> Result<NotifyResult> {
        let request = self
            .config
            .headers
            .iter()
            .fold(self.client.post(&self.config.url), |req, (k, v)| req.header(k, v));

        let response = request.json(&Self::payload(message)).send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(url = %self.config.url, "Webhook delivered");
            return Ok(NotifyResult::success());
        }

        let body = response.text().await.unwrap_or_default();
        Ok(NotifyResult::failure(format!("webhook returned {}: {}", status, body.trim())))
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
