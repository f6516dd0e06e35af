use crate::message::NotifyLevel;
use crate::providers::{EmailConfig, TelegramConfig, WebhookConfig};
use serde::{Deserialize, Serialize};

/// `[notify]` 配置段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// 低于此级别的消息不投递
    #[serde(default)]
    pub min_level: NotifyLevel,

    #[serde(default)]
    pub telegram: Option<TelegramConfig>,

    #[serde(default)]
    pub webhook: Option<WebhookConfig>,

    #[serde(default)]
    pub email: Option<EmailConfig>,
}

impl NotifyConfig {
    pub fn has_providers(&self) -> bool {
        self.telegram.is_some() || self.webhook.is_some() || self.email.is_some()
    }
}
