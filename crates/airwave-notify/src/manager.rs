use crate::config::NotifyConfig;
use crate::message::{NotifyChannel, NotifyLevel, NotifyMessage};
use crate::notifier::{Notifier, NotifyResult};
use crate::providers::{EmailNotifier, TelegramNotifier, WebhookNotifier};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// 通知管理器
///
/// 按渠道注册通知器，按最小级别过滤后广播。自身也实现 `Notifier`，
/// 采集循环只依赖 trait。
pub struct NotifyManager {
    notifiers: Arc<RwLock<HashMap<NotifyChannel, Arc<dyn Notifier>>>>,
    min_level: NotifyLevel,
}

impl NotifyManager {
    pub fn new(min_level: NotifyLevel) -> Self {
        Self {
            notifiers: Arc::new(RwLock::new(HashMap::new())),
            min_level,
        }
    }

    /// 根据 `[notify]` 配置注册全部渠道
    pub async fn from_config(config: &NotifyConfig) -> Self {
        let manager = Self::new(config.min_level);

        if let Some(telegram) = &config.telegram {
            manager
                .register(NotifyChannel::Telegram, Arc::new(TelegramNotifier::new(telegram.clone())))
                .await;
        }
        if let Some(webhook) = &config.webhook {
            manager
                .register(NotifyChannel::Webhook, Arc::new(WebhookNotifier::new(webhook.clone())))
                .await;
        }
        if let Some(email) = &config.email {
            manager
                .register(NotifyChannel::Email, Arc::new(EmailNotifier::new(email.clone())))
                .await;
        }

        if !config.has_providers() {
            warn!("No notification provider configured, alerts will only be logged");
        }

        manager
    }

    pub async fn register(&self, channel: NotifyChannel, notifier: Arc<dyn Notifier>) {
        let mut notifiers = self.notifiers.write().await;
        info!(notifier = notifier.name(), "Registered notifier");
        notifiers.insert(channel, notifier);
    }

    pub async fn channel_count(&self) -> usize {
        self.notifiers.read().await.len()
    }

    /// 发送到指定渠道
    pub async fn send_to(&self, channel: NotifyChannel, message: &NotifyMessage) -> Result<NotifyResult> {
        if !self.should_notify(message.level) {
            return Ok(NotifyResult::failure("below minimum level"));
        }

        let notifier = self.notifiers.read().await.get(&channel).cloned();
        match notifier {
            Some(notifier) if notifier.is_enabled() => Ok(deliver(notifier.as_ref(), message).await),
            _ => Ok(NotifyResult::failure(format!("channel {:?} not registered", channel))),
        }
    }

    /// 广播到全部渠道，任一渠道成功即视为成功
    pub async fn broadcast(&self, message: &NotifyMessage) -> Result<NotifyResult> {
        if !self.should_notify(message.level) {
            return Ok(NotifyResult::failure("below minimum level"));
        }

        let notifiers: Vec<Arc<dyn Notifier>> =
            self.notifiers.read().await.values().cloned().collect();

        if notifiers.is_empty() {
            warn!(title = %message.title, content = %message.content, "Alert not delivered, no notifier registered");
            return Ok(NotifyResult::failure("no notifier registered"));
        }

        let mut delivered = 0usize;
        for notifier in notifiers.iter().filter(|n| n.is_enabled()) {
            if deliver(notifier.as_ref(), message).await.success {
                delivered += 1;
            }
        }

        if delivered > 0 {
            Ok(NotifyResult::success())
        } else {
            Ok(NotifyResult::failure("all notifiers failed"))
        }
    }

    fn should_notify(&self, level: NotifyLevel) -> bool {
        level >= self.min_level
    }
}

async fn deliver(notifier: &dyn Notifier, message: &NotifyMessage) -> NotifyResult {
    match notifier.send(message).await {
        Ok(result) => {
            if result.success {
                info!(notifier = notifier.name(), title = %message.title, "Notification sent");
            } else {
                error!(notifier = notifier.name(), reason = %result.message, "Notification failed");
            }
            result
        }
        Err(e) => {
            error!(notifier = notifier.name(), error = %e, "Notification error");
            NotifyResult::failure(e.to_string())
        }
    }
}

impl Default for NotifyManager {
    fn default() -> Self {
        Self::new(NotifyLevel::Info)
    }
}

#[async_trait]
impl Notifier for NotifyManager {
    async fn send(&self, message: &NotifyMessage) -> Result<NotifyResult> {
        self.broadcast(message).await
    }

    fn name(&self) -> &str {
        "manager"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::MemoryNotifier;

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, _message: &NotifyMessage) -> Result<NotifyResult> {
            anyhow::bail!("connection refused")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_min_level_filter() {
        let manager = NotifyManager::new(NotifyLevel::Warning);
        let memory = Arc::new(MemoryNotifier::new());
        manager.register(NotifyChannel::Memory, memory.clone()).await;

        let result = manager.broadcast(&NotifyMessage::info("Info", "ignored")).await.unwrap();
        assert!(!result.success);
        assert_eq!(memory.count(), 0);

        let result = manager.broadcast(&NotifyMessage::warning("Warn", "sent")).await.unwrap();
        assert!(result.success);
        assert_eq!(memory.count(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_survives_failing_channel() {
        let manager = NotifyManager::default();
        let memory = Arc::new(MemoryNotifier::new());
        manager.register(NotifyChannel::Webhook, Arc::new(FailingNotifier)).await;
        manager.register(NotifyChannel::Memory, memory.clone()).await;

        let result = manager.send(&NotifyMessage::error("Stale", "no data")).await.unwrap();
        assert!(result.success);
        assert_eq!(memory.messages()[0].title, "Stale");
    }

    #[tokio::test]
    async fn test_send_to_unregistered_channel() {
        let manager = NotifyManager::default();
        let result = manager
            .send_to(NotifyChannel::Telegram, &NotifyMessage::error("x", "y"))
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_from_config_registers_providers() {
        let config: NotifyConfig = toml::from_str(
            r#"
[telegram]
bot_token = "t"
chat_id = "c"

[webhook]
url = "http://localhost:9/hook"
"#,
        )
        .unwrap();

        let manager = NotifyManager::from_config(&config).await;
        assert_eq!(manager.channel_count().await, 2);
    }
}
