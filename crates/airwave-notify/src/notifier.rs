use crate::message::NotifyMessage;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;

/// 单次投递结果
///
/// 传输层错误（连接失败等）走 `Err`，服务端拒绝走 `NotifyResult::failure`。
#[derive(Debug, Clone, PartialEq)]
pub struct NotifyResult {
    pub success: bool,
    pub message: String,
}

impl NotifyResult {
    pub fn success() -> Self {
        Self {
            success: true,
            message: "delivered".to_string(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// 告警投递能力
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &NotifyMessage) -> Result<NotifyResult>;

    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }
}

/// 把消息记录在内存里的通知器
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<NotifyMessage>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<NotifyMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, message: &NotifyMessage) -> Result<NotifyResult> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("memory notifier poisoned"))?
            .push(message.clone());
        Ok(NotifyResult::success())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
