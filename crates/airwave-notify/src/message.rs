use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 通知级别，按严重程度递增排序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl Default for NotifyLevel {
    fn default() -> Self {
        NotifyLevel::Warning
    }
}

impl fmt::Display for NotifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotifyLevel::Info => "INFO",
            NotifyLevel::Warning => "WARNING",
            NotifyLevel::Error => "ERROR",
            NotifyLevel::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// 通知渠道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyChannel {
    Telegram,
    Webhook,
    Email,
    /// 进程内记录（测试、演练）
    Memory,
}

/// 告警消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyMessage {
    pub title: String,

    /// 正文，Telegram 按 Markdown 渲染
    pub content: String,

    pub level: NotifyLevel,

    pub timestamp: DateTime<Utc>,

    /// 来源频道（电台）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl NotifyMessage {
    pub fn new(title: impl Into<String>, content: impl Into<String>, level: NotifyLevel) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            level,
            timestamp: Utc::now(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn info(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(title, content, NotifyLevel::Info)
    }

    pub fn warning(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(title, content, NotifyLevel::Warning)
    }

    pub fn error(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(title, content, NotifyLevel::Error)
    }

    pub fn critical(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(title, content, NotifyLevel::Critical)
    }

    /// 纯文本渲染（邮件正文、日志）
    pub fn render_plain(&self) -> String {
        let mut text = format!("[{}] {}\n\n{}", self.level, self.title, self.content);
        if let Some(source) = &self.source {
            text.push_str(&format!("\n\nChannel: {}", source));
        }
        text.push_str(&format!("\nTime: {}", self.timestamp.to_rfc3339()));
        text
    }
}
