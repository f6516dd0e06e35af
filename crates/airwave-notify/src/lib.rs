pub mod config;
pub mod manager;
pub mod message;
pub mod notifier;
pub mod providers;

pub use config::NotifyConfig;
pub use manager::NotifyManager;
pub use message::{NotifyChannel, NotifyLevel, NotifyMessage};
pub use notifier::{MemoryNotifier, Notifier, NotifyResult};
pub use providers::{EmailConfig, EmailNotifier, TelegramConfig, TelegramNotifier, WebhookConfig, WebhookNotifier};
