mod email;
mod telegram;
mod webhook;

pub use email::{EmailConfig, EmailNotifier};
pub use telegram::{TelegramConfig, TelegramNotifier};
pub use webhook::{WebhookConfig, WebhookNotifier};
