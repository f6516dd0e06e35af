pub mod app;
pub mod loader;

pub use app::AppConfig;
pub use loader::{ConfigLoader, DEFAULT_CONFIG_FILE, ENV_PREFIX};
