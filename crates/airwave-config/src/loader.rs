use crate::AppConfig;
use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_CONFIG_FILE: &str = "airwave.toml";

/// 环境变量前缀，例如 `AIRWAVE__NOTIFY__TELEGRAM__BOT_TOKEN`
pub const ENV_PREFIX: &str = "AIRWAVE";

/// 配置加载器
///
/// 按顺序叠加：TOML 文件（可缺省）、`AIRWAVE__*` 环境变量。
pub struct ConfigLoader {
    path: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 加载并校验配置
    pub fn load(&self) -> Result<AppConfig> {
        let mut builder = Config::builder();

        if self.path.exists() {
            builder = builder.add_source(File::new(
                self.path
                    .to_str()
                    .ok_or_else(|| anyhow!("Invalid config path"))?,
                FileFormat::Toml,
            ));
            info!(path = %self.path.display(), "Loading configuration");
        } else {
            info!(path = %self.path.display(), "Config file not found, using defaults");
        }

        let config = builder
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        let app: AppConfig = config
            .try_deserialize()
            .with_context(|| format!("Invalid configuration in {}", self.path.display()))?;
        app.validate()?;

        debug!(channels = app.channels.len(), backends = app.storage.backends.len(), "Configuration loaded");
        Ok(app)
    }
}
