use airwave_compaction::CompactionConfig;
use airwave_ingest::{ChannelConfig, IngestConfig};
use airwave_logging::LoggingConfig;
use airwave_notify::NotifyConfig;
use airwave_reconcile::ReconcileConfig;
use airwave_storage::{BackendKind, StorageConfig};
use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// 应用配置（`airwave.toml`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub channels: Vec<ChannelConfig>,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub compaction: CompactionConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// 告警限流和每日完成标记的存放目录
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./data/state")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            channels: Vec::new(),
            ingest: IngestConfig::default(),
            compaction: CompactionConfig::default(),
            reconcile: ReconcileConfig::default(),
            notify: NotifyConfig::default(),
            logging: LoggingConfig::default(),
            state_dir: default_state_dir(),
        }
    }
}

impl AppConfig {
    pub fn channel(&self, id: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|channel| channel.id == id)
    }

    /// 校验跨字段约束
    pub fn validate(&self) -> Result<()> {
        let mut configured = HashSet::new();
        for name in self.storage.backends.keys() {
            configured.insert(name.parse::<BackendKind>()?);
        }

        let mut ids = HashSet::new();
        for channel in &self.channels {
            if channel.id.trim().is_empty() {
                bail!("channel id cannot be empty");
            }
            if channel.id.contains('/') {
                bail!("channel id {} cannot contain '/'", channel.id);
            }
            if !ids.insert(channel.id.as_str()) {
                bail!("duplicate channel id {}", channel.id);
            }
            channel
                .schedule
                .validate()
                .map_err(|e| anyhow!("channel {}: {}", channel.id, e))?;
        }

        if self.ingest.download_workers == 0 {
            bail!("ingest download_workers must be greater than 0");
        }
        if self.ingest.alert_interval_minutes <= 0 {
            bail!("ingest alert_interval_minutes must be greater than 0");
        }

        self.compaction.validate()?;
        for kind in std::iter::once(&self.compaction.source).chain(&self.compaction.destinations) {
            if !configured.contains(kind) {
                bail!("compaction uses backend {} which is not configured in [storage]", kind);
            }
        }

        self.reconcile.validate().map_err(|e| anyhow!(e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airwave_compaction::LiveSchedule;

    fn channel(id: &str) -> ChannelConfig {
        ChannelConfig {
            id: id.to_string(),
            playlist_url: "https://radio.example.com/live/playlist.m3u8".parse().unwrap(),
            schedule: LiveSchedule::default(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.bucket, "radio-project");
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let config = AppConfig {
            channels: vec![channel("vov1"), channel("vov1")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_window_rejected() {
        let mut vov1 = channel("vov1");
        vov1.schedule = LiveSchedule::new(6, 24, 7);
        let config = AppConfig {
            channels: vec![vov1],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unconfigured_destination_rejected() {
        let mut config = AppConfig::default();
        config.compaction.destinations = vec![BackendKind::ColdB];
        assert!(config.validate().is_err());

        config.compaction.destinations.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_io_workers_bounds() {
        let mut config = AppConfig::default();
        config.compaction.io_workers = 101;
        assert!(config.validate().is_err());

        config.compaction.io_workers = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_budget_rejected() {
        let mut config = AppConfig::default();
        config.reconcile.budget_bytes = 0;
        assert!(config.validate().is_err());
    }
}
