use crate::error::{IngestError, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

async fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match fs::read(path).await {
        Ok(data) => match serde_json::from_slice(&data) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupted state file, starting fresh");
                Ok(T::default())
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(IngestError::State(format!("{}: {}", path.display(), e))),
    }
}

/// 先写临时文件再 rename
async fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)
        .map_err(|e| IngestError::State(format!("{}: {}", path.display(), e)))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| IngestError::State(format!("{}: {}", parent.display(), e)))?;
    }

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &data)
        .await
        .map_err(|e| IngestError::State(format!("{}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| IngestError::State(format!("{}: {}", path.display(), e)))?;
    Ok(())
}

/// 按错误类别的告警限流，记录在 `<state_dir>/<channel>.alerts.json`
///
/// 文件内容为 `{"<error-kind>": <unix 秒>}`。
#[derive(Debug)]
pub struct AlertRateLimiter {
    path: PathBuf,
    interval: Duration,
    last_alert: BTreeMap<String, i64>,
}

impl AlertRateLimiter {
    pub async fn load(path: impl Into<PathBuf>, interval: Duration) -> Result<Self> {
        let path = path.into();
        let last_alert = load_json(&path).await?;
        Ok(Self {
            path,
            interval,
            last_alert,
        })
    }

    pub fn should_alert(&self, kind: &str, now: DateTime<Utc>) -> bool {
        match self.last_alert.get(kind) {
            Some(last) => now.timestamp() - last >= self.interval.num_seconds(),
            None => true,
        }
    }

    pub async fn record(&mut self, kind: &str, now: DateTime<Utc>) -> Result<()> {
        self.last_alert.insert(kind.to_string(), now.timestamp());
        save_json(&self.path, &self.last_alert).await
    }
}

/// 每日压缩完成标记，记录在 `<state_dir>/<channel>.cache.json`
///
/// 文件内容为 `{"YYYYMMDD": bool}`，日期按 UTC。
#[derive(Debug)]
pub struct DailyCompletion {
    path: PathBuf,
    days: BTreeMap<String, bool>,
}

impl DailyCompletion {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let days = load_json(&path).await?;
        Ok(Self { path, days })
    }

    fn day_key(date: NaiveDate) -> String {
        date.format("%Y%m%d").to_string()
    }

    pub fn is_done(&self, date: NaiveDate) -> bool {
        self.days.get(&Self::day_key(date)).copied().unwrap_or(false)
    }

    pub async fn mark_done(&mut self, date: NaiveDate) -> Result<()> {
        self.days.insert(Self::day_key(date), true);
        save_json(&self.path, &self.days).await
    }
}
