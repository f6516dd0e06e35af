use crate::error::{ReconcileError, Result};
use crate::store::WantedStore;
use airwave_storage::{BackendKind, BackendRegistry, BlobStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// `[reconcile]` 配置段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// 期望对象表所在的 SQLite 数据库
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// 默认同步目标
    #[serde(default = "default_destination")]
    pub destination: BackendKind,

    /// 单次同步允许复制的总字节数
    #[serde(default = "default_budget_bytes")]
    pub budget_bytes: u64,
}

fn default_database_url() -> String {
    "sqlite://objects.db".to_string()
}

fn default_destination() -> BackendKind {
    BackendKind::DeepArchive
}

fn default_budget_bytes() -> u64 {
    5 * 1024 * 1024 * 1024
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            destination: default_destination(),
            budget_bytes: default_budget_bytes(),
        }
    }
}

impl ReconcileConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.budget_bytes == 0 {
            return Err("reconcile budget_bytes must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// 一次同步的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConvergeReport {
    pub destination: String,
    pub wanted: usize,
    pub present: usize,
    pub to_copy: usize,
    pub to_delete: usize,

    /// 待复制对象在来源层的总大小
    pub requested_bytes: u64,

    pub copied: usize,
    pub deleted: usize,
    pub failed_copies: usize,
    pub failed_deletes: usize,
    pub duration_ms: u64,
}

/// 待复制对象
struct CopyPlan {
    key: String,
    source: Arc<dyn BlobStore>,
}

/// 让目标层的对象集合与期望对象表一致
pub struct Reconciler {
    registry: BackendRegistry,
    store: WantedStore,
    bucket: String,
    budget_bytes: u64,
}

impl Reconciler {
    pub fn new(
        registry: BackendRegistry,
        store: WantedStore,
        bucket: impl Into<String>,
        budget_bytes: u64,
    ) -> Self {
        Self {
            registry,
            store,
            bucket: bucket.into(),
            budget_bytes,
        }
    }

    pub fn store(&self) -> &WantedStore {
        &self.store
    }

    /// 执行一次同步
    ///
    /// 超出预算或出现未知来源时直接返回错误，不做任何复制和删除；
    /// 单个对象的复制、删除失败只记录日志。
    pub async fn converge(&self, destination: BackendKind) -> Result<ConvergeReport> {
        let started = Instant::now();
        let target = self.registry.get(destination)?;

        // 同一对象键出现多次时取第一条记录
        let mut wanted: BTreeMap<String, String> = BTreeMap::new();
        for object in self.store.active_objects().await? {
            wanted.entry(object.key).or_insert(object.source);
        }

        let present: HashSet<String> = target
            .list(&self.bucket, "")
            .await?
            .into_iter()
            .map(|meta| meta.key)
            .collect();

        let mut plans = Vec::new();
        for (key, source_name) in &wanted {
            if present.contains(key) {
                continue;
            }
            let source = source_name
                .parse::<BackendKind>()
                .ok()
                .and_then(|kind| self.registry.get(kind).ok())
                .ok_or_else(|| ReconcileError::UnknownSource {
                    source_name: source_name.clone(),
                    key: key.clone(),
                })?;
            plans.push(CopyPlan {
                key: key.clone(),
                source,
            });
        }

        let mut to_delete: Vec<&String> = present
            .iter()
            .filter(|key| !wanted.contains_key(*key))
            .collect();
        to_delete.sort();

        // 来源对象已被删除的记录计为复制失败，不占预算
        let mut requested_bytes = 0u64;
        let mut missing_sources = 0usize;
        let mut sized = Vec::with_capacity(plans.len());
        for plan in plans {
            match plan.source.head(&self.bucket, &plan.key).await {
                Ok(meta) => {
                    requested_bytes += meta.size;
                    sized.push(plan);
                }
                Err(e) if e.is_not_found() => {
                    warn!(key = %plan.key, source = plan.source.name(), "Wanted object missing on source");
                    missing_sources += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        let plans = sized;

        if requested_bytes > self.budget_bytes {
            error!(
                destination = %destination,
                requested = requested_bytes,
                budget = self.budget_bytes,
                "Wanted objects exceed the copy budget"
            );
            return Err(ReconcileError::BudgetExceeded {
                requested: requested_bytes,
                budget: self.budget_bytes,
            });
        }

        let mut report = ConvergeReport {
            destination: destination.to_string(),
            wanted: wanted.len(),
            present: present.len(),
            to_copy: plans.len() + missing_sources,
            to_delete: to_delete.len(),
            requested_bytes,
            failed_copies: missing_sources,
            ..Default::default()
        };

        for plan in &plans {
            match self.copy(plan, target.as_ref()).await {
                Ok(size) => {
                    info!(key = %plan.key, source = plan.source.name(), destination = %destination, size, "Object transferred");
                    report.copied += 1;
                }
                Err(e) => {
                    warn!(key = %plan.key, destination = %destination, error = %e, "Failed to transfer object");
                    report.failed_copies += 1;
                }
            }
        }

        for key in to_delete {
            match target.delete(&self.bucket, key).await {
                Ok(()) => {
                    info!(key = %key, destination = %destination, "Object removed");
                    report.deleted += 1;
                }
                Err(e) if e.is_not_found() => {
                    debug!(key = %key, "Object already gone");
                    report.deleted += 1;
                }
                Err(e) => {
                    warn!(key = %key, destination = %destination, error = %e, "Failed to remove object");
                    report.failed_deletes += 1;
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            destination = %destination,
            copied = report.copied,
            deleted = report.deleted,
            failed_copies = report.failed_copies,
            failed_deletes = report.failed_deletes,
            "Reconcile finished"
        );
        Ok(report)
    }

    async fn copy(&self, plan: &CopyPlan, target: &dyn BlobStore) -> Result<u64> {
        let data = plan.source.get(&self.bucket, &plan.key).await?;
        let size = data.len() as u64;
        target.put(&self.bucket, &plan.key, data).await?;
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_config_defaults() {
        let config: ReconcileConfig = toml::from_str("").unwrap();
        assert_eq!(config.destination, BackendKind::DeepArchive);
        assert_eq!(config.budget_bytes, 5 * 1024 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_budget_rejected() {
        let config = ReconcileConfig {
            budget_bytes: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_budget_error_message() {
        let err = ReconcileError::BudgetExceeded {
            requested: 10,
            budget: 5,
        };
        assert_eq!(err.to_string(), "Requested 10 bytes exceeds the budget of 5 bytes");
    }
}
