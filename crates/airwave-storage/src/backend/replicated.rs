use super::{BackendStats, BlobStore, ObjectMeta};
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use rand::seq::SliceRandom;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// 多副本存储后端（SeaweedFS 集群的多个 S3 网关）
///
/// - `put` 向每个副本独立写入，单个副本失败只记录日志，不影响其他副本
/// - `get` / `head` / `list` / `delete` 按随机顺序尝试副本，第一个成功即返回
///
/// 没有事务保证：副本之间可能短暂不一致，由上层在下一轮运行时重新观测修复。
pub struct ReplicatedBackend {
    name: String,
    replicas: Vec<Arc<dyn BlobStore>>,
}

impl ReplicatedBackend {
    pub fn new(name: impl Into<String>, replicas: Vec<Arc<dyn BlobStore>>) -> Result<Self> {
        let name = name.into();
        if replicas.is_empty() {
            return Err(StorageError::Config(format!(
                "replicated backend {} needs at least one replica",
                name
            )));
        }
        Ok(Self { name, replicas })
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    fn shuffled(&self) -> Vec<Arc<dyn BlobStore>> {
        let mut replicas = self.replicas.clone();
        replicas.shuffle(&mut rand::thread_rng());
        replicas
    }

    /// 随机顺序尝试副本，返回第一个成功结果
    ///
    /// 所有副本都返回 NotFound 时返回 NotFound，否则返回最后一个错误。
    async fn first_success<T, F, Fut>(&self, op: &str, f: F) -> Result<T>
    where
        F: Fn(Arc<dyn BlobStore>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut not_found = None;
        let mut last_err = None;

        for replica in self.shuffled() {
            let replica_name = replica.name().to_string();
            match f(replica).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_not_found() => {
                    debug!(backend = %self.name, replica = %replica_name, op, "Object not on replica");
                    not_found = Some(e);
                }
                Err(e) => {
                    warn!(backend = %self.name, replica = %replica_name, op, error = %e, "Replica failed, trying next");
                    last_err = Some(e);
                }
            }
        }

        Err(match (not_found, last_err) {
            (Some(e), None) => e,
            (_, Some(e)) => e,
            (None, None) => StorageError::unavailable(self.name.clone(), "no replica answered"),
        })
    }
}

#[async_trait]
impl BlobStore for ReplicatedBackend {
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        let writes = self.replicas.iter().map(|replica| {
            let data = data.clone();
            async move { (replica.name().to_string(), replica.put(bucket, key, data).await) }
        });

        let mut succeeded = 0usize;
        let mut last_err = None;
        for (replica, result) in futures::future::join_all(writes).await {
            match result {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    warn!(backend = %self.name, replica = %replica, key = %key, error = %e, "Replica write failed");
                    last_err = Some(e);
                }
            }
        }

        match (succeeded, last_err) {
            (0, Some(e)) => Err(e),
            _ => Ok(()),
        }
    }

    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let data = Bytes::from(tokio::fs::read(path).await?);
        self.put(bucket, key, data).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.first_success("get", |replica| async move { replica.get(bucket, key).await })
            .await
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
        self.first_success("head", |replica| async move { replica.head(bucket, key).await })
            .await
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>> {
        self.first_success("list", |replica| async move { replica.list(bucket, prefix).await })
            .await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.first_success("delete", |replica| async move { replica.delete(bucket, key).await })
            .await
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn stats(&self) -> BackendStats {
        self.replicas
            .iter()
            .map(|r| r.stats())
            .fold(BackendStats::default(), |mut acc, s| {
                acc.read_count += s.read_count;
                acc.write_count += s.write_count;
                acc.delete_count += s.delete_count;
                acc.bytes_read += s.bytes_read;
                acc.bytes_written += s.bytes_written;
                acc
            })
    }
}
