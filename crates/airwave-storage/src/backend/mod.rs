use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

pub mod local;
pub mod remote;
pub mod replicated;

pub use local::LocalBackend;
pub use remote::{ObjectStoreBackend, S3Endpoint};
pub use replicated::ReplicatedBackend;

/// Blob 存储抽象 trait
///
/// 所有后端（热存储集群、冷存储桶、深度归档）实现同一套接口，
/// 上层的采集、压缩、同步逻辑只依赖此 trait。
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// 写入对象
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<()>;

    /// 从本地文件写入对象
    ///
    /// 默认实现为整体读入内存后调用 `put`
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let data = tokio::fs::read(path).await?;
        self.put(bucket, key, Bytes::from(data)).await
    }

    /// 读取对象，不存在时返回 `StorageError::NotFound`
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes>;

    /// 获取对象元数据，不存在时返回 `StorageError::NotFound`
    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectMeta>;

    /// 按前缀列出对象
    ///
    /// 前缀下没有对象时返回空列表，而不是错误
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>>;

    /// 删除对象，不存在时返回 `StorageError::NotFound`
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// 后端名称（用于日志）
    fn name(&self) -> &str;

    /// 后端统计信息
    fn stats(&self) -> BackendStats {
        BackendStats::default()
    }
}

/// 对象元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub key: String,

    /// 对象大小（字节）
    pub size: u64,

    pub last_modified: DateTime<Utc>,
}

/// 后端统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub read_count: u64,
    pub write_count: u64,
    pub delete_count: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// 后端内部使用的原子计数器
#[derive(Debug, Default)]
pub(crate) struct StatsCounter {
    read_count: AtomicU64,
    write_count: AtomicU64,
    delete_count: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

impl StatsCounter {
    pub(crate) fn record_read(&self, bytes: u64) {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, bytes: u64) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.delete_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BackendStats {
        BackendStats {
            read_count: self.read_count.load(Ordering::Relaxed),
            write_count: self.write_count.load(Ordering::Relaxed),
            delete_count: self.delete_count.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}
