use super::{BackendStats, BlobStore, ObjectMeta, StatsCounter};
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, error};

/// 本地文件系统存储后端
///
/// 对象存放在 `<base_dir>/<bucket>/<key>`，用于单机部署和测试。
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    base_dir: PathBuf,
    stats: Arc<StatsCounter>,
}

impl LocalBackend {
    pub fn new(base_dir: PathBuf) -> Self {
        Self::with_name("local", base_dir)
    }

    pub fn with_name(name: impl Into<String>, base_dir: PathBuf) -> Self {
        Self {
            name: name.into(),
            base_dir,
            stats: Arc::new(StatsCounter::default()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// 解析完整路径
    fn resolve_path(&self, bucket: &str, key: &str) -> PathBuf {
        // 移除开头的斜杠，避免逃逸到 base_dir 之外
        let clean_key = key.trim_start_matches('/');
        self.base_dir.join(bucket).join(clean_key)
    }

    fn map_io(&self, bucket: &str, key: &str, err: std::io::Error) -> StorageError {
        if err.kind() == ErrorKind::NotFound {
            StorageError::not_found(bucket, key)
        } else {
            StorageError::Io(err)
        }
    }
}

#[async_trait]
impl BlobStore for LocalBackend {
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        let full_path = self.resolve_path(bucket, key);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        match fs::write(&full_path, &data).await {
            Ok(_) => {
                self.stats.record_write(data.len() as u64);
                debug!(backend = %self.name, key = %key, size = data.len(), "Object written");
                Ok(())
            }
            Err(e) => {
                error!(backend = %self.name, key = %key, error = %e, "Failed to write object");
                Err(StorageError::Io(e))
            }
        }
    }

    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let full_path = self.resolve_path(bucket, key);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let size = fs::copy(path, &full_path).await?;
        self.stats.record_write(size);
        debug!(backend = %self.name, key = %key, size, "Object copied from file");
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let full_path = self.resolve_path(bucket, key);

        let data = fs::read(&full_path)
            .await
            .map_err(|e| self.map_io(bucket, key, e))?;
        self.stats.record_read(data.len() as u64);
        Ok(Bytes::from(data))
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
        let full_path = self.resolve_path(bucket, key);
        let metadata = fs::metadata(&full_path)
            .await
            .map_err(|e| self.map_io(bucket, key, e))?;

        if !metadata.is_file() {
            return Err(StorageError::not_found(bucket, key));
        }

        Ok(ObjectMeta {
            key: key.trim_start_matches('/').to_string(),
            size: metadata.len(),
            last_modified: modified_time(&metadata),
        })
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let bucket_root = self.base_dir.join(bucket);
        let prefix = prefix.trim_start_matches('/').to_string();

        // 从前缀中最深的目录开始遍历，减少扫描量
        let start_dir = match prefix.rfind('/') {
            Some(idx) => bucket_root.join(&prefix[..idx]),
            None => bucket_root.clone(),
        };

        if !fs::try_exists(&start_dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut objects = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<ObjectMeta>> {
            let mut objects = Vec::new();
            walk(&bucket_root, &start_dir, &prefix, &mut objects)?;
            Ok(objects)
        })
        .await
        .map_err(|e| StorageError::Backend {
            backend: self.name.clone(),
            message: format!("list task failed: {}", e),
        })??;

        // 排序以保证一致性
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let full_path = self.resolve_path(bucket, key);

        fs::remove_file(&full_path)
            .await
            .map_err(|e| self.map_io(bucket, key, e))?;
        self.stats.record_delete();
        debug!(backend = %self.name, key = %key, "Object deleted");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn stats(&self) -> BackendStats {
        self.stats.snapshot()
    }
}

fn modified_time(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    DateTime::<Utc>::from(modified)
}

fn walk(root: &Path, dir: &Path, prefix: &str, out: &mut Vec<ObjectMeta>) -> std::io::Result<()> {
    for item in std::fs::read_dir(dir)? {
        let item = item?;
        let path = item.path();
        let meta = item.metadata()?;

        if meta.file_type().is_symlink() {
            continue;
        }

        if meta.is_dir() {
            walk(root, &path, prefix, out)?;
            continue;
        }

        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if key.starts_with(prefix) {
            out.push(ObjectMeta {
                key,
                size: meta.len(),
                last_modified: modified_time(&meta),
            });
        }
    }
    Ok(())
}
