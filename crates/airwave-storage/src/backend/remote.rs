use super::{BackendStats, BlobStore, ObjectMeta, StatsCounter};
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// S3 兼容端点配置（SeaweedFS 网关、AWS、Cloudflare R2）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S3Endpoint {
    /// 端点 URL，AWS 官方端点可留空
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// 允许 http 端点（内网 SeaweedFS）
    #[serde(default)]
    pub allow_http: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl S3Endpoint {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            allow_http: endpoint.starts_with("http://"),
            endpoint: Some(endpoint),
            region: default_region(),
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

#[derive(Debug, Clone)]
enum StoreFactory {
    S3(S3Endpoint),
    Memory,
}

/// 基于 `object_store` 的存储后端
///
/// `object_store` 客户端绑定单个桶，这里按桶名延迟创建并缓存。
pub struct ObjectStoreBackend {
    name: String,
    factory: StoreFactory,
    stores: RwLock<HashMap<String, Arc<dyn ObjectStore>>>,
    stats: StatsCounter,
}

impl ObjectStoreBackend {
    pub fn s3(name: impl Into<String>, endpoint: S3Endpoint) -> Self {
        Self::with_factory(name, StoreFactory::S3(endpoint))
    }

    /// 内存后端（测试和演示用）
    pub fn memory(name: impl Into<String>) -> Self {
        Self::with_factory(name, StoreFactory::Memory)
    }

    fn with_factory(name: impl Into<String>, factory: StoreFactory) -> Self {
        Self {
            name: name.into(),
            factory,
            stores: RwLock::new(HashMap::new()),
            stats: StatsCounter::default(),
        }
    }

    async fn store_for(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        if let Some(store) = self.stores.read().await.get(bucket) {
            return Ok(Arc::clone(store));
        }

        let mut stores = self.stores.write().await;
        if let Some(store) = stores.get(bucket) {
            return Ok(Arc::clone(store));
        }

        let store: Arc<dyn ObjectStore> = match &self.factory {
            StoreFactory::Memory => Arc::new(InMemory::new()),
            StoreFactory::S3(endpoint) => {
                let mut builder = AmazonS3Builder::new()
                    .with_bucket_name(bucket)
                    .with_region(&endpoint.region)
                    .with_allow_http(endpoint.allow_http);
                if let Some(url) = &endpoint.endpoint {
                    builder = builder
                        .with_endpoint(url)
                        .with_virtual_hosted_style_request(false);
                }
                if let Some(key_id) = &endpoint.access_key_id {
                    builder = builder.with_access_key_id(key_id);
                }
                if let Some(secret) = &endpoint.secret_access_key {
                    builder = builder.with_secret_access_key(secret);
                }
                let s3 = builder
                    .build()
                    .map_err(|e| StorageError::Config(format!("{}: {}", self.name, e)))?;
                Arc::new(s3)
            }
        };

        stores.insert(bucket.to_string(), Arc::clone(&store));
        debug!(backend = %self.name, bucket = %bucket, "Object store client created");
        Ok(store)
    }

    fn map_err(&self, bucket: &str, key: &str, err: object_store::Error) -> StorageError {
        match err {
            object_store::Error::NotFound { .. } => StorageError::not_found(bucket, key),
            object_store::Error::Generic { source, .. } => {
                StorageError::unavailable(self.name.clone(), source)
            }
            other => StorageError::Backend {
                backend: self.name.clone(),
                message: other.to_string(),
            },
        }
    }
}

#[async_trait]
impl BlobStore for ObjectStoreBackend {
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        let store = self.store_for(bucket).await?;
        let size = data.len() as u64;

        store
            .put(&ObjectPath::from(key), data.into())
            .await
            .map_err(|e| self.map_err(bucket, key, e))?;
        self.stats.record_write(size);
        debug!(backend = %self.name, key = %key, size, "Object uploaded");
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let store = self.store_for(bucket).await?;

        let result = store
            .get(&ObjectPath::from(key))
            .await
            .map_err(|e| self.map_err(bucket, key, e))?;
        let data = result
            .bytes()
            .await
            .map_err(|e| self.map_err(bucket, key, e))?;
        self.stats.record_read(data.len() as u64);
        Ok(data)
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectMeta> {
        let store = self.store_for(bucket).await?;

        let meta = store
            .head(&ObjectPath::from(key))
            .await
            .map_err(|e| self.map_err(bucket, key, e))?;
        Ok(convert_meta(meta))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let store = self.store_for(bucket).await?;

        // object_store 按路径段匹配前缀，这里按目录部分列出再做字符串过滤
        let prefix = prefix.trim_start_matches('/');
        let dir = prefix.rfind('/').map(|idx| ObjectPath::from(&prefix[..idx]));

        let objects: Vec<object_store::ObjectMeta> = store
            .list(dir.as_ref())
            .try_collect()
            .await
            .map_err(|e| self.map_err(bucket, prefix, e))?;

        let mut objects: Vec<ObjectMeta> = objects
            .into_iter()
            .map(convert_meta)
            .filter(|meta| meta.key.starts_with(prefix))
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let store = self.store_for(bucket).await?;
        let path = ObjectPath::from(key);

        // S3 删除不存在的对象也会成功，先 head 以区分 NotFound
        store
            .head(&path)
            .await
            .map_err(|e| self.map_err(bucket, key, e))?;
        store
            .delete(&path)
            .await
            .map_err(|e| self.map_err(bucket, key, e))?;
        self.stats.record_delete();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn stats(&self) -> BackendStats {
        self.stats.snapshot()
    }
}

fn convert_meta(meta: object_store::ObjectMeta) -> ObjectMeta {
    ObjectMeta {
        key: meta.location.to_string(),
        size: meta.size as u64,
        last_modified: meta.last_modified,
    }
}
