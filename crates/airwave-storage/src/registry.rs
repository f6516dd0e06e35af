use crate::backend::{BlobStore, LocalBackend, ObjectStoreBackend, ReplicatedBackend, S3Endpoint};
use crate::error::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// 后端身份
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// 多副本热存储（采集写入）
    Hot,
    /// 冷存储 A
    ColdA,
    /// 冷存储 B
    ColdB,
    /// 深度归档
    DeepArchive,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Hot,
        BackendKind::ColdA,
        BackendKind::ColdB,
        BackendKind::DeepArchive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Hot => "hot",
            BackendKind::ColdA => "cold_a",
            BackendKind::ColdB => "cold_b",
            BackendKind::DeepArchive => "deep_archive",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| StorageError::UnknownBackend(s.to_string()))
    }
}

/// 单个后端配置
///
/// 配置多个 endpoint 时构造为多副本后端，本地后端只允许一个 root。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "snake_case")]
pub enum BackendConfig {
    Local { roots: Vec<PathBuf> },
    S3 { endpoints: Vec<S3Endpoint> },
    Memory,
}

/// 存储配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 所有后端共用的桶名
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// 后端表，键为 `hot` / `cold_a` / `cold_b` / `deep_archive`
    #[serde(default)]
    pub backends: BTreeMap<String, BackendConfig>,
}

fn default_bucket() -> String {
    "radio-project".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        let mut backends = BTreeMap::new();
        backends.insert(
            BackendKind::Hot.to_string(),
            BackendConfig::Local {
                roots: vec![PathBuf::from("./data/hot")],
            },
        );
        backends.insert(
            BackendKind::ColdA.to_string(),
            BackendConfig::Local {
                roots: vec![PathBuf::from("./data/cold_a")],
            },
        );
        Self {
            bucket: default_bucket(),
            backends,
        }
    }
}

/// 后端注册表
///
/// 启动时根据配置一次性构造，运行期间按 `BackendKind` 查表，不再按名称分支。
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<BackendKind, Arc<dyn BlobStore>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从配置构造
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let mut registry = Self::new();

        for (name, backend_config) in &config.backends {
            let kind: BackendKind = name.parse()?;
            let store = build_backend(kind, backend_config)?;
            info!(backend = %kind, driver = store.name(), "Storage backend registered");
            registry.insert(kind, store);
        }

        Ok(registry)
    }

    pub fn with(mut self, kind: BackendKind, store: Arc<dyn BlobStore>) -> Self {
        self.insert(kind, store);
        self
    }

    pub fn insert(&mut self, kind: BackendKind, store: Arc<dyn BlobStore>) {
        self.backends.insert(kind, store);
    }

    pub fn get(&self, kind: BackendKind) -> Result<Arc<dyn BlobStore>> {
        self.backends
            .get(&kind)
            .cloned()
            .ok_or_else(|| StorageError::UnknownBackend(kind.to_string()))
    }

    pub fn contains(&self, kind: BackendKind) -> bool {
        self.backends.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<BackendKind> {
        let mut kinds: Vec<_> = self.backends.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

fn build_backend(kind: BackendKind, config: &BackendConfig) -> Result<Arc<dyn BlobStore>> {
    // 多个 S3 端点是同一集群的网关；多个本地目录彼此独立，删除无法同步
    if let BackendConfig::Local { roots } = config {
        if roots.len() > 1 {
            return Err(StorageError::Config(format!(
                "backend {} lists {} local roots, a local backend takes exactly one",
                kind,
                roots.len()
            )));
        }
    }

    let mut replicas: Vec<Arc<dyn BlobStore>> = match config {
        BackendConfig::Local { roots } => roots
            .iter()
            .enumerate()
            .map(|(idx, root)| {
                Arc::new(LocalBackend::with_name(format!("{}-local-{}", kind, idx), root.clone()))
                    as Arc<dyn BlobStore>
            })
            .collect(),
        BackendConfig::S3 { endpoints } => endpoints
            .iter()
            .enumerate()
            .map(|(idx, endpoint)| {
                Arc::new(ObjectStoreBackend::s3(format!("{}-s3-{}", kind, idx), endpoint.clone()))
                    as Arc<dyn BlobStore>
            })
            .collect(),
        BackendConfig::Memory => vec![Arc::new(ObjectStoreBackend::memory(format!("{}-memory", kind)))],
    };

    match replicas.len() {
        0 => Err(StorageError::Config(format!("backend {} has no hosts", kind))),
        1 => Ok(replicas.remove(0)),
        _ => Ok(Arc::new(ReplicatedBackend::new(kind.to_string(), replicas)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("hot".parse::<BackendKind>().unwrap(), BackendKind::Hot);
        assert_eq!("deep_archive".parse::<BackendKind>().unwrap(), BackendKind::DeepArchive);
        assert!("gcs".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_registry_from_config() {
        let mut backends = BTreeMap::new();
        backends.insert("hot".to_string(), BackendConfig::Memory);
        backends.insert(
            "cold_a".to_string(),
            BackendConfig::S3 {
                endpoints: vec![
                    S3Endpoint::new("http://11.11.1.89:8333"),
                    S3Endpoint::new("http://11.11.1.90:8333"),
                ],
            },
        );
        let config = StorageConfig {
            bucket: "radio-project".to_string(),
            backends,
        };

        let registry = BackendRegistry::from_config(&config).unwrap();
        assert_eq!(registry.kinds(), vec![BackendKind::Hot, BackendKind::ColdA]);
        assert_eq!(registry.get(BackendKind::ColdA).unwrap().name(), "cold_a");
        assert!(registry.get(BackendKind::DeepArchive).is_err());
    }

    #[test]
    fn test_registry_rejects_unknown_backend_name() {
        let mut backends = BTreeMap::new();
        backends.insert("gcs".to_string(), BackendConfig::Memory);
        let config = StorageConfig {
            bucket: "b".to_string(),
            backends,
        };

        assert!(BackendRegistry::from_config(&config).is_err());
    }

    #[test]
    fn test_backend_config_toml() {
        let config: StorageConfig = toml::from_str(
            r#"
bucket = "radio-project"

[backends.hot]
driver = "s3"
endpoints = [
    { endpoint = "http://11.11.1.89:8333", allow_http = true },
    { endpoint = "http://11.11.1.90:8333", allow_http = true },
]

[backends.deep_archive]
driver = "local"
roots = ["/srv/archive"]
"#,
        )
        .unwrap();

        assert_eq!(config.backends.len(), 2);
        match &config.backends["hot"] {
            BackendConfig::S3 { endpoints } => assert_eq!(endpoints.len(), 2),
            other => panic!("unexpected backend config: {:?}", other),
        }
    }
}
