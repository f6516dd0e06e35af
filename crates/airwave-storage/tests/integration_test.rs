use airwave_storage::{
    BackendConfig, BackendKind, BackendRegistry, BlobStore, LocalBackend, ReplicatedBackend,
    StorageConfig, StorageError,
};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_registry_rejects_multiple_local_roots() {
    let node_a = TempDir::new().unwrap();
    let node_b = TempDir::new().unwrap();

    let mut backends = BTreeMap::new();
    backends.insert(
        "hot".to_string(),
        BackendConfig::Local {
            roots: vec![node_a.path().to_path_buf(), node_b.path().to_path_buf()],
        },
    );
    let config = StorageConfig {
        bucket: "radio-project".to_string(),
        backends,
    };

    let err = BackendRegistry::from_config(&config).err().unwrap();
    assert!(matches!(err, StorageError::Config(_)));
}

#[tokio::test]
async fn test_registry_with_single_local_root() {
    let node = TempDir::new().unwrap();

    let mut backends = BTreeMap::new();
    backends.insert(
        "hot".to_string(),
        BackendConfig::Local {
            roots: vec![node.path().to_path_buf()],
        },
    );
    let config = StorageConfig {
        bucket: "radio-project".to_string(),
        backends,
    };

    let registry = BackendRegistry::from_config(&config).unwrap();
    let hot = registry.get(BackendKind::Hot).unwrap();

    let key = "vov1/2024/01/02/05_00_00_000001_x_mono_16khz.aac";
    hot.put(&config.bucket, key, Bytes::from_static(b"aac")).await.unwrap();
    let listed = hot.list(&config.bucket, "vov1/2024/01/02").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].size, 3);

    // 删除后不会再出现
    hot.delete(&config.bucket, key).await.unwrap();
    for _ in 0..8 {
        assert!(hot.list(&config.bucket, "vov1/").await.unwrap().is_empty());
        assert!(hot.get(&config.bucket, key).await.unwrap_err().is_not_found());
    }
}

#[tokio::test]
async fn test_registry_builder_and_delete() {
    let temp_dir = TempDir::new().unwrap();
    let cold: Arc<dyn BlobStore> = Arc::new(LocalBackend::with_name("cold", temp_dir.path().to_path_buf()));
    let replicated: Arc<dyn BlobStore> = Arc::new(
        ReplicatedBackend::new("hot", vec![Arc::new(LocalBackend::new(temp_dir.path().join("hot"))) as Arc<dyn BlobStore>])
            .unwrap(),
    );

    let registry = BackendRegistry::new()
        .with(BackendKind::Hot, replicated)
        .with(BackendKind::ColdA, cold);

    assert!(registry.contains(BackendKind::ColdA));
    assert!(!registry.contains(BackendKind::ColdB));

    let cold = registry.get(BackendKind::ColdA).unwrap();
    cold.put("b", "c/2024/01/02/05.tar.gz", Bytes::from_static(b"tar")).await.unwrap();
    cold.delete("b", "c/2024/01/02/05.tar.gz").await.unwrap();
    assert!(cold.head("b", "c/2024/01/02/05.tar.gz").await.unwrap_err().is_not_found());
}
