use airwave_compaction::{CompactionConfig, Compactor, LiveSchedule};
use airwave_storage::{
    BackendKind, BackendRegistry, BlobStore, LocalBackend, ObjectMeta, ObjectStoreBackend,
    StorageError,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use rand::RngCore;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const BUCKET: &str = "radio-project";

struct Tiers {
    hot: Arc<dyn BlobStore>,
    cold_a: Arc<dyn BlobStore>,
    cold_b: Arc<dyn BlobStore>,
    registry: BackendRegistry,
}

fn tiers(cold_b_root: &Path) -> Tiers {
    let hot: Arc<dyn BlobStore> = Arc::new(ObjectStoreBackend::memory("hot"));
    let cold_a: Arc<dyn BlobStore> = Arc::new(ObjectStoreBackend::memory("cold_a"));
    let cold_b: Arc<dyn BlobStore> = Arc::new(LocalBackend::with_name("cold_b", cold_b_root.to_path_buf()));
    let registry = BackendRegistry::new()
        .with(BackendKind::Hot, hot.clone())
        .with(BackendKind::ColdA, cold_a.clone())
        .with(BackendKind::ColdB, cold_b.clone());
    Tiers {
        hot,
        cold_a,
        cold_b,
        registry,
    }
}

fn config(scratch: &Path, min_archive_bytes: u64) -> CompactionConfig {
    CompactionConfig {
        destinations: vec![BackendKind::ColdA, BackendKind::ColdB],
        min_archive_bytes,
        scratch_dir: scratch.to_path_buf(),
        ..CompactionConfig::default()
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap()
}

/// 在 05 点桶写入 `count` 个随机内容分片
async fn put_segments(store: &Arc<dyn BlobStore>, count: usize, size: usize) -> Vec<String> {
    let mut keys = Vec::new();
    for i in 0..count {
        let mut data = vec![0u8; size];
        rand::thread_rng().fill_bytes(&mut data);
        let key = format!("c/2024/01/02/05_{:02}_00_{:06}_seg{}_mono_16khz.aac", i, i, i);
        store.put(BUCKET, &key, Bytes::from(data)).await.unwrap();
        keys.push(key);
    }
    keys
}

#[tokio::test]
async fn test_hour_of_segments_is_archived_everywhere() {
    let temp_dir = TempDir::new().unwrap();
    let scratch = temp_dir.path().join("scratch");
    let tiers = tiers(&temp_dir.path().join("cold_b"));
    put_segments(&tiers.hot, 12, 1_000_000).await;

    let compactor = Compactor::new(&tiers.registry, BUCKET, config(&scratch, 10_000_000)).unwrap();
    let report = compactor
        .compact_at("c", &LiveSchedule::default(), now())
        .await
        .unwrap();

    assert_eq!(report.buckets_eligible, 1);
    assert_eq!(report.buckets_archived, 1);
    assert_eq!(report.uploads, 2);
    assert_eq!(report.segments_deleted, 12);

    for store in [&tiers.cold_a, &tiers.cold_b] {
        let meta = store.head(BUCKET, "c/2024/01/02/05.tar.gz").await.unwrap();
        assert!(meta.size >= 10_000_000);
    }
    assert!(tiers.hot.list(BUCKET, "c/").await.unwrap().is_empty());

    // 临时目录已清理
    let leftovers = std::fs::read_dir(&scratch).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_second_run_uploads_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let tiers = tiers(&temp_dir.path().join("cold_b"));
    put_segments(&tiers.hot, 3, 1024).await;

    let compactor = Compactor::new(&tiers.registry, BUCKET, config(temp_dir.path(), 10)).unwrap();
    let first = compactor.compact_at("c", &LiveSchedule::default(), now()).await.unwrap();
    assert_eq!(first.uploads, 2);
    assert!(tiers.hot.list(BUCKET, "c/").await.unwrap().is_empty());

    let second = compactor.compact_at("c", &LiveSchedule::default(), now()).await.unwrap();
    assert_eq!(second.uploads, 0);
    assert_eq!(second.segments_deleted, 0);
}

#[tokio::test]
async fn test_recent_bucket_is_left_alone() {
    let temp_dir = TempDir::new().unwrap();
    let tiers = tiers(&temp_dir.path().join("cold_b"));
    let keys = put_segments(&tiers.hot, 2, 1024).await;

    let compactor = Compactor::new(&tiers.registry, BUCKET, config(temp_dir.path(), 10)).unwrap();
    let just_after = Utc.with_ymd_and_hms(2024, 1, 2, 7, 0, 0).unwrap();
    let report = compactor
        .compact_at("c", &LiveSchedule::default(), just_after)
        .await
        .unwrap();

    assert_eq!(report.buckets_eligible, 0);
    assert_eq!(report.uploads, 0);
    assert_eq!(tiers.hot.list(BUCKET, "c/").await.unwrap().len(), keys.len());
}

#[tokio::test]
async fn test_object_outside_live_hours_is_deleted() {
    let temp_dir = TempDir::new().unwrap();
    let tiers = tiers(&temp_dir.path().join("cold_b"));

    // 18 UTC = 01 本地，不在 6..22 内
    let key = "c/2024/01/02/18_00_00_000001_night_mono_16khz.aac";
    tiers.hot.put(BUCKET, key, Bytes::from_static(b"noise")).await.unwrap();

    let compactor = Compactor::new(&tiers.registry, BUCKET, config(temp_dir.path(), 10)).unwrap();
    let one_minute_later = Utc.with_ymd_and_hms(2024, 1, 2, 18, 1, 0).unwrap();
    let report = compactor
        .compact_at("c", &LiveSchedule::default(), one_minute_later)
        .await
        .unwrap();

    assert_eq!(report.garbage_deleted, 1);
    assert_eq!(report.uploads, 0);
    assert!(tiers.hot.head(BUCKET, key).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_missing_destination_is_filled_in() {
    let temp_dir = TempDir::new().unwrap();
    let tiers = tiers(&temp_dir.path().join("cold_b"));
    put_segments(&tiers.hot, 3, 1024).await;
    tiers
        .cold_a
        .put(BUCKET, "c/2024/01/02/05.tar.gz", Bytes::from_static(b"existing"))
        .await
        .unwrap();

    let compactor = Compactor::new(&tiers.registry, BUCKET, config(temp_dir.path(), 10)).unwrap();
    let report = compactor.compact_at("c", &LiveSchedule::default(), now()).await.unwrap();

    assert_eq!(report.uploads, 1);
    assert_eq!(report.already_archived, 1);
    assert_eq!(report.buckets_archived, 1);

    // A 上的归档未被覆盖
    let existing = tiers.cold_a.get(BUCKET, "c/2024/01/02/05.tar.gz").await.unwrap();
    assert_eq!(&existing[..], b"existing");
    assert!(tiers.cold_b.head(BUCKET, "c/2024/01/02/05.tar.gz").await.is_ok());
    assert!(tiers.hot.list(BUCKET, "c/").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bucket_on_every_destination_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let tiers = tiers(&temp_dir.path().join("cold_b"));
    put_segments(&tiers.hot, 2, 1024).await;
    for store in [&tiers.cold_a, &tiers.cold_b] {
        store
            .put(BUCKET, "c/2024/01/02/05.tar.gz", Bytes::from_static(b"done"))
            .await
            .unwrap();
    }

    let compactor = Compactor::new(&tiers.registry, BUCKET, config(temp_dir.path(), 10)).unwrap();
    let report = compactor.compact_at("c", &LiveSchedule::default(), now()).await.unwrap();

    assert_eq!(report.buckets_skipped, 1);
    assert_eq!(report.already_archived, 2);
    assert_eq!(report.uploads, 0);

    // 归档已存在于所有目标，残留的热存储分片被清理
    assert_eq!(report.segments_deleted, 2);
    assert!(tiers.hot.list(BUCKET, "c/").await.unwrap().is_empty());
    assert_eq!(
        &tiers.cold_a.get(BUCKET, "c/2024/01/02/05.tar.gz").await.unwrap()[..],
        b"done"
    );
}

#[tokio::test]
async fn test_undersized_archive_is_not_uploaded() {
    let temp_dir = TempDir::new().unwrap();
    let tiers = tiers(&temp_dir.path().join("cold_b"));
    put_segments(&tiers.hot, 2, 1024).await;

    let compactor = Compactor::new(&tiers.registry, BUCKET, config(temp_dir.path(), 10_000_000)).unwrap();
    let report = compactor.compact_at("c", &LiveSchedule::default(), now()).await.unwrap();

    assert_eq!(report.buckets_undersized, 1);
    assert_eq!(report.uploads, 0);
    assert_eq!(report.segments_deleted, 2);
    assert!(tiers.cold_a.list(BUCKET, "c/").await.unwrap().is_empty());
    assert!(tiers.hot.list(BUCKET, "c/").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_undersized_sources_kept_when_configured() {
    let temp_dir = TempDir::new().unwrap();
    let tiers = tiers(&temp_dir.path().join("cold_b"));
    put_segments(&tiers.hot, 2, 1024).await;

    let mut config = config(temp_dir.path(), 10_000_000);
    config.delete_undersized_sources = false;
    let compactor = Compactor::new(&tiers.registry, BUCKET, config).unwrap();
    let report = compactor.compact_at("c", &LiveSchedule::default(), now()).await.unwrap();

    assert_eq!(report.buckets_undersized, 1);
    assert_eq!(report.segments_deleted, 0);
    assert_eq!(tiers.hot.list(BUCKET, "c/").await.unwrap().len(), 2);
}

/// 拒绝写入的目标
struct ReadOnlyStore;

#[async_trait]
impl BlobStore for ReadOnlyStore {
    async fn put(&self, _bucket: &str, _key: &str, _data: Bytes) -> airwave_storage::Result<()> {
        Err(StorageError::unavailable("read-only", "access denied"))
    }
    async fn get(&self, bucket: &str, key: &str) -> airwave_storage::Result<Bytes> {
        Err(StorageError::not_found(bucket, key))
    }
    async fn head(&self, bucket: &str, key: &str) -> airwave_storage::Result<ObjectMeta> {
        Err(StorageError::not_found(bucket, key))
    }
    async fn list(&self, _bucket: &str, _prefix: &str) -> airwave_storage::Result<Vec<ObjectMeta>> {
        Ok(Vec::new())
    }
    async fn delete(&self, bucket: &str, key: &str) -> airwave_storage::Result<()> {
        Err(StorageError::not_found(bucket, key))
    }
    fn name(&self) -> &str {
        "read-only"
    }
}

#[tokio::test]
async fn test_failed_destination_keeps_sources_for_retry() {
    let temp_dir = TempDir::new().unwrap();
    let tiers = tiers(&temp_dir.path().join("cold_b"));
    put_segments(&tiers.hot, 2, 1024).await;

    let registry = tiers
        .registry
        .clone()
        .with(BackendKind::ColdB, Arc::new(ReadOnlyStore));
    let compactor = Compactor::new(&registry, BUCKET, config(temp_dir.path(), 10)).unwrap();
    let report = compactor.compact_at("c", &LiveSchedule::default(), now()).await.unwrap();

    assert_eq!(report.uploads, 1);
    assert_eq!(report.failed_uploads, 1);
    assert_eq!(report.buckets_failed, 1);
    assert_eq!(report.segments_deleted, 0);
    assert!(tiers.cold_a.head(BUCKET, "c/2024/01/02/05.tar.gz").await.is_ok());
    assert_eq!(tiers.hot.list(BUCKET, "c/").await.unwrap().len(), 2);

    // 目标恢复后补传，A 不重复上传
    let compactor = Compactor::new(&tiers.registry, BUCKET, config(temp_dir.path(), 10)).unwrap();
    let retry = compactor.compact_at("c", &LiveSchedule::default(), now()).await.unwrap();
    assert_eq!(retry.uploads, 1);
    assert_eq!(retry.already_archived, 1);
    assert!(tiers.hot.list(BUCKET, "c/").await.unwrap().is_empty());
}

/// 指定小时的分片读取失败的热存储
struct FlakyHot {
    inner: Arc<dyn BlobStore>,
    broken_hour: &'static str,
}

#[async_trait]
impl BlobStore for FlakyHot {
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> airwave_storage::Result<()> {
        self.inner.put(bucket, key, data).await
    }
    async fn get(&self, bucket: &str, key: &str) -> airwave_storage::Result<Bytes> {
        if key.contains(self.broken_hour) {
            return Err(StorageError::unavailable("hot", "connection reset"));
        }
        self.inner.get(bucket, key).await
    }
    async fn head(&self, bucket: &str, key: &str) -> airwave_storage::Result<ObjectMeta> {
        self.inner.head(bucket, key).await
    }
    async fn list(&self, bucket: &str, prefix: &str) -> airwave_storage::Result<Vec<ObjectMeta>> {
        self.inner.list(bucket, prefix).await
    }
    async fn delete(&self, bucket: &str, key: &str) -> airwave_storage::Result<()> {
        self.inner.delete(bucket, key).await
    }
    fn name(&self) -> &str {
        "flaky-hot"
    }
}

#[tokio::test]
async fn test_failing_bucket_does_not_abort_batch() {
    let temp_dir = TempDir::new().unwrap();
    let tiers = tiers(&temp_dir.path().join("cold_b"));
    put_segments(&tiers.hot, 2, 1024).await;
    for i in 0..2 {
        let key = format!("c/2024/01/02/04_{:02}_00_{:06}_seg{}_mono_16khz.aac", i, i, i);
        tiers.hot.put(BUCKET, &key, Bytes::from(vec![1u8; 1024])).await.unwrap();
    }

    let hot: Arc<dyn BlobStore> = Arc::new(FlakyHot {
        inner: tiers.hot.clone(),
        broken_hour: "/04_",
    });
    let registry = tiers.registry.clone().with(BackendKind::Hot, hot);
    let compactor = Compactor::new(&registry, BUCKET, config(&temp_dir.path().join("scratch"), 10)).unwrap();
    let report = compactor.compact_at("c", &LiveSchedule::default(), now()).await.unwrap();

    assert_eq!(report.buckets_eligible, 2);
    assert_eq!(report.buckets_failed, 1);
    assert_eq!(report.buckets_archived, 1);
    assert!(tiers.cold_a.head(BUCKET, "c/2024/01/02/05.tar.gz").await.is_ok());
    assert!(tiers.cold_a.head(BUCKET, "c/2024/01/02/04.tar.gz").await.is_err());

    // 失败桶的分片保留，下一轮重试
    let remaining = tiers.hot.list(BUCKET, "c/").await.unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|meta| meta.key.contains("/04_")));
}

#[tokio::test]
async fn test_expired_segments_are_deleted() {
    let temp_dir = TempDir::new().unwrap();
    let tiers = tiers(&temp_dir.path().join("cold_b"));

    // 直播时段内，早于 TTL（3 天），归档已在所有目标上
    let expired = "c/2023/12/25/05_00_00_000000_old_mono_16khz.aac";
    tiers.hot.put(BUCKET, expired, Bytes::from_static(b"old")).await.unwrap();
    for store in [&tiers.cold_a, &tiers.cold_b] {
        store
            .put(BUCKET, "c/2023/12/25/05.tar.gz", Bytes::from_static(b"done"))
            .await
            .unwrap();
    }

    let compactor = Compactor::new(&tiers.registry, BUCKET, config(temp_dir.path(), 10)).unwrap();
    let report = compactor.compact_at("c", &LiveSchedule::default(), now()).await.unwrap();

    assert_eq!(report.uploads, 0);
    assert_eq!(report.failed_deletes, 0);
    assert!(tiers.hot.head(BUCKET, expired).await.unwrap_err().is_not_found());
}
