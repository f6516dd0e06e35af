use crate::archive::{build_archive_blocking, ArchiveMember};
use crate::bucket::{classify, ClassifyPolicy, TimeBucket};
use crate::error::{CompactionError, Result};
use crate::schedule::LiveSchedule;
use airwave_storage::{BackendKind, BackendRegistry, BlobStore};
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, error, info, warn};

/// `[compaction]` 配置段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// 读取原始分片的后端
    #[serde(default = "default_source")]
    pub source: BackendKind,

    /// 归档上传目标，每个桶必须在所有目标上都存在才算完成
    #[serde(default = "default_destinations")]
    pub destinations: Vec<BackendKind>,

    /// 归档最小字节数，低于此值不上传
    #[serde(default = "default_min_archive_bytes")]
    pub min_archive_bytes: u64,

    #[serde(default = "default_ttl_days")]
    pub ttl_days: i64,

    /// 桶起始时间至少早于当前时间多少分钟才压缩
    #[serde(default = "default_min_age_minutes")]
    pub min_age_minutes: i64,

    /// 下载 / 删除并发度
    #[serde(default = "default_io_workers")]
    pub io_workers: usize,

    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// 归档过小时仍删除源分片
    #[serde(default = "default_true")]
    pub delete_undersized_sources: bool,
}

fn default_source() -> BackendKind {
    BackendKind::Hot
}

fn default_destinations() -> Vec<BackendKind> {
    vec![BackendKind::ColdA]
}

fn default_min_archive_bytes() -> u64 {
    10_000_000
}

fn default_ttl_days() -> i64 {
    3
}

fn default_min_age_minutes() -> i64 {
    120
}

fn default_io_workers() -> usize {
    10
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("./data/scratch")
}

fn default_true() -> bool {
    true
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            destinations: default_destinations(),
            min_archive_bytes: default_min_archive_bytes(),
            ttl_days: default_ttl_days(),
            min_age_minutes: default_min_age_minutes(),
            io_workers: default_io_workers(),
            scratch_dir: default_scratch_dir(),
            delete_undersized_sources: true,
        }
    }
}

impl CompactionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.destinations.is_empty() {
            return Err(CompactionError::Config("at least one archive destination is required".into()));
        }
        if self.destinations.contains(&self.source) {
            return Err(CompactionError::Config(format!(
                "source backend {} cannot be an archive destination",
                self.source
            )));
        }
        if !(1..=100).contains(&self.io_workers) {
            return Err(CompactionError::Config(format!(
                "io_workers must be within 1..=100, got {}",
                self.io_workers
            )));
        }
        if self.ttl_days <= 0 || self.min_age_minutes <= 0 {
            return Err(CompactionError::Config("ttl_days and min_age_minutes must be positive".into()));
        }
        Ok(())
    }
}

/// 单次压缩运行统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompactionReport {
    pub channel: String,
    pub objects_listed: usize,
    pub unparsed_keys: usize,
    pub buckets_eligible: usize,

    /// 所有缺失目标均上传成功
    pub buckets_archived: usize,

    /// 所有目标上都已有归档
    pub buckets_skipped: usize,

    pub buckets_undersized: usize,
    pub buckets_failed: usize,

    /// 已存在归档而跳过的（桶, 目标）组合
    pub already_archived: usize,

    pub uploads: usize,
    pub failed_uploads: usize,
    pub segments_deleted: usize,
    pub garbage_deleted: usize,
    pub failed_deletes: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Default)]
struct BucketOutcome {
    uploads: usize,
    failed_uploads: usize,
    undersized: bool,
    deleted: Vec<String>,
    failed_deletes: usize,
}

/// 压缩器
///
/// 每次运行都从各后端的实际内容重新推导状态，不依赖本地记忆，
/// 中断后重跑即可续上。
pub struct Compactor {
    source: Arc<dyn BlobStore>,
    destinations: Vec<(BackendKind, Arc<dyn BlobStore>)>,
    bucket: String,
    config: CompactionConfig,
}

impl Compactor {
    pub fn new(
        registry: &BackendRegistry,
        bucket: impl Into<String>,
        config: CompactionConfig,
    ) -> Result<Self> {
        config.validate()?;

        let source = registry.get(config.source)?;
        let destinations = config
            .destinations
            .iter()
            .map(|kind| registry.get(*kind).map(|store| (*kind, store)))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            source,
            destinations,
            bucket: bucket.into(),
            config,
        })
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    pub async fn compact(&self, channel: &str, schedule: &LiveSchedule) -> Result<CompactionReport> {
        self.compact_at(channel, schedule, Utc::now()).await
    }

    /// 以给定时间为“当前时间”运行一次压缩
    pub async fn compact_at(
        &self,
        channel: &str,
        schedule: &LiveSchedule,
        now: DateTime<Utc>,
    ) -> Result<CompactionReport> {
        let started = std::time::Instant::now();
        info!(channel = %channel, "Starting compaction");

        let objects = self
            .source
            .list(&self.bucket, &format!("{}/", channel))
            .await?;

        let policy = ClassifyPolicy {
            schedule: *schedule,
            min_age: Duration::minutes(self.config.min_age_minutes),
            ttl: Duration::days(self.config.ttl_days),
        };
        let classification = classify(channel, &objects, &policy, now);
        info!(
            channel = %channel,
            garbage = classification.garbage.len(),
            "Need to clean garbage objects"
        );

        let mut report = CompactionReport {
            channel: channel.to_string(),
            objects_listed: objects.len(),
            unparsed_keys: classification.unparsed,
            buckets_eligible: classification.eligible.len(),
            ..Default::default()
        };

        let existing = self.existing_archives(channel).await;
        let mut deleted: HashSet<String> = HashSet::new();

        for (time_bucket, keys) in &classification.eligible {
            let archive_key = time_bucket.archive_key();
            let missing: Vec<usize> = existing
                .iter()
                .enumerate()
                .filter(|(_, archives)| !archives.contains(&archive_key))
                .map(|(idx, _)| idx)
                .collect();
            report.already_archived += self.destinations.len() - missing.len();

            // 上传完成但源分片未删除（上次运行中断），这里补删
            if missing.is_empty() {
                debug!(bucket = %time_bucket, "Bucket already archived on every destination, clearing hot segments");
                report.buckets_skipped += 1;
                let (removed, failed) = self.delete_objects(keys).await;
                report.segments_deleted += removed.len();
                report.failed_deletes += failed;
                deleted.extend(removed);
                continue;
            }

            match self.process_bucket(time_bucket, keys, &missing).await {
                Ok(outcome) => {
                    report.uploads += outcome.uploads;
                    report.failed_uploads += outcome.failed_uploads;
                    report.segments_deleted += outcome.deleted.len();
                    report.failed_deletes += outcome.failed_deletes;
                    if outcome.undersized {
                        report.buckets_undersized += 1;
                    } else if outcome.failed_uploads > 0 {
                        report.buckets_failed += 1;
                    } else {
                        report.buckets_archived += 1;
                    }
                    deleted.extend(outcome.deleted);
                }
                Err(e) => {
                    error!(bucket = %time_bucket, error = %e, "Bucket compaction failed");
                    report.buckets_failed += 1;
                }
            }
        }

        let garbage: Vec<String> = classification
            .garbage
            .into_iter()
            .filter(|key| !deleted.contains(key))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let (garbage_deleted, failed) = self.delete_objects(&garbage).await;
        report.garbage_deleted = garbage_deleted.len();
        report.failed_deletes += failed;

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            channel = %channel,
            archived = report.buckets_archived,
            skipped = report.buckets_skipped,
            undersized = report.buckets_undersized,
            failed = report.buckets_failed,
            uploads = report.uploads,
            segments_deleted = report.segments_deleted,
            garbage_deleted = report.garbage_deleted,
            duration_ms = report.duration_ms,
            "Compaction completed"
        );

        Ok(report)
    }

    /// 各目标上已有的归档键
    ///
    /// 列出失败的目标视为没有任何归档，本轮会尝试上传。
    async fn existing_archives(&self, channel: &str) -> Vec<HashSet<String>> {
        let prefix = format!("{}/", channel);
        let mut existing = Vec::with_capacity(self.destinations.len());

        for (kind, store) in &self.destinations {
            match store.list(&self.bucket, &prefix).await {
                Ok(objects) => existing.push(
                    objects
                        .into_iter()
                        .map(|meta| meta.key)
                        .filter(|key| key.ends_with(".tar.gz"))
                        .collect(),
                ),
                Err(e) => {
                    warn!(destination = %kind, error = %e, "Failed to list archives, treating destination as empty");
                    existing.push(HashSet::new());
                }
            }
        }

        existing
    }

    async fn process_bucket(
        &self,
        time_bucket: &TimeBucket,
        keys: &[String],
        missing: &[usize],
    ) -> Result<BucketOutcome> {
        info!(bucket = %time_bucket, segments = keys.len(), "Compacting bucket");

        let scratch = self.config.scratch_dir.join(time_bucket.id().replace('|', "_"));
        fs::create_dir_all(&scratch).await?;

        let result = self.archive_and_upload(time_bucket, keys, missing, &scratch).await;

        if let Err(e) = fs::remove_dir_all(&scratch).await {
            warn!(path = %scratch.display(), error = %e, "Failed to remove scratch directory");
        }

        result
    }

    async fn archive_and_upload(
        &self,
        time_bucket: &TimeBucket,
        keys: &[String],
        missing: &[usize],
        scratch: &Path,
    ) -> Result<BucketOutcome> {
        let members = self.download_members(keys, scratch).await?;
        if members.is_empty() {
            return Err(CompactionError::bucket(time_bucket, "no segment could be downloaded"));
        }

        let output = scratch.join(format!("{:02}.tar.gz", time_bucket.hour));
        let size = build_archive_blocking(members, output.clone())
            .await
            .map_err(|e| CompactionError::bucket(time_bucket, e))?;

        let mut outcome = BucketOutcome::default();

        if size < self.config.min_archive_bytes {
            warn!(
                bucket = %time_bucket,
                size,
                min = self.config.min_archive_bytes,
                "Archive is below minimum size, not uploading"
            );
            outcome.undersized = true;
            if self.config.delete_undersized_sources {
                let (deleted, failed) = self.delete_objects(keys).await;
                outcome.deleted = deleted;
                outcome.failed_deletes = failed;
            }
            return Ok(outcome);
        }

        let archive_key = time_bucket.archive_key();
        for &idx in missing {
            let (kind, store) = &self.destinations[idx];
            match store.put_file(&self.bucket, &archive_key, &output).await {
                Ok(()) => {
                    info!(destination = %kind, key = %archive_key, size, "Archive uploaded");
                    outcome.uploads += 1;
                }
                Err(e) => {
                    warn!(destination = %kind, key = %archive_key, error = %e, "Archive upload failed");
                    outcome.failed_uploads += 1;
                }
            }
        }

        if outcome.failed_uploads == 0 {
            let (deleted, failed) = self.delete_objects(keys).await;
            outcome.deleted = deleted;
            outcome.failed_deletes = failed;
        } else {
            warn!(bucket = %time_bucket, "Keeping source segments until every destination has the archive");
        }

        Ok(outcome)
    }

    /// 并发下载桶内分片到临时目录
    async fn download_members(&self, keys: &[String], scratch: &Path) -> Result<Vec<ArchiveMember>> {
        let results: Vec<Result<Option<ArchiveMember>>> = stream::iter(keys.iter())
            .map(|key| self.download_member(key, scratch))
            .buffer_unordered(self.config.io_workers)
            .boxed()
            .collect()
            .await;

        let mut members = Vec::with_capacity(results.len());
        for result in results {
            if let Some(member) = result? {
                members.push(member);
            }
        }
        members.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(members)
    }

    /// 分片已被删除时返回 `None`
    async fn download_member(&self, key: &str, scratch: &Path) -> Result<Option<ArchiveMember>> {
        let member = ArchiveMember::for_key(key, scratch);
        match self.source.get(&self.bucket, key).await {
            Ok(data) => {
                fs::write(&member.path, &data).await?;
                Ok(Some(member))
            }
            Err(e) if e.is_not_found() => {
                warn!(key = %key, "Segment vanished before download");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 并发删除热存储对象，返回（已删除键, 失败数）
    ///
    /// 对象已不存在视为删除成功。
    async fn delete_objects(&self, keys: &[String]) -> (Vec<String>, usize) {
        let source = &self.source;
        let bucket = self.bucket.as_str();

        let results: Vec<(String, airwave_storage::Result<()>)> = stream::iter(keys.iter())
            .map(|key| async move { (key.clone(), source.delete(bucket, key).await) })
            .buffer_unordered(self.config.io_workers)
            .boxed()
            .collect()
            .await;

        let mut deleted = Vec::with_capacity(results.len());
        let mut failed = 0;
        for (key, result) in results {
            match result {
                Ok(()) => deleted.push(key),
                Err(e) if e.is_not_found() => {
                    debug!(key = %key, "Object already gone");
                    deleted.push(key);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to delete object");
                    failed += 1;
                }
            }
        }
        (deleted, failed)
    }
}
