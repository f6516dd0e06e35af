use crate::error::{IngestError, Result};
use crate::fetcher::MediaFetcher;
use crate::playlist::{segment_identity, Playlist};
use crate::state::{AlertRateLimiter, DailyCompletion};
use crate::transcoder::{FfmpegConfig, Transcoder};
use airwave_compaction::{Compactor, LiveSchedule};
use airwave_notify::{Notifier, NotifyMessage};
use airwave_storage::BlobStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use url::Url;

/// `[[channels]]` 配置项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// 频道标识，同时作为对象键前缀
    pub id: String,

    pub playlist_url: Url,

    #[serde(default)]
    pub schedule: LiveSchedule,
}

/// `[ingest]` 配置段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_download_workers")]
    pub download_workers: usize,

    /// 超过该时长没有新数据才告警，同时也是同类告警的最小间隔
    #[serde(default = "default_alert_interval_minutes")]
    pub alert_interval_minutes: i64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// 关闭后分片原样保存
    #[serde(default = "default_true")]
    pub transcode: bool,

    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_download_workers() -> usize {
    4
}

fn default_alert_interval_minutes() -> i64 {
    15
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            download_workers: default_download_workers(),
            alert_interval_minutes: default_alert_interval_minutes(),
            request_timeout_secs: default_request_timeout_secs(),
            accept_invalid_certs: false,
            transcode: true,
            ffmpeg: FfmpegConfig::default(),
        }
    }
}

/// 采集器依赖的外部能力
#[derive(Clone)]
pub struct IngestContext {
    pub bucket: String,
    pub hot: Arc<dyn BlobStore>,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub transcoder: Arc<dyn Transcoder>,
    pub notifier: Arc<dyn Notifier>,

    /// 非直播时段执行每日压缩，未配置时只休眠
    pub compactor: Option<Arc<Compactor>>,

    pub state_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Polling,
    Compacting,
    Sleeping,
}

impl fmt::Display for IngestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IngestState::Polling => "polling",
            IngestState::Compacting => "compacting",
            IngestState::Sleeping => "sleeping",
        };
        f.write_str(s)
    }
}

/// 热存储分片键 `channel/YYYY/MM/DD/HH_MM_SS_micro_<stem>_mono_16khz.<ext>`
pub fn segment_key(channel: &str, captured_at: DateTime<Utc>, identity: &str, extension: &str) -> String {
    let stem = identity.split('.').next().unwrap_or(identity);
    format!(
        "{}/{}_{:06}_{}_mono_16khz.{}",
        channel,
        captured_at.format("%Y/%m/%d/%H_%M_%S"),
        captured_at.timestamp_subsec_micros(),
        stem,
        extension
    )
}

/// 单频道采集器
///
/// 已见分片集合只保存在内存中，重启后清空；同一频道只允许运行一个实例。
pub struct SegmentIngestor {
    channel: ChannelConfig,
    config: IngestConfig,
    ctx: IngestContext,
    seen: HashSet<String>,
    permits: Arc<Semaphore>,
    alerts: AlertRateLimiter,
    completion: DailyCompletion,
    state: IngestState,
}

impl SegmentIngestor {
    pub async fn new(channel: ChannelConfig, config: IngestConfig, ctx: IngestContext) -> Result<Self> {
        let alert_interval = Duration::minutes(config.alert_interval_minutes);
        let alerts = AlertRateLimiter::load(
            ctx.state_dir.join(format!("{}.alerts.json", channel.id)),
            alert_interval,
        )
        .await?;
        let completion =
            DailyCompletion::load(ctx.state_dir.join(format!("{}.cache.json", channel.id))).await?;

        Ok(Self {
            permits: Arc::new(Semaphore::new(config.download_workers.max(1))),
            channel,
            config,
            ctx,
            seen: HashSet::new(),
            alerts,
            completion,
            state: IngestState::Polling,
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel.id
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// 运行直到收到停止信号
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(channel = %self.channel.id, url = %self.channel.playlist_url, "Starting ingest loop");

        let mut ticker = interval(std::time::Duration::from_secs(self.config.poll_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let previous = self.state;
                    let state = self.tick(Utc::now()).await;
                    if state != previous {
                        info!(channel = %self.channel.id, from = %previous, to = %state, "Ingest state changed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(channel = %self.channel.id, "Ingest loop stopped");
    }

    /// 执行一个周期：直播时段内轮询，时段外每天压缩一次
    pub async fn tick(&mut self, now: DateTime<Utc>) -> IngestState {
        if self.channel.schedule.is_live_at(now) {
            self.state = IngestState::Polling;
            match self.poll_once().await {
                Ok(0) => {}
                Ok(submitted) => debug!(channel = %self.channel.id, submitted, "Segments captured"),
                Err(e) => self.handle_failure(&e, now).await,
            }
        } else {
            self.state = self.run_daily_compaction(now).await;
        }
        self.state
    }

    /// 拉取播放列表并下载新分片，返回本轮提交的分片数
    ///
    /// 等待整批下载结束，返回遇到的第一个错误。
    pub async fn poll_once(&mut self) -> Result<usize> {
        let candidates = self.collect_candidates().await?;

        let mut tasks = JoinSet::new();
        for (uri, identity) in candidates {
            if !self.seen.insert(identity.clone()) {
                continue;
            }
            let job = SegmentJob {
                uri,
                identity,
                channel: self.channel.id.clone(),
                bucket: self.ctx.bucket.clone(),
                hot: self.ctx.hot.clone(),
                fetcher: self.ctx.fetcher.clone(),
                transcoder: self.ctx.transcoder.clone(),
                permits: self.permits.clone(),
            };
            tasks.spawn(job.run());
        }

        let submitted = tasks.len();
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(IngestError::download("download task", e)));
            if let Err(e) = result {
                error!(channel = %self.channel.id, error = %e, "Segment capture failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(submitted),
        }
    }

    /// 候选分片及其身份
    async fn collect_candidates(&self) -> Result<Vec<(Url, String)>> {
        let url = &self.channel.playlist_url;
        let text = self.ctx.fetcher.fetch_playlist(url).await?;

        match Playlist::parse(&text, url)? {
            Playlist::Media { segments } => Ok(segments
                .into_iter()
                .map(|uri| {
                    let identity = segment_identity(&uri, false);
                    (uri, identity)
                })
                .collect()),
            Playlist::Master { variants } => {
                let mut candidates = Vec::new();
                for variant in variants {
                    let text = self.ctx.fetcher.fetch_playlist(&variant).await?;
                    match Playlist::parse(&text, &variant)? {
                        Playlist::Media { segments } => {
                            candidates.extend(segments.into_iter().map(|uri| {
                                let identity = segment_identity(&uri, true);
                                (uri, identity)
                            }));
                        }
                        Playlist::Master { .. } => {
                            warn!(variant = %variant, "Nested master playlist ignored");
                        }
                    }
                }
                Ok(candidates)
            }
        }
    }

    async fn run_daily_compaction(&mut self, now: DateTime<Utc>) -> IngestState {
        let Some(compactor) = self.ctx.compactor.clone() else {
            return IngestState::Sleeping;
        };

        let today = now.date_naive();
        if self.completion.is_done(today) {
            debug!(channel = %self.channel.id, "Sleeping");
            return IngestState::Sleeping;
        }

        self.state = IngestState::Compacting;
        info!(channel = %self.channel.id, date = %today, "Running daily compaction");

        match compactor
            .compact_at(&self.channel.id, &self.channel.schedule, now)
            .await
        {
            Ok(_) => {
                if let Err(e) = self.completion.mark_done(today).await {
                    error!(channel = %self.channel.id, error = %e, "Failed to persist completion flag");
                }
            }
            Err(e) => {
                let err = IngestError::from(e);
                error!(channel = %self.channel.id, error = %err, "Daily compaction failed");
                self.alert(&err, now).await;
            }
        }

        IngestState::Sleeping
    }

    /// 失败只在数据确实停滞时告警
    async fn handle_failure(&mut self, err: &IngestError, now: DateTime<Utc>) {
        warn!(channel = %self.channel.id, kind = err.kind(), error = %err, "Ingest cycle failed");

        let stale = match self.is_stale(now).await {
            Ok(stale) => stale,
            Err(e) => {
                warn!(channel = %self.channel.id, error = %e, "Cannot check freshness, assuming stale");
                true
            }
        };

        if stale && self.channel.schedule.is_live_at(now) {
            self.alert(err, now).await;
        } else {
            debug!(channel = %self.channel.id, "Recent data present, alert skipped");
        }
    }

    /// 当天（UTC）最新对象是否早于告警间隔，当天无对象视为停滞
    pub async fn is_stale(&self, now: DateTime<Utc>) -> Result<bool> {
        let prefix = format!("{}/{}", self.channel.id, now.format("%Y/%m/%d"));
        let objects = self.ctx.hot.list(&self.ctx.bucket, &prefix).await?;

        let latest = objects.iter().map(|meta| meta.last_modified).max();
        Ok(match latest {
            Some(latest) => now - latest > Duration::minutes(self.config.alert_interval_minutes),
            None => true,
        })
    }

    async fn alert(&mut self, err: &IngestError, now: DateTime<Utc>) {
        let kind = err.kind();
        if !self.alerts.should_alert(kind, now) {
            debug!(channel = %self.channel.id, kind, "Alert suppressed");
            return;
        }

        let content = match err {
            IngestError::Compaction(_) => format!("Channel *{}*: {}", self.channel.id, err),
            _ => format!(
                "Channel *{}*: {} !!! No data in the last {} minutes.",
                self.channel.id, err, self.config.alert_interval_minutes
            ),
        };
        let message = NotifyMessage::error(format!("Airwave {}", self.channel.id), content)
            .with_source(self.channel.id.clone())
            .at(now);

        match self.ctx.notifier.send(&message).await {
            Ok(result) if result.success => {
                if let Err(e) = self.alerts.record(kind, now).await {
                    error!(channel = %self.channel.id, error = %e, "Failed to persist alert time");
                }
            }
            Ok(result) => {
                warn!(channel = %self.channel.id, reason = %result.message, "Alert not delivered");
            }
            Err(e) => warn!(channel = %self.channel.id, error = %e, "Failed to send alert"),
        }
    }
}

/// 单个分片的下载、转码、写入
struct SegmentJob {
    uri: Url,
    identity: String,
    channel: String,
    bucket: String,
    hot: Arc<dyn BlobStore>,
    fetcher: Arc<dyn MediaFetcher>,
    transcoder: Arc<dyn Transcoder>,
    permits: Arc<Semaphore>,
}

impl SegmentJob {
    async fn run(self) -> Result<String> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| IngestError::download(&self.uri, e))?;

        info!(channel = %self.channel, uri = %self.uri, "Downloading segment");
        let raw = self.fetcher.fetch_segment(&self.uri).await?;
        let captured_at = Utc::now();

        let encoded = self.transcoder.encode(raw).await.map_err(|e| match e {
            IngestError::Download { reason, .. } => IngestError::download(&self.uri, reason),
            other => other,
        })?;

        let key = segment_key(&self.channel, captured_at, &self.identity, self.transcoder.extension());
        self.hot.put(&self.bucket, &key, encoded).await?;
        debug!(channel = %self.channel, uri = %self.uri, key = %key, "Segment stored");
        Ok(key)
    }
}
