use airwave_compaction::Compactor;
use airwave_config::AppConfig;
use airwave_ingest::{
    FfmpegTranscoder, HttpFetcher, IngestContext, PassthroughTranscoder, SegmentIngestor,
    Transcoder,
};
use airwave_notify::{Notifier, NotifyManager, NotifyMessage};
use airwave_reconcile::{ReconcileError, Reconciler, WantedStore};
use airwave_storage::{BackendKind, BackendRegistry};
use anyhow::{anyhow, bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// 为每个频道启动采集循环，Ctrl-C 后等待全部退出
pub async fn ingest(config: &AppConfig, only: Option<&str>) -> Result<()> {
    let channels: Vec<_> = match only {
        Some(id) => vec![config
            .channel(id)
            .cloned()
            .ok_or_else(|| anyhow!("Channel {} is not configured", id))?],
        None => config.channels.clone(),
    };
    if channels.is_empty() {
        bail!("No channels configured");
    }

    let registry = BackendRegistry::from_config(&config.storage)?;
    let notifier = Arc::new(NotifyManager::from_config(&config.notify).await);
    let fetcher = Arc::new(HttpFetcher::new(
        Duration::from_secs(config.ingest.request_timeout_secs),
        config.ingest.accept_invalid_certs,
    )?);
    let transcoder: Arc<dyn Transcoder> = if config.ingest.transcode {
        Arc::new(FfmpegTranscoder::new(config.ingest.ffmpeg.clone()))
    } else {
        Arc::new(PassthroughTranscoder::new())
    };
    let compactor = Arc::new(Compactor::new(
        &registry,
        config.storage.bucket.clone(),
        config.compaction.clone(),
    )?);

    let ctx = IngestContext {
        bucket: config.storage.bucket.clone(),
        hot: registry.get(BackendKind::Hot)?,
        fetcher,
        transcoder,
        notifier,
        compactor: Some(compactor),
        state_dir: config.state_dir.clone(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = JoinSet::new();
    for channel in channels {
        let ingestor = SegmentIngestor::new(channel, config.ingest.clone(), ctx.clone()).await?;
        tasks.spawn(ingestor.run(shutdown_rx.clone()));
    }
    info!(channels = tasks.len(), "Ingest started");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, stopping ingest loops");
    let _ = shutdown_tx.send(true);

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Ingest task aborted");
        }
    }

    info!("Ingest stopped");
    Ok(())
}

/// 立即压缩一个频道
pub async fn compact(config: &AppConfig, channel: &str) -> Result<()> {
    let schedule = config
        .channel(channel)
        .map(|c| c.schedule)
        .ok_or_else(|| anyhow!("Channel {} is not configured", channel))?;

    let registry = BackendRegistry::from_config(&config.storage)?;
    let compactor = Compactor::new(&registry, config.storage.bucket.clone(), config.compaction.clone())?;

    let report = compactor.compact(channel, &schedule).await?;
    info!(
        channel = %report.channel,
        archived = report.buckets_archived,
        skipped = report.buckets_skipped,
        failed = report.buckets_failed,
        segments_deleted = report.segments_deleted,
        garbage_deleted = report.garbage_deleted,
        duration_ms = report.duration_ms,
        "Compaction finished"
    );

    if report.buckets_failed > 0 {
        warn!(channel = %channel, failed = report.buckets_failed, "Some buckets failed and will be retried next run");
    }
    Ok(())
}

/// 同步目标存储层，超出预算时告警并返回错误
pub async fn reconcile(config: &AppConfig, destination: Option<BackendKind>) -> Result<()> {
    let destination = destination.unwrap_or(config.reconcile.destination);

    let registry = BackendRegistry::from_config(&config.storage)?;
    let store = WantedStore::connect(&config.reconcile.database_url).await?;
    let reconciler = Reconciler::new(
        registry,
        store,
        config.storage.bucket.clone(),
        config.reconcile.budget_bytes,
    );

    match reconciler.converge(destination).await {
        Ok(report) => {
            info!(
                destination = %report.destination,
                copied = report.copied,
                deleted = report.deleted,
                failed_copies = report.failed_copies,
                failed_deletes = report.failed_deletes,
                "Reconcile finished"
            );
            Ok(())
        }
        Err(e) => {
            if matches!(e, ReconcileError::BudgetExceeded { .. }) {
                let notifier = NotifyManager::from_config(&config.notify).await;
                let message = NotifyMessage::critical(format!("Airwave reconcile {}", destination), e.to_string())
                    .with_source("reconcile");
                if let Err(send_err) = notifier.send(&message).await {
                    warn!(error = %send_err, "Failed to send reconcile alert");
                }
            }
            Err(e.into())
        }
    }
}
