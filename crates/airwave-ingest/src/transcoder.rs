use crate::error::{IngestError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error};

/// 音频转码能力：原始分片 -> 单声道 16 kHz
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn encode(&self, input: Bytes) -> Result<Bytes>;

    /// 输出文件扩展名
    fn extension(&self) -> &str {
        "aac"
    }
}

/// ffmpeg 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FfmpegConfig {
    #[serde(default = "default_binary")]
    pub binary: PathBuf,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_channels")]
    pub channels: u32,
}

fn default_binary() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_channels() -> u32 {
    1
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
        }
    }
}

/// 通过 stdin/stdout 管道调用 ffmpeg，输出 ADTS AAC
pub struct FfmpegTranscoder {
    config: FfmpegConfig,
}

impl FfmpegTranscoder {
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }

    fn build_args(&self) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
            "-f".to_string(),
            "adts".to_string(),
            "-ar".to_string(),
            self.config.sample_rate.to_string(),
            "-ac".to_string(),
            self.config.channels.to_string(),
            "pipe:1".to_string(),
        ]
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn encode(&self, input: Bytes) -> Result<Bytes> {
        let mut child = Command::new(&self.config.binary)
            .args(self.build_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!(binary = %self.config.binary.display(), error = %e, "Failed to spawn ffmpeg");
                IngestError::download("ffmpeg", format!("failed to spawn: {}", e))
            })?;

        // 单独任务写 stdin，避免输出管道写满时互相阻塞
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| IngestError::download("ffmpeg", "stdin not captured"))?;
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| IngestError::download("ffmpeg", e))?;
        writer
            .await
            .map_err(|e| IngestError::download("ffmpeg", e))?
            .map_err(|e| IngestError::download("ffmpeg", format!("stdin write failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IngestError::download(
                "ffmpeg",
                format!("exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        debug!(bytes = output.stdout.len(), "Segment transcoded");
        Ok(Bytes::from(output.stdout))
    }
}

/// 不转码，原样保存
#[derive(Debug, Default, Clone)]
pub struct PassthroughTranscoder {
    extension: Option<String>,
}

impl PassthroughTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extension(extension: impl Into<String>) -> Self {
        Self {
            extension: Some(extension.into()),
        }
    }
}

#[async_trait]
impl Transcoder for PassthroughTranscoder {
    async fn encode(&self, input: Bytes) -> Result<Bytes> {
        Ok(input)
    }

    fn extension(&self) -> &str {
        self.extension.as_deref().unwrap_or("aac")
    }
}
