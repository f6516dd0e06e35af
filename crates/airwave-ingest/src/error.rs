use airwave_compaction::CompactionError;
use airwave_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    /// 播放列表获取或解析失败
    #[error("Playlist error: {0}")]
    Playlist(String),

    /// 分片下载或转码失败
    #[error("Cannot download {uri}: {reason}")]
    Download { uri: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// 本地状态文件读写失败
    #[error("State error: {0}")]
    State(String),

    #[error("Compaction error: {0}")]
    Compaction(#[from] CompactionError),
}

impl IngestError {
    pub fn download(uri: impl ToString, reason: impl ToString) -> Self {
        IngestError::Download {
            uri: uri.to_string(),
            reason: reason.to_string(),
        }
    }

    /// 告警限流使用的错误类别
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Playlist(_) => "playlist",
            IngestError::Download { .. } => "download",
            IngestError::Storage(_) => "storage",
            IngestError::State(_) => "state",
            IngestError::Compaction(_) => "compaction",
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
