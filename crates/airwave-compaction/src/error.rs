use airwave_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompactionError {
    /// 单个时间桶处理失败，记录后跳过
    #[error("Bucket {bucket} failed: {reason}")]
    Bucket { bucket: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid compaction configuration: {0}")]
    Config(String),
}

impl CompactionError {
    pub fn bucket(bucket: impl ToString, reason: impl ToString) -> Self {
        CompactionError::Bucket {
            bucket: bucket.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CompactionError>;
