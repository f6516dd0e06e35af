use thiserror::Error;

/// 存储层统一错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    /// 单对象不存在（get / head / delete）
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// 后端不可达（连接失败、认证失败等）
    #[error("Backend {backend} unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    #[error("Backend {backend} error: {message}")]
    Backend { backend: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    #[error("Invalid storage configuration: {0}")]
    Config(String),
}

impl StorageError {
    pub fn not_found(bucket: &str, key: &str) -> Self {
        StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    pub fn unavailable(backend: impl Into<String>, reason: impl ToString) -> Self {
        StorageError::Unavailable {
            backend: backend.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
