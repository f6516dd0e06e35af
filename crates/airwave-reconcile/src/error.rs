use airwave_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    /// 待复制对象总大小超出预算，本轮不做任何修改
    #[error("Requested {requested} bytes exceeds the budget of {budget} bytes")]
    BudgetExceeded { requested: u64, budget: u64 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 期望对象记录的来源不是已配置的后端
    #[error("Unknown source backend {source_name} for {key}")]
    UnknownSource { source_name: String, key: String },
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
