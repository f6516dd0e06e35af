use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

/// 期望对象记录
///
/// `src` 列保存来源后端名称，`dst` 列保存对象键（两端相同）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WantedObject {
    pub id: i64,
    pub source: String,
    pub key: String,
}

/// SQLite 期望对象表
pub struct WantedStore {
    pool: SqlitePool,
}

impl WantedStore {
    /// 连接数据库，表不存在时创建
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS objects (
                id INTEGER PRIMARY KEY,
                src TEXT,
                dst TEXT,
                active INTEGER
            )
            "#,
        )
        .execute(&pool)
        .await?;

        info!(database = %database_url, "Wanted-object store initialized");
        Ok(Self { pool })
    }

    /// 所有 `active = 1` 的记录，按 id 排序
    pub async fn active_objects(&self) -> Result<Vec<WantedObject>> {
        let rows = sqlx::query("SELECT id, src, dst FROM objects WHERE active = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let objects = rows
            .iter()
            .map(|row| WantedObject {
                id: row.get("id"),
                source: row.get::<Option<String>, _>("src").unwrap_or_default(),
                key: row.get::<Option<String>, _>("dst").unwrap_or_default(),
            })
            .filter(|object| !object.key.is_empty())
            .collect::<Vec<_>>();

        debug!(count = objects.len(), "Active wanted objects loaded");
        Ok(objects)
    }

    /// 新增一条有效记录，返回 id
    pub async fn insert(&self, source: &str, key: &str) -> Result<i64> {
        let result = sqlx::query("INSERT INTO objects (src, dst, active) VALUES (?, ?, 1)")
            .bind(source)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// 将某个对象键的记录全部置为无效，返回影响行数
    pub async fn deactivate(&self, key: &str) -> Result<u64> {
        let result = sqlx::query("UPDATE objects SET active = 0 WHERE dst = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
