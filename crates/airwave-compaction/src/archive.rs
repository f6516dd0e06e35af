use crate::error::{CompactionError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::{Path, PathBuf};

/// 归档成员：本地文件及其在归档中的条目名
#[derive(Debug, Clone)]
pub struct ArchiveMember {
    pub name: String,
    pub path: PathBuf,
}

impl ArchiveMember {
    /// 条目名取对象键的 basename
    pub fn for_key(key: &str, scratch_dir: &Path) -> Self {
        let name = key.rsplit('/').next().unwrap_or(key).to_string();
        Self {
            path: scratch_dir.join(&name),
            name,
        }
    }
}

/// 构建 gzip-tar 归档，返回归档文件大小
///
/// 同步 IO，调用方应放在 `spawn_blocking` 中执行。
pub fn build_archive(members: &[ArchiveMember], output: &Path) -> Result<u64> {
    let file = File::create(output)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for member in members {
        builder
            .append_path_with_name(&member.path, &member.name)
            .map_err(|e| CompactionError::Archive(format!("{}: {}", member.name, e)))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| CompactionError::Archive(e.to_string()))?;
    let file = encoder
        .finish()
        .map_err(|e| CompactionError::Archive(e.to_string()))?;
    file.sync_all()?;

    Ok(std::fs::metadata(output)?.len())
}

/// 异步包装
pub async fn build_archive_blocking(members: Vec<ArchiveMember>, output: PathBuf) -> Result<u64> {
    tokio::task::spawn_blocking(move || build_archive(&members, &output))
        .await
        .map_err(|e| CompactionError::Archive(format!("archive task failed: {}", e)))?
}
