//! 发帖历史 - 业务能力层
//!
//! `posted-log.json` 是唯一的持久化历史，只追加。
//! 每次需要时都从磁盘重新读，不在内存里缓存。

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tokio::fs;
use tracing::debug;

use crate::error::{AppError, AppResult, HistoryError};
use crate::models::loaders::write_json_file;
use crate::models::post_record::PostRecord;
use crate::services::target_scheduler::count_submitted_today;

/// 发帖历史存储
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取全部记录；文件不存在视为空历史，结构损坏返回 [`HistoryError::Corrupted`]
    pub async fn load(&self) -> AppResult<Vec<PostRecord>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::file_read_failed(self.path.display().to_string(), e)),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let records: Vec<PostRecord> = serde_json::from_str(&content).map_err(|e| {
            AppError::History(HistoryError::Corrupted {
                path: self.path.display().to_string(),
                source: e,
            })
        })?;
        debug!("读取发帖历史 {} 条", records.len());
        Ok(records)
    }

    /// 覆盖写入全部记录
    pub async fn save(&self, records: &[PostRecord]) -> AppResult<()> {
        write_json_file(&self.path, records).await
    }

    /// 追加一条记录；帖子 ID 已存在时返回 [`HistoryError::Duplicate`]
    pub async fn append(&self, record: PostRecord) -> AppResult<()> {
        let mut records = self.load().await?;
        if records.iter().any(|r| r.post_id == record.post_id) {
            return Err(HistoryError::Duplicate {
                post_id: record.post_id,
            }
            .into());
        }
        records.push(record);
        self.save(&records).await
    }

    /// 今天已提交的帖子数（重新读盘）
    pub async fn count_today(&self, today: NaiveDate) -> AppResult<usize> {
        Ok(count_submitted_today(&self.load().await?, today))
    }
}
