//! 手动记录 - 业务能力层
//!
//! 把人工发出的帖子补记到发帖历史（`auto_posted = false`），
//! 这样调度器的冷却和角度轮换也会算上它。

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{AppResult, HistoryError};
use crate::models::post_record::{parse_post_url, Angle, PostRecord};
use crate::services::history_store::HistoryStore;
use crate::services::metrics_client::PostMetricsSource;

/// 手动记录的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ManualLogOutcome {
    Recorded(PostRecord),
    /// 帖子 ID 已在历史中
    AlreadyLogged { post_id: String },
}

/// 记录一条手动发出的帖子
///
/// URL 解析失败返回 [`HistoryError::UnparseableUrl`]；获取初始指标失败只记日志
pub async fn log_manual_post(
    store: &HistoryStore,
    metrics: &dyn PostMetricsSource,
    url: &str,
    angle: Angle,
    draft_file: Option<&str>,
) -> AppResult<ManualLogOutcome> {
    let (community, post_id) = parse_post_url(url).ok_or_else(|| HistoryError::UnparseableUrl {
        url: url.to_string(),
    })?;

    let history = store.load().await?;
    if history.iter().any(|r| r.post_id == post_id) {
        warn!("⚠️ 帖子 {} 已在记录中，跳过", post_id);
        return Ok(ManualLogOutcome::AlreadyLogged { post_id });
    }

    let now = Utc::now();
    let mut record = PostRecord::new(&post_id, url, &community, "", angle, now)?.manual();
    if let Some(draft) = draft_file {
        record = record.with_draft_file(draft);
    }

    info!("正在获取帖子初始数据...");
    match metrics.fetch_post_metrics(url).await {
        Ok(m) => {
            record.title = m.title;
            record.performance.score = Some(m.score);
            record.performance.upvote_ratio = Some(m.upvote_ratio);
            record.performance.num_comments = Some(m.num_comments);
            record.performance.last_checked = Some(now);
            info!("✅ 初始数据: score={}, comments={}", m.score, m.num_comments);
        }
        Err(e) => warn!("⚠️ 无法获取初始数据（帖子可能刚发布）: {}", e),
    }

    store.append(record.clone()).await?;
    info!("✅ 已记录: {} → {}", record.subreddit, record.post_id);
    Ok(ManualLogOutcome::Recorded(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, AppError};
    use crate::services::metrics_client::PostMetrics;
    use async_trait::async_trait;

    struct OfflineMetrics;

    #[async_trait]
    impl PostMetricsSource for OfflineMetrics {
        async fn fetch_post_metrics(&self, post_url: &str) -> AppResult<PostMetrics> {
            Err(ApiError::RequestFailed {
                endpoint: post_url.to_string(),
                message: "offline".to_string(),
            }
            .into())
        }
    }

    #[tokio::test]
    async fn records_once_then_skips_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("posted-log.json"));
        let url = "https://www.reddit.com/r/SideProject/comments/abc123/my_post/";

        let first = log_manual_post(&store, &OfflineMetrics, url, Angle::C, Some("drafts/x.md"))
            .await
            .unwrap();
        let ManualLogOutcome::Recorded(record) = first else {
            panic!("expected a new record");
        };
        assert_eq!(record.subreddit, "r/SideProject");
        assert!(!record.auto_posted);
        assert_eq!(record.draft_file, "drafts/x.md");

        let second = log_manual_post(&store, &OfflineMetrics, url, Angle::C, None)
            .await
            .unwrap();
        assert_eq!(
            second,
            ManualLogOutcome::AlreadyLogged {
                post_id: "abc123".to_string()
            }
        );
        assert_eq!(store.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_url_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("posted-log.json"));
        let err = log_manual_post(&store, &OfflineMetrics, "https://www.reddit.com/r/x/", Angle::A, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::History(HistoryError::UnparseableUrl { .. })));
    }
}
