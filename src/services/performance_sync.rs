//! 表现刷新 - 业务能力层
//!
//! 批量刷新已记录帖子的分数 / 点赞率 / 评论数。
//! 48 小时内查过的跳过（`force` 时全部刷新）；单条失败不影响其余。
//!
//! 刷新期间可能有发帖运行往历史里追加记录，所以写回前重新读取文件，
//! 只把刷新过的字段按 post_id 合并进去。

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{ApiError, AppError, AppResult};
use crate::models::post_record::{PostRecord, PostStatus};
use crate::services::history_store::HistoryStore;
use crate::services::metrics_client::PostMetricsSource;
use crate::utils::logging::truncate_text;

/// 超过这个时长才重新查
pub const STALE_AFTER_HOURS: i64 = 48;

/// 刷新结果汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub total: usize,
    pub checked: usize,
    pub updated: usize,
    pub failed: usize,
    pub marked_deleted: usize,
}

/// 是否需要刷新
pub fn needs_update(record: &PostRecord, force: bool, now: DateTime<Utc>) -> bool {
    if force {
        return true;
    }
    if record.status == PostStatus::Deleted {
        return false;
    }
    match record.performance.last_checked {
        None => true,
        Some(checked) => now - checked > chrono::Duration::hours(STALE_AFTER_HOURS),
    }
}

/// 刷新全部需要刷新的记录并写回
pub async fn sync_performance(
    store: &HistoryStore,
    metrics: &dyn PostMetricsSource,
    force: bool,
    pacing: Duration,
    now: DateTime<Utc>,
) -> AppResult<SyncSummary> {
    let mut records = store.load().await?;
    let mut summary = SyncSummary {
        total: records.len(),
        ..SyncSummary::default()
    };

    let targets: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| needs_update(r, force, now))
        .map(|(i, _)| i)
        .collect();
    info!("共 {} 条记录，需要刷新 {} 条", records.len(), targets.len());
    let mut changed: Vec<usize> = Vec::with_capacity(targets.len());

    for (n, idx) in targets.iter().enumerate() {
        if n > 0 && !pacing.is_zero() {
            sleep(pacing).await;
        }

        let record = &mut records[*idx];
        summary.checked += 1;
        info!(
            "刷新: {} - {}",
            record.subreddit,
            truncate_text(if record.title.is_empty() { "(无标题)" } else { &record.title }, 50)
        );

        match metrics.fetch_post_metrics(&record.url).await {
            Ok(m) => {
                record.performance.score = Some(m.score);
                record.performance.upvote_ratio = Some(m.upvote_ratio);
                record.performance.num_comments = Some(m.num_comments);
                record.performance.last_checked = Some(now);
                if record.title.is_empty() && !m.title.is_empty() {
                    record.title = m.title;
                }
                if m.is_removed && record.status != PostStatus::Deleted {
                    record.status = PostStatus::Deleted;
                    summary.marked_deleted += 1;
                    warn!("  → 已被移除，标记为 deleted");
                }
                info!(
                    "  ✅ Score: {} | Comments: {} | Upvote: {}%",
                    m.score,
                    m.num_comments,
                    (m.upvote_ratio * 100.0).round()
                );
                summary.updated += 1;
                changed.push(*idx);
            }
            Err(e) => {
                warn!("  ⚠️ 失败: {}", e);
                if matches!(e, AppError::Api(ApiError::NotFound { .. }))
                    && record.status != PostStatus::Deleted
                {
                    record.status = PostStatus::Deleted;
                    summary.marked_deleted += 1;
                    changed.push(*idx);
                    warn!("  → 标记为 deleted");
                }
                summary.failed += 1;
            }
        }
    }

    if changed.is_empty() {
        return Ok(summary);
    }
    let refreshed: Vec<&PostRecord> = changed.iter().map(|idx| &records[*idx]).collect();
    let latest = store.load().await?;
    store.save(&merge_refreshed(latest, &refreshed)).await?;
    Ok(summary)
}

/// 把刷新结果按 post_id 合并进最新的历史；刷新期间被删掉的记录不再写回
pub fn merge_refreshed(mut latest: Vec<PostRecord>, refreshed: &[&PostRecord]) -> Vec<PostRecord> {
    for fresh in refreshed {
        let Some(target) = latest.iter_mut().find(|r| r.post_id == fresh.post_id) else {
            warn!("记录 {} 在刷新期间已被移出历史，跳过写回", fresh.post_id);
            continue;
        };
        target.performance = fresh.performance.clone();
        target.status = fresh.status;
        if target.title.is_empty() {
            target.title = fresh.title.clone();
        }
    }
    latest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::post_record::Angle;
    use crate::services::metrics_client::PostMetrics;
    use async_trait::async_trait;

    /// 按 URL 中的关键字返回不同结果
    struct FakeMetrics;

    #[async_trait]
    impl PostMetricsSource for FakeMetrics {
        async fn fetch_post_metrics(&self, post_url: &str) -> AppResult<PostMetrics> {
            if post_url.contains("gone") {
                return Err(ApiError::NotFound {
                    endpoint: post_url.to_string(),
                }
                .into());
            }
            if post_url.contains("flaky") {
                return Err(ApiError::RateLimited {
                    endpoint: post_url.to_string(),
                    retry_after: 60,
                }
                .into());
            }
            Ok(PostMetrics {
                score: 42,
                upvote_ratio: 0.9,
                num_comments: 7,
                title: "Fetched title".to_string(),
                is_removed: post_url.contains("removed"),
                ..PostMetrics::default()
            })
        }
    }

    fn record(id: &str) -> PostRecord {
        PostRecord::new(
            id,
            format!("https://www.reddit.com/r/rust/comments/{id}/"),
            "r/rust",
            "",
            Angle::A,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn staleness_window() {
        let now = Utc::now();
        let mut r = record("a");
        assert!(needs_update(&r, false, now));

        r.performance.last_checked = Some(now - chrono::Duration::hours(2));
        assert!(!needs_update(&r, false, now));
        assert!(needs_update(&r, true, now));

        r.performance.last_checked = Some(now - chrono::Duration::hours(49));
        assert!(needs_update(&r, false, now));

        r.status = PostStatus::Deleted;
        assert!(!needs_update(&r, false, now));
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("posted-log.json"));
        store
            .save(&[record("ok1"), record("gone2"), record("flaky3"), record("removed4")])
            .await
            .unwrap();

        let summary = sync_performance(&store, &FakeMetrics, false, Duration::ZERO, Utc::now())
            .await
            .unwrap();
        assert_eq!(summary.checked, 4);
        assert_eq!(summary.updated, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.marked_deleted, 2);

        let records = store.load().await.unwrap();
        assert_eq!(records[0].performance.score, Some(42));
        assert_eq!(records[0].title, "Fetched title");
        assert_eq!(records[1].status, PostStatus::Deleted);
        assert_eq!(records[2].status, PostStatus::Active);
        assert!(records[2].performance.last_checked.is_none());
        assert_eq!(records[3].status, PostStatus::Deleted);
    }

    /// 第一次查询时模拟另一次运行往历史里追加一条
    struct AppendsDuringSync {
        store: HistoryStore,
        appended: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl PostMetricsSource for AppendsDuringSync {
        async fn fetch_post_metrics(&self, _post_url: &str) -> AppResult<PostMetrics> {
            if !self.appended.swap(true, std::sync::atomic::Ordering::SeqCst) {
                self.store.append(record("late9")).await?;
            }
            Ok(PostMetrics {
                score: 3,
                upvote_ratio: 0.5,
                num_comments: 1,
                ..PostMetrics::default()
            })
        }
    }

    #[tokio::test]
    async fn records_appended_during_sync_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posted-log.json");
        let store = HistoryStore::new(&path);
        store.save(&[record("old1"), record("old2")]).await.unwrap();

        let metrics = AppendsDuringSync {
            store: HistoryStore::new(&path),
            appended: std::sync::atomic::AtomicBool::new(false),
        };
        let summary = sync_performance(&store, &metrics, false, Duration::ZERO, Utc::now())
            .await
            .unwrap();
        assert_eq!(summary.updated, 2);

        let records = store.load().await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.post_id.as_str()).collect();
        assert_eq!(ids, vec!["old1", "old2", "late9"]);
        assert_eq!(records[0].performance.score, Some(3));
        assert_eq!(records[1].performance.score, Some(3));
        assert!(records[2].performance.last_checked.is_none());
    }

    #[test]
    fn merge_skips_records_removed_meanwhile() {
        let mut fresh = record("b");
        fresh.performance.score = Some(9);
        fresh.title = "Fetched".to_string();

        let merged = merge_refreshed(vec![record("a")], &[&fresh]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].post_id, "a");
        assert_eq!(merged[0].performance.score, None);
    }
}
