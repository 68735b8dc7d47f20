//! 单帖处理流程 - 流程层
//!
//! 核心职责：定义"一个目标"的完整处理流程
//!
//! 流程顺序：
//! 1. 生成内容（带超时，可被中断）
//! 2. 写草稿（失败只告警）
//! 3. 发帖（dry-run 时模拟）
//! 4. 验证（由发帖适配器完成）
//! 5. 写入发帖历史（dry-run 不写）
//!
//! 中断只在发帖之前生效：一旦开始发帖，就一直走到写入历史为止。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{AppError, HistoryError, LlmError};
use crate::models::automation::ProductConfig;
use crate::models::post_record::PostRecord;
use crate::models::profile::CommunityProfile;
use crate::models::report::{OutcomeStatus, TargetOutcome};
use crate::services::content_generator::{ContentGenerator, GeneratedPost};
use crate::services::draft_writer::DraftWriter;
use crate::services::history_store::HistoryStore;
use crate::services::submission::{SubmitRequest, Submitter};
use crate::utils::logging::truncate_text;
use crate::workflow::post_ctx::PostCtx;

/// 被中断的目标在日报中的失败原因
pub const INTERRUPTED_REASON: &str = "运行被中断";

/// 单帖处理流程
///
/// - 编排 generate → draft → submit → verify → record
/// - 不持有浏览器资源，只依赖业务能力
/// - 生成失败 / 发帖失败折叠为失败结果；意外错误以 Err 交给编排层
pub struct PostFlow {
    generator: Arc<dyn ContentGenerator>,
    submitter: Arc<dyn Submitter>,
    drafts: DraftWriter,
    history: HistoryStore,
    generation_timeout: Duration,
}

impl PostFlow {
    pub fn new(
        generator: Arc<dyn ContentGenerator>,
        submitter: Arc<dyn Submitter>,
        drafts: DraftWriter,
        history: HistoryStore,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            generator,
            submitter,
            drafts,
            history,
            generation_timeout,
        }
    }

    /// 处理一个目标；`history` 是本目标开始前重新读到的发帖历史
    ///
    /// `cancel` 只在生成阶段和发帖前生效，被中断时返回原因为 [`INTERRUPTED_REASON`] 的失败结果
    pub async fn run(
        &self,
        ctx: &PostCtx,
        profile: &CommunityProfile,
        product: &ProductConfig,
        history: &[PostRecord],
        cancel: &CancellationToken,
    ) -> Result<TargetOutcome> {
        let mut outcome = TargetOutcome::pending(ctx.slot, &ctx.community, ctx.angle);

        // ========== 1. 生成内容 ==========
        info!("{} ✍️ 正在生成内容 (角度 {} - {})...", ctx, ctx.angle, ctx.angle.name());
        let generated = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("{} ⛔ 生成期间收到中断信号", ctx);
                return Ok(outcome.fail(INTERRUPTED_REASON));
            }
            generated = self.generate(profile, product, history, ctx) => generated?,
        };
        let generated = match generated {
            Some(post) => post,
            None => {
                error!("{} ❌ 内容生成失败（多次尝试均无法解析）", ctx);
                return Ok(outcome.fail("内容生成失败：多次尝试均无法解析输出"));
            }
        };
        outcome.title = Some(generated.title.clone());
        outcome.attempts = Some(generated.attempts);
        info!(
            "{} ✓ 标题: {} (第 {} 次生成)",
            ctx,
            truncate_text(&generated.title, 60),
            generated.attempts
        );
        if !generated.quality_passed {
            warn!("{} ⚠️ 质量检查未完全通过: {}", ctx, generated.issues.join("; "));
        }

        // ========== 2. 写草稿 ==========
        let draft_file = match self
            .drafts
            .write(
                &ctx.community,
                ctx.angle,
                &generated.title,
                &generated.body,
                &draft_notes(&generated),
                ctx.date,
            )
            .await
        {
            Ok(path) => {
                let draft_file = path.display().to_string();
                info!("{} 📄 草稿: {}", ctx, draft_file);
                Some(draft_file)
            }
            Err(e) => {
                warn!("{} ⚠️ 保存草稿失败，继续发帖: {}", ctx, e);
                None
            }
        };
        outcome.draft_file = draft_file.clone();

        // 发帖之后不再响应中断
        if cancel.is_cancelled() {
            warn!("{} ⛔ 发帖前收到中断信号，跳过", ctx);
            return Ok(outcome.fail(INTERRUPTED_REASON));
        }

        // ========== 3. 发帖 + 验证 ==========
        let request = SubmitRequest {
            community: ctx.community.clone(),
            title: generated.title.clone(),
            body: generated.body.clone(),
            flair_hint: generated.flair.clone(),
            dry_run: ctx.dry_run,
        };
        let submitted = self.submitter.submit(&request).await;
        outcome.captcha_fallback = submitted.captcha_fallback;
        outcome.flair = submitted.flair.clone();

        if !submitted.success {
            let reason = submitted.error.unwrap_or_else(|| "未知错误".to_string());
            if submitted.captcha_fallback {
                warn!("{} 🧑 需要人工完成发帖: {}", ctx, reason);
            } else {
                error!("{} ❌ 发帖失败: {}", ctx, reason);
            }
            return Ok(outcome.fail(reason));
        }

        outcome.status = OutcomeStatus::Success;
        outcome.url = Some(submitted.url.clone());
        outcome.post_id = Some(submitted.post_id.clone());
        outcome.verified = Some(submitted.verified);

        // ========== 4. 记录 ==========
        if submitted.dry_run {
            info!("{} ✅ [DRY RUN] 模拟成功，不写入历史", ctx);
            return Ok(outcome);
        }

        let mut record = PostRecord::new(
            submitted.post_id,
            submitted.url,
            &ctx.community,
            generated.title,
            ctx.angle,
            Utc::now(),
        )?;
        if let Some(draft_file) = draft_file {
            record = record.with_draft_file(draft_file);
        }

        match self.history.append(record).await {
            Ok(()) => info!("{} ✅ 已记录到发帖历史", ctx),
            Err(AppError::History(HistoryError::Duplicate { post_id })) => {
                warn!("{} ⚠️ 帖子 {} 已在历史中，跳过记录", ctx, post_id);
            }
            // 帖子已经发出，记录失败不改变本目标的结果
            Err(e) => error!("{} ❌ 写入发帖历史失败: {}", ctx, e),
        }

        Ok(outcome)
    }

    async fn generate(
        &self,
        profile: &CommunityProfile,
        product: &ProductConfig,
        history: &[PostRecord],
        ctx: &PostCtx,
    ) -> Result<Option<GeneratedPost>> {
        let seconds = self.generation_timeout.as_secs();
        match timeout(
            self.generation_timeout,
            self.generator.generate(profile, product, history, ctx.angle),
        )
        .await
        {
            Ok(result) => result.context("内容生成失败"),
            Err(_) => Err(AppError::from(LlmError::Timeout { seconds }).into()),
        }
    }
}

fn draft_notes(post: &GeneratedPost) -> String {
    let mut notes = format!("Auto-generated in {} attempt(s).", post.attempts);
    if let Some(flair) = &post.flair {
        notes.push_str(&format!("\nSuggested flair: {}", flair));
    }
    if !post.quality_passed {
        notes.push_str("\nQuality issues:");
        for issue in &post.issues {
            notes.push_str(&format!("\n- {}", issue));
        }
    }
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::post_record::Angle;
    use crate::services::submission::SubmitOutcome;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    struct FixedGenerator(Option<GeneratedPost>);

    #[async_trait]
    impl ContentGenerator for FixedGenerator {
        async fn generate(
            &self,
            _profile: &CommunityProfile,
            _product: &ProductConfig,
            _history: &[PostRecord],
            _angle: Angle,
        ) -> Result<Option<GeneratedPost>> {
            Ok(self.0.clone())
        }
    }

    struct SlowGenerator;

    #[async_trait]
    impl ContentGenerator for SlowGenerator {
        async fn generate(
            &self,
            _profile: &CommunityProfile,
            _product: &ProductConfig,
            _history: &[PostRecord],
            _angle: Angle,
        ) -> Result<Option<GeneratedPost>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }
    }

    struct RecordingSubmitter {
        outcome: SubmitOutcome,
        requests: Mutex<Vec<SubmitRequest>>,
        /// 发帖时触发的中断（模拟验证等待期间按下 Ctrl-C）
        cancel_on_submit: Option<CancellationToken>,
    }

    impl RecordingSubmitter {
        fn new(outcome: SubmitOutcome) -> Self {
            Self {
                outcome,
                requests: Mutex::new(Vec::new()),
                cancel_on_submit: None,
            }
        }
    }

    #[async_trait]
    impl Submitter for RecordingSubmitter {
        async fn submit(&self, request: &SubmitRequest) -> SubmitOutcome {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(token) = &self.cancel_on_submit {
                token.cancel();
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.outcome.clone()
        }
    }

    fn posted() -> SubmitOutcome {
        SubmitOutcome {
            success: true,
            url: "https://www.reddit.com/r/SideProject/comments/abc123/x/".to_string(),
            post_id: "abc123".to_string(),
            verified: true,
            ..SubmitOutcome::default()
        }
    }

    fn profile() -> CommunityProfile {
        CommunityProfile::new("r/SideProject", 10)
    }

    fn post() -> GeneratedPost {
        GeneratedPost {
            title: "What I learned shipping a side project in 90 days".to_string(),
            body: "Body".to_string(),
            flair: Some("Showcase".to_string()),
            quality_passed: true,
            issues: Vec::new(),
            attempts: 1,
        }
    }

    fn ctx() -> PostCtx {
        PostCtx::new(
            1,
            1,
            "r/SideProject",
            Angle::B,
            NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            false,
        )
    }

    fn flow(
        dir: &std::path::Path,
        generator: Arc<dyn ContentGenerator>,
        submitter: Arc<RecordingSubmitter>,
    ) -> PostFlow {
        PostFlow::new(
            generator,
            submitter,
            DraftWriter::new(dir.join("drafts")),
            HistoryStore::new(dir.join("posted-log.json")),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn success_is_recorded_with_draft_file() {
        let dir = tempfile::tempdir().unwrap();
        let submitter = Arc::new(RecordingSubmitter::new(posted()));
        let flow = flow(dir.path(), Arc::new(FixedGenerator(Some(post()))), submitter.clone());

        let outcome = flow
            .run(&ctx(), &profile(), &ProductConfig::default(), &[], &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.post_id.as_deref(), Some("abc123"));
        assert_eq!(submitter.requests.lock().unwrap()[0].flair_hint.as_deref(), Some("Showcase"));

        let history = HistoryStore::new(dir.path().join("posted-log.json")).load().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].angle, Angle::B);
        assert!(history[0].draft_file.ends_with("2026-03-10-sideproject.md"));
    }

    #[tokio::test]
    async fn unparseable_generation_fails_without_submitting() {
        let dir = tempfile::tempdir().unwrap();
        let submitter = Arc::new(RecordingSubmitter::new(SubmitOutcome::default()));
        let flow = flow(dir.path(), Arc::new(FixedGenerator(None)), submitter.clone());

        let outcome = flow
            .run(&ctx(), &profile(), &ProductConfig::default(), &[], &CancellationToken::new())
            .await
            .unwrap();

        assert!(!outcome.is_success());
        assert!(outcome.error.is_some());
        assert!(submitter.requests.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_generation_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let submitter = Arc::new(RecordingSubmitter::new(SubmitOutcome::default()));
        let flow = flow(dir.path(), Arc::new(SlowGenerator), submitter);

        let err = flow
            .run(&ctx(), &profile(), &ProductConfig::default(), &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("超时"));
    }

    #[tokio::test]
    async fn interrupt_during_generation_skips_submission() {
        let dir = tempfile::tempdir().unwrap();
        let submitter = Arc::new(RecordingSubmitter::new(posted()));
        let flow = flow(dir.path(), Arc::new(SlowGenerator), submitter.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = flow
            .run(&ctx(), &profile(), &ProductConfig::default(), &[], &cancel)
            .await
            .unwrap();

        assert!(!outcome.is_success());
        assert_eq!(outcome.error.as_deref(), Some(INTERRUPTED_REASON));
        assert!(submitter.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn interrupt_after_submission_still_records_the_post() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let submitter = Arc::new(RecordingSubmitter {
            cancel_on_submit: Some(cancel.clone()),
            ..RecordingSubmitter::new(posted())
        });
        let flow = flow(dir.path(), Arc::new(FixedGenerator(Some(post()))), submitter);

        let outcome = flow
            .run(&ctx(), &profile(), &ProductConfig::default(), &[], &cancel)
            .await
            .unwrap();

        assert!(cancel.is_cancelled());
        assert!(outcome.is_success());
        let history = HistoryStore::new(dir.path().join("posted-log.json")).load().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].post_id, "abc123");
    }

    #[tokio::test]
    async fn draft_write_failure_does_not_block_posting() {
        let dir = tempfile::tempdir().unwrap();
        // drafts 位置被一个普通文件占住，目录创建必然失败
        std::fs::write(dir.path().join("drafts"), "not a dir").unwrap();
        let submitter = Arc::new(RecordingSubmitter::new(posted()));
        let flow = flow(dir.path(), Arc::new(FixedGenerator(Some(post()))), submitter.clone());

        let outcome = flow
            .run(&ctx(), &profile(), &ProductConfig::default(), &[], &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert!(outcome.draft_file.is_none());
        assert_eq!(submitter.requests.lock().unwrap().len(), 1);
        let history = HistoryStore::new(dir.path().join("posted-log.json")).load().await.unwrap();
        assert_eq!(history[0].draft_file, "");
    }
}
