//! 每日发帖运行器 - 编排层
//!
//! ## 职责
//!
//! 一次运行的完整状态机：
//!
//! ```text
//! 获取运行锁 → 选择目标 → [逐个目标: 生成 → 草稿 → 发帖 → 验证 → 记录] → 写日报 → 释放锁
//! ```
//!
//! ## 设计特点
//!
//! - **资源所有者**：唯一连接浏览器、构建各项能力的模块
//! - **严格串行**：目标逐个处理，两次发帖之间按配置等待
//! - **失败隔离**：单个目标的任何错误只记为该目标失败，继续下一个
//! - **每个目标前重新读历史**：本次运行已写入的记录对后续目标可见
//! - **可中断**：收到取消信号后停止等待 / 生成，照常写日报并释放锁

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::browser;
use crate::config::Config;
use crate::error::{AppError, AppResult, ConfigError, LockError};
use crate::infrastructure::ScriptChannel;
use crate::models::automation::{AutomationConfig, ProductConfig};
use crate::models::loaders::{load_automation_config, load_product_config, load_profiles};
use crate::models::profile::{community_key, prefixed_community, CommunityProfile};
use crate::models::report::{DailyRunReport, TargetOutcome};
use crate::orchestrator::run_lock::RunLock;
use crate::services::content_generator::LlmContentGenerator;
use crate::services::draft_writer::DraftWriter;
use crate::services::history_store::HistoryStore;
use crate::services::llm_service::LlmService;
use crate::services::metrics_client::{CommunityRulesSource, MetricsClient};
use crate::services::notifier::{DesktopNotifier, NoopNotifier, Notifier};
use crate::services::report_writer::ReportWriter;
use crate::services::submission::SubmissionAdapter;
use crate::services::target_scheduler::{count_submitted_today, select_targets};
use crate::utils::logging::{log_startup, log_target_start, print_final_stats};
use crate::workflow::{PostCtx, PostFlow};

/// 命令行传入的运行选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub dry_run: bool,
    /// 覆盖每日上限
    pub count: Option<u32>,
    /// 跳过两次发帖之间的等待
    pub no_wait: bool,
}

/// 运行终态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// 所有目标都成功
    AllSucceeded,
    /// 今天已经达到上限，无事可做
    QuotaReached,
    /// 至少一个目标失败
    SomeFailed,
    /// 被中断，未处理完全部目标
    Interrupted,
    /// 开始前就中止（配置 / 凭证 / 无可用目标 / 锁被占用 / 历史损坏）
    Aborted,
}

impl RunStatus {
    /// 进程退出码：0 成功，1 有失败，2 中止
    pub fn exit_code(self) -> u8 {
        match self {
            RunStatus::AllSucceeded | RunStatus::QuotaReached => 0,
            RunStatus::SomeFailed | RunStatus::Interrupted => 1,
            RunStatus::Aborted => 2,
        }
    }
}

/// 一次运行的结果
#[derive(Debug, Clone)]
pub struct RunResult {
    pub status: RunStatus,
    pub report: Option<DailyRunReport>,
    pub report_path: Option<PathBuf>,
    /// 中止原因
    pub reason: Option<String>,
}

impl RunResult {
    fn aborted(reason: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Aborted,
            report: None,
            report_path: None,
            reason: Some(reason.into()),
        }
    }

    fn quota_reached() -> Self {
        Self {
            status: RunStatus::QuotaReached,
            report: None,
            report_path: None,
            reason: None,
        }
    }
}

/// 每日运行器
pub struct DailyRunner {
    automation: AutomationConfig,
    product: ProductConfig,
    profiles_path: PathBuf,
    history: HistoryStore,
    reports: ReportWriter,
    flow: PostFlow,
    notifier: Arc<dyn Notifier>,
    lock: RunLock,
}

impl DailyRunner {
    /// 由已构建好的各项能力组装（测试里注入假实现）
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        automation: AutomationConfig,
        product: ProductConfig,
        profiles_path: impl Into<PathBuf>,
        history: HistoryStore,
        reports: ReportWriter,
        flow: PostFlow,
        notifier: Arc<dyn Notifier>,
        lock: RunLock,
    ) -> Self {
        Self {
            automation,
            product,
            profiles_path: profiles_path.into(),
            history,
            reports,
            flow,
            notifier,
            lock,
        }
    }

    /// 读取配置、解析凭证、连接浏览器，构建运行器
    ///
    /// 配置类错误在这里返回，运行还没开始
    pub async fn initialize(config: &Config, opts: &RunOptions) -> AppResult<Self> {
        let automation = load_automation_config(&config.automation_config_path()).await?;
        let notifier: Arc<dyn Notifier> = if automation.enable_notifications {
            Arc::new(DesktopNotifier)
        } else {
            Arc::new(NoopNotifier)
        };

        let product = match load_product_config(&config.product_config_path()).await? {
            Some(product) => product,
            None => {
                notifier.notify_failure("未找到产品配置");
                return Err(ConfigError::ProductConfigMissing {
                    path: config.product_config_path().display().to_string(),
                }
                .into());
            }
        };

        let api_key = match config.resolve_llm_api_key() {
            Ok(key) => key,
            Err(e) => {
                notifier.notify_failure("缺少 LLM API Key");
                return Err(e);
            }
        };

        let model = automation
            .content_model
            .clone()
            .unwrap_or_else(|| config.llm_model_name.clone());
        let llm = LlmService::new(&api_key, &config.llm_api_base_url, model);
        info!("🤖 内容生成模型: {}", llm.model_name());
        let metrics = Arc::new(MetricsClient::new(&config.public_api_base_url)?);

        let generator = LlmContentGenerator::new(
            llm,
            Some(metrics.clone() as Arc<dyn CommunityRulesSource>),
            DraftWriter::new(config.drafts_dir()),
            automation.content_retry_budget,
        );

        // dry-run 不需要浏览器
        let channel: Option<Arc<dyn ScriptChannel>> = if opts.dry_run || automation.dry_run {
            None
        } else {
            match browser::connect_session(config.browser_debug_port, &config.site_base_url).await {
                Ok(executor) => Some(Arc::new(executor) as Arc<dyn ScriptChannel>),
                Err(e) => {
                    warn!("⚠️ 浏览器连接失败，所有发帖都会失败: {}", e);
                    None
                }
            }
        };

        let submitter = SubmissionAdapter::new(channel, metrics.clone(), metrics, &config.site_base_url)
            .with_timings(config.token_wait(), config.submit_wait(), config.verify_delay());

        let flow = PostFlow::new(
            Arc::new(generator),
            Arc::new(submitter),
            DraftWriter::new(config.drafts_dir()),
            HistoryStore::new(config.history_path()),
            config.generation_timeout(),
        );

        Ok(Self::new(
            automation,
            product,
            config.profiles_path(),
            HistoryStore::new(config.history_path()),
            ReportWriter::new(config.automation_dir()),
            flow,
            notifier,
            RunLock::new(config.lock_path()),
        ))
    }

    /// 执行一次每日运行
    pub async fn run(&self, opts: &RunOptions, cancel: CancellationToken) -> RunResult {
        let dry_run = opts.dry_run || self.automation.dry_run;
        log_startup(dry_run);

        // ========== 获取运行锁 ==========
        let _guard = match self.lock.acquire() {
            Ok(guard) => guard,
            Err(AppError::Lock(LockError::AlreadyRunning { pid })) => {
                warn!("⚠️ 另一个实例正在运行 (pid: {})，本次退出", pid);
                return RunResult::aborted(format!("already running (pid {})", pid));
            }
            Err(e) => {
                error!("❌ 获取运行锁失败: {}", e);
                return RunResult::aborted(e.to_string());
            }
        };

        let today = Utc::now().date_naive();
        let started_at = Utc::now();
        let quota = opts.count.unwrap_or(self.automation.daily_quota) as usize;

        // ========== 选择目标 ==========
        let profiles = match load_profiles(&self.profiles_path).await {
            Ok(profiles) if !profiles.is_empty() => profiles,
            Ok(_) => {
                error!("❌ 没有社区档案");
                return RunResult::aborted(
                    ConfigError::ProfilesMissing {
                        path: self.profiles_path.display().to_string(),
                    }
                    .to_string(),
                );
            }
            Err(e) => {
                error!("❌ 读取社区档案失败: {}", e);
                return RunResult::aborted(e.to_string());
            }
        };

        let history = match self.history.load().await {
            Ok(history) => history,
            Err(e) => {
                error!("❌ {}", e);
                self.notifier.notify_failure("发帖历史已损坏，请运行 repair");
                return RunResult::aborted(e.to_string());
            }
        };

        let already = count_submitted_today(&history, today);
        if already >= quota {
            info!("✅ 今天已发 {} 篇，达到上限", already);
            return RunResult::quota_reached();
        }
        info!("📋 今天目标: {} 篇 (已发 {} 篇)", quota - already, already);

        let schedule_config = AutomationConfig {
            daily_quota: quota as u32,
            ..self.automation.clone()
        };
        let targets = select_targets(&profiles, &history, &schedule_config, today);
        if targets.is_empty() {
            error!("❌ 所有社区都在冷却期内");
            self.notifier.notify_failure("所有社区都在冷却期内");
            return RunResult::aborted("no eligible targets");
        }
        info!(
            "🎯 选定目标: {}",
            targets
                .iter()
                .map(|t| format!("{} ({})", t.community, t.angle))
                .collect::<Vec<_>>()
                .join(", ")
        );

        // ========== 逐个处理 ==========
        let total = targets.len();
        let pacing = self.automation.pacing();
        let mut outcomes: Vec<TargetOutcome> = Vec::with_capacity(total);
        let mut interrupted = false;

        for (i, target) in targets.iter().enumerate() {
            if cancel.is_cancelled() {
                interrupted = true;
                break;
            }

            let ctx = PostCtx::new(
                i + 1,
                total,
                prefixed_community(&target.community),
                target.angle,
                today,
                dry_run,
            );
            log_target_start(&ctx);

            // 每个目标前重新读历史
            let current = match self.history.load().await {
                Ok(current) => current,
                Err(e) => {
                    error!("{} ❌ 读取发帖历史失败: {}", ctx, e);
                    outcomes.push(TargetOutcome::pending(ctx.slot, &ctx.community, ctx.angle).fail(e.to_string()));
                    continue;
                }
            };
            if count_submitted_today(&current, today) >= quota {
                info!("{} ✅ 今天已达到上限，停止", ctx);
                break;
            }

            let profile = find_profile(&profiles, &target.community).unwrap_or(&target.profile);

            // 中断只在生成阶段生效，已经开始发帖的目标会走完记录
            let outcome = match self.flow.run(&ctx, profile, &self.product, &current, &cancel).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("{} ❌ 处理过程中发生错误: {:#}", ctx, e);
                    TargetOutcome::pending(ctx.slot, &ctx.community, ctx.angle).fail(format!("{:#}", e))
                }
            };
            outcomes.push(outcome);
            if cancel.is_cancelled() {
                warn!("{} ⛔ 运行被中断", ctx);
                interrupted = true;
                break;
            }

            // ========== 间隔等待 ==========
            if i + 1 < total && !opts.no_wait && !pacing.is_zero() {
                info!(
                    "⏳ 等待 {} 小时后发下一篇...",
                    self.automation.min_hours_between_posts
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        warn!("⛔ 等待期间收到中断信号");
                        interrupted = true;
                        break;
                    }
                    _ = tokio::time::sleep(pacing) => {}
                }
            }
        }

        // ========== 日报与通知 ==========
        self.finish(today, started_at, outcomes, interrupted).await
    }

    async fn finish(
        &self,
        today: NaiveDate,
        started_at: chrono::DateTime<Utc>,
        outcomes: Vec<TargetOutcome>,
        interrupted: bool,
    ) -> RunResult {
        let report = DailyRunReport::new(today, started_at, outcomes, interrupted);
        let report_path = match self.reports.write(&report).await {
            Ok(path) => Some(path),
            Err(e) => {
                error!("❌ 日报写入失败: {}", e);
                None
            }
        };

        print_final_stats(&report);

        let summary = report.summary;
        let communities = report.succeeded_communities();
        if summary.attempted > 0 && summary.failed == 0 {
            self.notifier.notify_success(summary.succeeded, &communities);
        } else if summary.succeeded > 0 {
            self.notifier
                .notify_partial(summary.succeeded, summary.failed, &communities);
        } else if summary.attempted > 0 {
            self.notifier
                .notify_failure(&format!("{} 个目标全部失败", summary.failed));
        }

        let status = if interrupted {
            RunStatus::Interrupted
        } else if summary.failed > 0 {
            RunStatus::SomeFailed
        } else {
            RunStatus::AllSucceeded
        };

        RunResult {
            status,
            report: Some(report),
            report_path,
            reason: None,
        }
    }
}

fn find_profile<'a>(profiles: &'a [CommunityProfile], community: &str) -> Option<&'a CommunityProfile> {
    let key = community_key(community);
    profiles.iter().find(|p| community_key(&p.id) == key)
}
