use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use reddit_auto_post::config::Config;
use reddit_auto_post::models::loaders::{load_automation_config, load_profiles};
use reddit_auto_post::models::post_record::Angle;
use reddit_auto_post::orchestrator::{DailyRunner, RunOptions, RunStatus};
use reddit_auto_post::services::history_repair::repair_history;
use reddit_auto_post::services::manual_log::{log_manual_post, ManualLogOutcome};
use reddit_auto_post::services::performance_sync::sync_performance;
use reddit_auto_post::services::target_scheduler::{cooling_down, count_submitted_today, select_targets};
use reddit_auto_post::services::{HistoryStore, MetricsClient};
use reddit_auto_post::utils::logging;

#[derive(Parser)]
#[command(name = "reddit-auto-post")]
#[command(about = "每日自动发帖：选社区、生成内容、通过已登录的浏览器发帖")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 执行每日发帖
    Run {
        /// 只生成不发帖，不写历史
        #[arg(long)]
        dry_run: bool,

        /// 覆盖每日上限
        #[arg(long)]
        count: Option<u32>,

        /// 跳过两次发帖之间的等待
        #[arg(long)]
        no_wait: bool,
    },

    /// 预览今天的目标和冷却中的社区
    Preview,

    /// 修复损坏的发帖历史
    Repair,

    /// 刷新已发帖子的表现数据
    Sync {
        /// 忽略 48 小时间隔，全部刷新
        #[arg(long)]
        force: bool,
    },

    /// 手动记录一条已发出的帖子
    Log {
        #[arg(long)]
        url: String,

        /// A / B / C
        #[arg(long, value_parser = parse_angle)]
        angle: Angle,

        #[arg(long)]
        draft_file: Option<String>,
    },

    /// 查看社区信息和最近的热门帖子
    Info {
        /// 社区名（带不带 r/ 都可以）
        community: String,

        /// 同时列出几篇热门帖子
        #[arg(long, default_value_t = 5)]
        posts: u32,
    },
}

fn parse_angle(s: &str) -> std::result::Result<Angle, String> {
    Angle::parse(s).ok_or_else(|| format!("角度必须是 A / B / C，收到 '{}'", s))
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    match dispatch(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("❌ {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn dispatch(cli: Cli) -> Result<u8> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ 配置加载失败: {}", e);
            return Ok(RunStatus::Aborted.exit_code());
        }
    };

    match cli.command {
        Commands::Run {
            dry_run,
            count,
            no_wait,
        } => {
            cmd_run(
                &config,
                RunOptions {
                    dry_run,
                    count,
                    no_wait,
                },
            )
            .await
        }
        Commands::Preview => cmd_preview(&config).await,
        Commands::Repair => cmd_repair(&config).await,
        Commands::Sync { force } => cmd_sync(&config, force).await,
        Commands::Log {
            url,
            angle,
            draft_file,
        } => cmd_log(&config, &url, angle, draft_file.as_deref()).await,
        Commands::Info { community, posts } => cmd_info(&config, &community, posts).await,
    }
}

async fn cmd_run(config: &Config, opts: RunOptions) -> Result<u8> {
    let runner = match DailyRunner::initialize(config, &opts).await {
        Ok(runner) => runner,
        Err(e) => {
            error!("❌ {}", e);
            return Ok(RunStatus::Aborted.exit_code());
        }
    };

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⛔ 收到中断信号，正在收尾...");
            signal_token.cancel();
        }
    });

    let result = runner.run(&opts, cancel).await;
    if let Some(reason) = &result.reason {
        warn!("运行中止: {}", reason);
    }
    if let Some(path) = &result.report_path {
        info!("日报: {}", path.display());
    }
    Ok(result.status.exit_code())
}

async fn cmd_preview(config: &Config) -> Result<u8> {
    let automation = load_automation_config(&config.automation_config_path()).await?;
    let profiles = load_profiles(&config.profiles_path()).await?;
    let history = HistoryStore::new(config.history_path()).load().await?;
    let today = Utc::now().date_naive();

    info!(
        "📋 今天已发 {} / {} 篇",
        count_submitted_today(&history, today),
        automation.daily_quota
    );

    let targets = select_targets(&profiles, &history, &automation, today);
    if targets.is_empty() {
        info!("今天没有可发的目标");
    }
    for (i, t) in targets.iter().enumerate() {
        info!(
            "{}. {} - 角度 {} ({}) | score {:.1} | 距上次 {} 天 | 历史均分 {:.1}",
            i + 1,
            t.community,
            t.angle,
            t.angle.name(),
            t.audit.score,
            t.audit.days_since,
            t.audit.mean_score
        );
    }

    let cooling = cooling_down(&profiles, &history, &automation, today);
    if !cooling.is_empty() {
        info!("❄️ 冷却中:");
        for c in cooling {
            info!("  {} - 距上次 {} 天，还需 {} 天", c.community, c.days_since, c.days_remaining);
        }
    }
    Ok(0)
}

async fn cmd_repair(config: &Config) -> Result<u8> {
    let summary = repair_history(&config.history_path(), Utc::now())
        .await
        .context("修复发帖历史失败")?;

    if let Some(backup) = &summary.backup {
        info!("📦 已备份: {}", backup.display());
    }
    if let Some(fix) = summary.structural_fix {
        info!("🔧 结构修复: {:?}", fix);
    }
    info!(
        "✅ 原始 {} 条 | 修复 {} 条 | 丢弃 {} 条 | 去重 {} 条 | 最终 {} 条",
        summary.original, summary.repaired, summary.dropped, summary.duplicates, summary.final_count
    );
    Ok(0)
}

async fn cmd_sync(config: &Config, force: bool) -> Result<u8> {
    let client = MetricsClient::new(&config.public_api_base_url)?;
    let store = HistoryStore::new(config.history_path());
    let summary = sync_performance(&store, &client, force, Duration::from_secs(2), Utc::now()).await?;

    info!(
        "📊 刷新完成: 检查 {} | 更新 {} | 失败 {} | 标记删除 {}",
        summary.checked, summary.updated, summary.failed, summary.marked_deleted
    );
    Ok(if summary.failed > 0 { 1 } else { 0 })
}

async fn cmd_log(config: &Config, url: &str, angle: Angle, draft_file: Option<&str>) -> Result<u8> {
    let client = MetricsClient::new(&config.public_api_base_url)?;
    let store = HistoryStore::new(config.history_path());
    if let ManualLogOutcome::AlreadyLogged { post_id } =
        log_manual_post(&store, &client, url, angle, draft_file).await?
    {
        info!("帖子 {} 之前已记录，未做改动", post_id);
    }
    Ok(0)
}

async fn cmd_info(config: &Config, community: &str, posts: u32) -> Result<u8> {
    let client = MetricsClient::new(&config.public_api_base_url)?;
    let info = client.fetch_community_info(community).await?;
    println!("{}", serde_json::to_string_pretty(&info)?);

    if posts > 0 {
        println!("\n--- 最近热门帖子（供参考社区风格）---");
        let recent = client.fetch_community_recent_posts(community, "hot", posts).await?;
        for (i, p) in recent.iter().enumerate() {
            println!("{}. [{}↑] {}", i + 1, p.score, logging::truncate_text(&p.title, 80));
        }
    }
    Ok(0)
}
