/// 日志工具模块
///
/// 提供日志初始化和格式化输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::models::report::DailyRunReport;
use crate::workflow::PostCtx;

/// 初始化日志
///
/// 级别由 `RUST_LOG` 控制，默认 info；重复调用无副作用（测试里会多次调用）
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(dry_run: bool) {
    info!("{}", "=".repeat(60));
    info!("🚀 自动发帖 - 每日运行");
    if dry_run {
        info!("🔸 DRY RUN 模式 - 只生成不发帖");
    }
    info!("{}", "=".repeat(60));
}

/// 记录单个目标开始
pub fn log_target_start(ctx: &PostCtx) {
    info!("\n{}", "─".repeat(50));
    info!(
        "{} {} - 角度 {} ({})",
        ctx,
        ctx.community,
        ctx.angle,
        ctx.angle.name()
    );
    info!("{}", "─".repeat(50));
}

/// 打印最终统计信息
pub fn print_final_stats(report: &DailyRunReport) {
    info!("\n{}", "=".repeat(60));
    info!("📊 完成: {} 成功 / {} 失败", report.summary.succeeded, report.summary.failed);
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    if report.interrupted {
        info!("⛔ 本次运行被中断");
    }
    info!("{}", "=".repeat(60));

    for outcome in &report.outcomes {
        let icon = if outcome.is_success() { "✅" } else { "❌" };
        info!(
            "  {} {} - {}",
            icon,
            outcome.community,
            truncate_text(outcome.title.as_deref().unwrap_or("?"), 50)
        );
        if let Some(url) = outcome.url.as_deref().filter(|_| outcome.is_success()) {
            info!("     {}", url);
        }
        if let Some(error) = &outcome.error {
            info!("     {}", truncate_text(error, 120));
        }
    }
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（按字符计）
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
