//! 运行日报写入 - 业务能力层
//!
//! `automation/daily-log-{date}.json` 写入后不再修改；同一天第二次运行写 `-2`、`-3`……
//! `automation/latest-run.json` 每次覆盖。
//!
//! 日报先完整写进临时文件，再用硬链接放到目标名下：读者看不到写了一半的日报，
//! 已存在的日报也不会被覆盖。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::loaders::write_json_file;
use crate::models::report::DailyRunReport;

pub const LATEST_REPORT_FILE: &str = "latest-run.json";

static TMP_NONCE: AtomicU64 = AtomicU64::new(0);

/// 日报写入服务
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_REPORT_FILE)
    }

    /// 写入日报和 latest 指针，返回日报路径
    pub async fn write(&self, report: &DailyRunReport) -> AppResult<PathBuf> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::file_write_failed(self.dir.display().to_string(), e))?;

        let content = serde_json::to_string_pretty(report)
            .map_err(|e| AppError::json_parse_failed(self.dir.display().to_string(), e))?;
        let stem = format!("daily-log-{}", report.date.format("%Y-%m-%d"));

        let dated = write_new_file(&self.dir, &stem, &content).await?;
        write_json_file(&self.latest_path(), report).await?;

        info!("📝 日报已保存: {}", dated.display());
        Ok(dated)
    }
}

/// 写临时文件后链接到第一个空闲的名字，已存在则依次尝试 `-2`、`-3`
async fn write_new_file(dir: &Path, stem: &str, content: &str) -> AppResult<PathBuf> {
    let tmp = dir.join(format!(
        ".{}.{}.{}.tmp",
        stem,
        std::process::id(),
        TMP_NONCE.fetch_add(1, Ordering::Relaxed)
    ));
    fs::write(&tmp, content)
        .await
        .map_err(|e| AppError::file_write_failed(tmp.display().to_string(), e))?;

    let published = publish_with_suffix(&tmp, dir, stem).await;
    if let Err(e) = fs::remove_file(&tmp).await {
        warn!("清理临时日报失败 {}: {}", tmp.display(), e);
    }
    published
}

async fn publish_with_suffix(tmp: &Path, dir: &Path, stem: &str) -> AppResult<PathBuf> {
    let mut n = 1;
    loop {
        let name = if n == 1 {
            format!("{}.json", stem)
        } else {
            format!("{}-{}.json", stem, n)
        };
        let path = dir.join(name);

        match fs::hard_link(tmp, &path).await {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(AppError::file_write_failed(path.display().to_string(), e)),
        }
    }
}
