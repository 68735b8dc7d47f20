use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use tokio::fs;

use crate::error::{AppError, AppResult};
use crate::models::automation::{AutomationConfig, ProductConfig};
use crate::models::profile::CommunityProfile;

static TMP_NONCE: AtomicU64 = AtomicU64::new(0);

/// 读取 JSON 文件；文件不存在时返回 `None`
pub async fn read_json_file<T: DeserializeOwned>(path: &Path) -> AppResult<Option<T>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(AppError::file_read_failed(path.display().to_string(), e)),
    };

    let value = serde_json::from_str(&content)
        .map_err(|e| AppError::json_parse_failed(path.display().to_string(), e))?;
    Ok(Some(value))
}

/// 以缩进格式写 JSON（先写临时文件再重命名，避免留下半截文件）
pub async fn write_json_file<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::file_write_failed(parent.display().to_string(), e))?;
        }
    }

    let mut body = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::json_parse_failed(path.display().to_string(), e))?;
    body.push('\n');

    // 同一文件可能被并发写，临时文件名各不相同
    let tmp = path.with_extension(format!(
        "json.{}.{}.tmp",
        std::process::id(),
        TMP_NONCE.fetch_add(1, Ordering::Relaxed)
    ));
    fs::write(&tmp, body)
        .await
        .map_err(|e| AppError::file_write_failed(tmp.display().to_string(), e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
    Ok(())
}

/// 加载社区档案列表
pub async fn load_profiles(path: &Path) -> AppResult<Vec<CommunityProfile>> {
    let profiles: Vec<CommunityProfile> = read_json_file(path).await?.unwrap_or_default();
    tracing::debug!("加载了 {} 个社区档案", profiles.len());
    Ok(profiles)
}

/// 加载产品配置
pub async fn load_product_config(path: &Path) -> AppResult<Option<ProductConfig>> {
    read_json_file(path).await
}

/// 加载自动发帖配置；文件不存在时使用默认值
pub async fn load_automation_config(path: &Path) -> AppResult<AutomationConfig> {
    match read_json_file(path).await? {
        Some(config) => Ok(config),
        None => {
            tracing::info!("未找到 {}，使用默认自动化配置", path.display());
            Ok(AutomationConfig::default())
        }
    }
}
