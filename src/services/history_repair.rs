//! 发帖历史修复 - 业务能力层
//!
//! 由人显式运行，不会被编排器隐式调用。步骤：
//! 1. 备份原文件（`<path>.backup-YYYYmmdd-HHMMSS`）
//! 2. 解析失败时尝试结构修复（去掉尾逗号、补上被截断的数组）
//! 3. 按必要字段校验每条记录，能补的补，补不了的丢弃
//! 4. 按帖子 ID 去重后写回
//!
//! 对已经干净的文件重复运行，输出逐字节相同。

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use tokio::fs;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::loaders::write_json_file;
use crate::models::post_record::{parse_post_url, parse_timestamp, PostRecord};

/// 每条记录必须有且非空的字段
pub const REQUIRED_FIELDS: [&str; 5] = ["post_id", "url", "subreddit", "angle", "posted_at"];

/// 结构修复方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralFix {
    /// 去掉了尾逗号
    TrailingCommas,
    /// 截到最后一个完整对象并补上 `]`
    Truncation,
    /// 无法修复，从空历史重建
    Reset,
}

/// 修复结果汇总
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairSummary {
    pub backup: Option<PathBuf>,
    /// 文件原本不存在，新建了空历史
    pub created: bool,
    pub structural_fix: Option<StructuralFix>,
    pub original: usize,
    pub repaired: usize,
    pub dropped: usize,
    pub duplicates: usize,
    pub final_count: usize,
}

/// 修复历史文件
pub async fn repair_history(path: &Path, now: DateTime<Utc>) -> AppResult<RepairSummary> {
    let mut summary = RepairSummary::default();

    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("{} 不存在，创建空历史", path.display());
            write_json_file(path, &Vec::<Value>::new()).await?;
            summary.created = true;
            return Ok(summary);
        }
        Err(e) => return Err(AppError::file_read_failed(path.display().to_string(), e)),
    };

    let backup = backup_path(path, now);
    fs::copy(path, &backup)
        .await
        .map_err(|e| AppError::file_write_failed(backup.display().to_string(), e))?;
    info!("✓ 已备份原始文件: {}", backup.display());
    summary.backup = Some(backup);

    let (entries, fix) = parse_with_recovery(raw.trim());
    summary.structural_fix = fix;
    summary.original = entries.len();

    let mut valid = Vec::new();
    for (idx, entry) in entries.into_iter().enumerate() {
        let Value::Object(map) = entry else {
            warn!("  跳过第 {} 条：不是对象", idx + 1);
            summary.dropped += 1;
            continue;
        };

        let issues = validate_entry(&map);
        if issues.is_empty() {
            valid.push(map);
            continue;
        }

        warn!("  第 {} 条有问题：{}", idx + 1, issues.join(", "));
        let repaired = repair_entry(map, now);
        let remaining = validate_entry(&repaired);
        if remaining.is_empty() {
            info!("    → 已修复");
            summary.repaired += 1;
            valid.push(repaired);
        } else {
            warn!("    → 无法修复（{}），丢弃", remaining.join(", "));
            summary.dropped += 1;
        }
    }

    let mut seen = HashSet::new();
    let mut deduped = Vec::new();
    for map in valid {
        let id = map
            .get("post_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if seen.insert(id.clone()) {
            deduped.push(Value::Object(map));
        } else {
            warn!("  移除重复记录: {}", id);
            summary.duplicates += 1;
        }
    }

    summary.final_count = deduped.len();
    write_json_file(path, &deduped).await?;
    Ok(summary)
}

fn backup_path(path: &Path, now: DateTime<Utc>) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".backup-{}", now.format("%Y%m%d-%H%M%S")));
    PathBuf::from(name)
}

/// 解析 JSON 数组，失败时尝试结构修复
pub fn parse_with_recovery(raw: &str) -> (Vec<Value>, Option<StructuralFix>) {
    if raw.is_empty() {
        return (Vec::new(), None);
    }
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return (into_entries(value), None);
    }

    let without_trailing_commas = strip_trailing_commas(raw);
    if let Ok(value) = serde_json::from_str::<Value>(&without_trailing_commas) {
        return (into_entries(value), Some(StructuralFix::TrailingCommas));
    }

    // 截断的数组：保留到最后一个完整的 `}`
    let candidate = without_trailing_commas.trim_end();
    if !candidate.ends_with(']') {
        if let Some(last_brace) = candidate.rfind('}') {
            let fixed = format!("{}]", &candidate[..=last_brace]);
            if let Ok(value) = serde_json::from_str::<Value>(&fixed) {
                return (into_entries(value), Some(StructuralFix::Truncation));
            }
        }
    }

    warn!("无法自动修复 JSON，从空历史重建");
    (Vec::new(), Some(StructuralFix::Reset))
}

fn strip_trailing_commas(raw: &str) -> String {
    match Regex::new(r",(\s*[\]}])") {
        Ok(re) => re.replace_all(raw, "$1").into_owned(),
        Err(_) => raw.to_string(),
    }
}

fn into_entries(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(_) => vec![value],
        _ => Vec::new(),
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// 校验单条记录，返回问题列表（空 = 合法）
pub fn validate_entry(entry: &Map<String, Value>) -> Vec<String> {
    let mut issues = Vec::new();
    for field in REQUIRED_FIELDS {
        if !is_truthy(entry.get(field)) {
            issues.push(format!("缺少字段: {}", field));
        }
    }

    if let Some(url) = entry.get("url").and_then(Value::as_str) {
        if !url.is_empty() && !url.contains("reddit.com") {
            issues.push(format!("URL 格式可疑: {}", url.chars().take(60).collect::<String>()));
        }
    }

    if let Some(angle) = entry.get("angle") {
        if is_truthy(Some(angle)) && !matches!(angle.as_str(), Some("A" | "B" | "C")) {
            issues.push(format!("angle 值无效: {}（应为 A/B/C）", angle));
        }
    }

    // 其余字段类型交给记录类型本身校验
    if issues.is_empty() {
        if let Err(e) = serde_json::from_value::<PostRecord>(Value::Object(entry.clone())) {
            issues.push(format!("记录结构无效: {}", e));
        }
    }

    issues
}

/// 尽量修复单条记录：从 URL 中补社区和帖子 ID，其余缺失字段填默认值
pub fn repair_entry(mut entry: Map<String, Value>, now: DateTime<Utc>) -> Map<String, Value> {
    let url = entry
        .get("url")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if let Some((community, post_id)) = parse_post_url(&url) {
        if !is_truthy(entry.get("post_id")) {
            entry.insert("post_id".into(), Value::String(post_id));
        }
        if !is_truthy(entry.get("subreddit")) {
            entry.insert("subreddit".into(), Value::String(format!("r/{}", community)));
        }
    }

    let now_str = now.to_rfc3339();
    let defaults: [(&str, Value); 11] = [
        ("post_id", Value::String(format!("unknown-{}", stable_hash(&url) % 100_000))),
        ("subreddit", Value::String("r/unknown".into())),
        ("angle", Value::String("A".into())),
        ("posted_at", Value::String(now_str.clone())),
        ("title", Value::String(String::new())),
        ("score", Value::Null),
        ("upvote_ratio", Value::Null),
        ("num_comments", Value::Null),
        ("last_checked", Value::Null),
        ("status", Value::String("active".into())),
        ("draft_file", Value::String(String::new())),
    ];
    for (key, value) in defaults {
        entry.entry(key.to_string()).or_insert(value);
    }

    // 记录类型无法接受的值
    let posted_at_ok = entry
        .get("posted_at")
        .and_then(Value::as_str)
        .is_some_and(|s| parse_timestamp(s).is_some());
    if !posted_at_ok && is_truthy(entry.get("posted_at")) {
        entry.insert("posted_at".into(), Value::String(now_str));
    }
    if !matches!(
        entry.get("status").and_then(Value::as_str),
        Some("active" | "deleted")
    ) {
        entry.insert("status".into(), Value::String("active".into()));
    }
    let last_checked_ok = match entry.get("last_checked") {
        Some(Value::Null) | None => true,
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s).is_ok(),
        Some(_) => false,
    };
    if !last_checked_ok {
        entry.insert("last_checked".into(), Value::Null);
    }

    entry
}

fn stable_hash(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}
