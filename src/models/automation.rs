use serde::{Deserialize, Serialize};

/// 自动发帖配置（每次运行只加载一次，运行期间不变）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// 每日上限
    #[serde(rename = "posts_per_day")]
    pub daily_quota: u32,
    /// 同一社区最少间隔天数（硬冷却）
    #[serde(rename = "min_days_between_same_subreddit")]
    pub min_days_between_same_community: i64,
    /// 两次发帖之间的最少间隔（小时）
    pub min_hours_between_posts: f64,
    /// 内容生成在首轮之外的重试次数
    pub content_retry_budget: u32,
    pub enable_notifications: bool,
    pub dry_run: bool,
    /// 覆盖默认的内容生成模型
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_model: Option<String>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            daily_quota: 3,
            min_days_between_same_community: 4,
            min_hours_between_posts: 2.5,
            content_retry_budget: 2,
            enable_notifications: true,
            dry_run: false,
            content_model: None,
        }
    }
}

impl AutomationConfig {
    /// 两次发帖之间的等待时长
    pub fn pacing(&self) -> std::time::Duration {
        let secs = (self.min_hours_between_posts.max(0.0) * 3600.0).round() as u64;
        std::time::Duration::from_secs(secs)
    }
}

/// 产品配置（内容生成的输入）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub target_user: String,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub website_url: String,
    #[serde(default)]
    pub github_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_keys_and_defaults() {
        let json = r#"{"posts_per_day": 2, "min_hours_between_posts": 0.5, "posting_start_hour_local": 8}"#;
        let config: AutomationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.daily_quota, 2);
        assert_eq!(config.min_days_between_same_community, 4);
        assert_eq!(config.pacing(), std::time::Duration::from_secs(1800));
        assert!(config.enable_notifications);
    }
}
