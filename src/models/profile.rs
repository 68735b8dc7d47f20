use serde::{Deserialize, Serialize};

use super::post_record::Angle;

/// 社区活跃度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityTier {
    High,
    Medium,
    Low,
    #[default]
    #[serde(other)]
    Unknown,
}

/// 社区档案（由外部研究流程维护，这里只读）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityProfile {
    /// 社区标识，如 `r/SideProject`
    #[serde(rename = "subreddit")]
    pub id: String,
    #[serde(default)]
    pub subscribers: u64,
    #[serde(default, rename = "activity")]
    pub activity: ActivityTier,
    /// 推广规则摘要
    #[serde(default)]
    pub promo_rules: String,
    #[serde(default)]
    pub notes: String,
    /// 偏好角度
    #[serde(default, rename = "best_angle", skip_serializing_if = "Option::is_none")]
    pub preferred_angle: Option<Angle>,
}

impl CommunityProfile {
    pub fn new(id: impl Into<String>, subscribers: u64) -> Self {
        Self {
            id: id.into(),
            subscribers,
            activity: ActivityTier::Unknown,
            promo_rules: String::new(),
            notes: String::new(),
            preferred_angle: None,
        }
    }

    pub fn with_preferred_angle(mut self, angle: Angle) -> Self {
        self.preferred_angle = Some(angle);
        self
    }
}

/// 去掉 `r/` 前缀后的社区名
pub fn bare_community(name: &str) -> &str {
    let trimmed = name.trim().trim_start_matches('/');
    trimmed
        .strip_prefix("r/")
        .or_else(|| trimmed.strip_prefix("R/"))
        .unwrap_or(trimmed)
        .trim_end_matches('/')
}

/// 统一为 `r/<name>` 形式
pub fn prefixed_community(name: &str) -> String {
    format!("r/{}", bare_community(name))
}

/// 比较用的键：忽略大小写和 `r/` 前缀
pub fn community_key(name: &str) -> String {
    bare_community(name).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn community_names_normalize() {
        assert_eq!(bare_community("r/SideProject"), "SideProject");
        assert_eq!(bare_community("/r/SideProject/"), "SideProject");
        // 名字本身以 r 开头时不能被误剥
        assert_eq!(bare_community("rust"), "rust");
        assert_eq!(prefixed_community("rust"), "r/rust");
        assert_eq!(community_key("r/Rust"), community_key("rust"));
    }

    #[test]
    fn profile_accepts_sparse_json() {
        let json = r#"{"subreddit": "r/GenX", "activity": "whatever"}"#;
        let profile: CommunityProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.id, "r/GenX");
        assert_eq!(profile.subscribers, 0);
        assert_eq!(profile.activity, ActivityTier::Unknown);
        assert_eq!(profile.preferred_angle, None);
    }
}
