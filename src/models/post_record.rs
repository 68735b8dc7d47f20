use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, HistoryError};

/// 内容角度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Angle {
    /// Story/Journey
    A,
    /// Feedback Request
    B,
    /// Value/Insight
    C,
}

impl Angle {
    /// 固定的轮换顺序 A → B → C → A
    pub const CYCLE: [Angle; 3] = [Angle::A, Angle::B, Angle::C];

    /// 轮换中的下一个角度
    pub fn next(self) -> Angle {
        match self {
            Angle::A => Angle::B,
            Angle::B => Angle::C,
            Angle::C => Angle::A,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Angle::A => "Story/Journey",
            Angle::B => "Feedback Request",
            Angle::C => "Value/Insight",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Angle::A => "A",
            Angle::B => "B",
            Angle::C => "C",
        }
    }

    pub fn parse(s: &str) -> Option<Angle> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Angle::A),
            "B" => Some(Angle::B),
            "C" => Some(Angle::C),
            _ => None,
        }
    }
}

impl std::fmt::Display for Angle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 帖子生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Active,
    Deleted,
}

/// 帖子表现快照（由定期刷新修改）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub upvote_ratio: Option<f64>,
    #[serde(default)]
    pub num_comments: Option<u64>,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
}

/// 发帖历史中的一条记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub post_id: String,
    pub url: String,
    /// 社区标识（`r/<name>`）
    pub subreddit: String,
    #[serde(default)]
    pub title: String,
    pub angle: Angle,
    #[serde(default)]
    pub draft_file: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub posted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub performance: Performance,
    #[serde(default)]
    pub status: PostStatus,
    /// true = 自动发帖，false = 手动记录
    #[serde(default)]
    pub auto_posted: bool,
}

impl PostRecord {
    /// 创建新记录；必要字段为空时拒绝
    pub fn new(
        post_id: impl Into<String>,
        url: impl Into<String>,
        community: &str,
        title: impl Into<String>,
        angle: Angle,
        posted_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        let post_id = post_id.into();
        let url = url.into();
        if post_id.trim().is_empty() {
            return Err(HistoryError::MissingField { field: "post_id" }.into());
        }
        if url.trim().is_empty() {
            return Err(HistoryError::MissingField { field: "url" }.into());
        }
        if super::profile::bare_community(community).is_empty() {
            return Err(HistoryError::MissingField { field: "subreddit" }.into());
        }
        Ok(Self {
            post_id,
            url,
            subreddit: super::profile::prefixed_community(community),
            title: title.into(),
            angle,
            draft_file: String::new(),
            posted_at,
            performance: Performance::default(),
            status: PostStatus::Active,
            auto_posted: true,
        })
    }

    pub fn with_draft_file(mut self, draft_file: impl Into<String>) -> Self {
        self.draft_file = draft_file.into();
        self
    }

    pub fn manual(mut self) -> Self {
        self.auto_posted = false;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == PostStatus::Active
    }

    /// 提交日期（UTC）
    pub fn posted_on(&self) -> NaiveDate {
        self.posted_at.date_naive()
    }
}

/// 从帖子 URL 中解析 `(社区, 帖子ID)`
///
/// 支持 `https://www.reddit.com/r/SideProject/comments/abc123/title/` 这类格式
pub fn parse_post_url(url: &str) -> Option<(String, String)> {
    let clean = url.split('?').next().unwrap_or(url).trim_end_matches('/');
    let parts: Vec<&str> = clean.split('/').collect();
    let idx = parts.iter().position(|p| *p == "comments")?;
    if idx == 0 {
        return None;
    }
    let community = parts[idx - 1];
    let post_id = parts.get(idx + 1)?;
    if community.is_empty() || post_id.is_empty() || community == "r" {
        return None;
    }
    Some((community.to_string(), post_id.to_string()))
}

/// 宽松解析时间戳：RFC 3339 / 无时区的 ISO 时间（按 UTC）/ 纯日期
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = value.replace('Z', "").parse::<NaiveDateTime>() {
        return Some(dt.and_utc());
    }
    let date_part = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Visitor;
    use std::fmt;

    struct TimestampVisitor;

    impl<'de> Visitor<'de> for TimestampVisitor {
        type Value = DateTime<Utc>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an ISO-8601 timestamp or YYYY-MM-DD date")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_timestamp(value)
                .ok_or_else(|| E::custom(format!("invalid timestamp: {value}")))
        }
    }

    deserializer.deserialize_str(TimestampVisitor)
}
