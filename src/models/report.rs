use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::post_record::Angle;

/// 单个目标的结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

/// 单个目标的处理结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetOutcome {
    /// 槽位（从 1 开始）
    pub slot: usize,
    #[serde(rename = "subreddit")]
    pub community: String,
    pub angle: Angle,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
    #[serde(default)]
    pub captcha_fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flair: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_file: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl TargetOutcome {
    /// 以失败状态开始，成功时再改写
    pub fn pending(slot: usize, community: &str, angle: Angle) -> Self {
        Self {
            slot,
            community: community.to_string(),
            angle,
            status: OutcomeStatus::Failed,
            title: None,
            url: None,
            post_id: None,
            error: None,
            verified: None,
            captcha_fallback: false,
            flair: None,
            attempts: None,
            draft_file: None,
            started_at: Utc::now(),
        }
    }

    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.status = OutcomeStatus::Failed;
        self.error = Some(error.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// 运行汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[TargetOutcome]) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        Self {
            attempted: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
        }
    }
}

/// 每日运行报告（写入后不可修改）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRunReport {
    pub date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(rename = "posts")]
    pub outcomes: Vec<TargetOutcome>,
    pub summary: RunSummary,
    #[serde(default)]
    pub interrupted: bool,
}

impl DailyRunReport {
    pub fn new(
        date: NaiveDate,
        started_at: DateTime<Utc>,
        outcomes: Vec<TargetOutcome>,
        interrupted: bool,
    ) -> Self {
        let summary = RunSummary::from_outcomes(&outcomes);
        Self {
            date,
            started_at,
            completed_at: Utc::now(),
            outcomes,
            summary,
            interrupted,
        }
    }

    /// 成功发布的社区列表
    pub fn succeeded_communities(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(|o| o.community.clone())
            .collect()
    }
}
