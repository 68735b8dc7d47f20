//! 目标调度 - 业务能力层
//!
//! 根据社区档案和发帖历史，选出今天要发的 (社区, 角度) 列表。
//! 纯函数：同样的输入总是得到同样的输出，不读文件、不看时钟。
//!
//! 打分：`0.5 * 距上次天数 + 0.3 * 历史均分 + 0.2 * 归一化订阅数 * 100`，
//! 冷却期内的社区直接排除（硬冷却，不是扣分）。

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::automation::AutomationConfig;
use crate::models::post_record::{Angle, PostRecord};
use crate::models::profile::{community_key, CommunityProfile};

/// 从未发过帖时的"距上次天数"
pub const NEVER_POSTED_DAYS: i64 = 999;

const W_RECENCY: f64 = 0.5;
const W_PERFORMANCE: f64 = 0.3;
const W_REACH: f64 = 0.2;

/// 选择依据（只用于观察和日志）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionAudit {
    pub score: f64,
    pub days_since: i64,
    pub mean_score: f64,
}

/// 调度结果中的一项
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledTarget {
    pub community: String,
    pub angle: Angle,
    #[serde(skip)]
    pub profile: CommunityProfile,
    pub audit: SelectionAudit,
}

/// 冷却中的社区
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cooldown {
    pub community: String,
    pub days_since: i64,
    pub days_remaining: i64,
}

/// 某个社区的有效历史（排除已删除），按发帖时间倒序
fn community_history<'a>(community: &str, history: &'a [PostRecord]) -> Vec<&'a PostRecord> {
    let key = community_key(community);
    let mut posts: Vec<&PostRecord> = history
        .iter()
        .filter(|r| r.is_active() && community_key(&r.subreddit) == key)
        .collect();
    posts.sort_by(|a, b| b.posted_at.cmp(&a.posted_at));
    posts
}

/// 今天（UTC 日期）已提交的帖子数
pub fn count_submitted_today(history: &[PostRecord], today: NaiveDate) -> usize {
    history.iter().filter(|r| r.posted_on() == today).count()
}

/// 距离该社区上次发帖的天数；从未发过返回 [`NEVER_POSTED_DAYS`]
pub fn days_since_last(community: &str, history: &[PostRecord], today: NaiveDate) -> i64 {
    community_history(community, history)
        .first()
        .map(|last| (today - last.posted_on()).num_days())
        .unwrap_or(NEVER_POSTED_DAYS)
}

/// 历史帖子的平均得分（没有得分数据时为 0）
pub fn mean_historical_score(community: &str, history: &[PostRecord]) -> f64 {
    let scores: Vec<i64> = community_history(community, history)
        .iter()
        .filter_map(|r| r.performance.score)
        .collect();
    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<i64>() as f64 / scores.len() as f64
    }
}

/// 该社区最近一次使用的角度
pub fn last_angle_used(community: &str, history: &[PostRecord]) -> Option<Angle> {
    community_history(community, history).first().map(|r| r.angle)
}

/// 订阅数除以所有档案中的最大订阅数；没有档案或最大值为 0 时为 0
fn normalized_subscribers(profile: &CommunityProfile, max_subscribers: u64) -> f64 {
    if max_subscribers == 0 {
        0.0
    } else {
        profile.subscribers as f64 / max_subscribers as f64
    }
}

/// 选择今天的目标
pub fn select_targets(
    profiles: &[CommunityProfile],
    history: &[PostRecord],
    config: &AutomationConfig,
    today: NaiveDate,
) -> Vec<ScheduledTarget> {
    let submitted = count_submitted_today(history, today) as i64;
    let remaining = config.daily_quota as i64 - submitted;
    if remaining <= 0 {
        return Vec::new();
    }

    let max_subscribers = profiles.iter().map(|p| p.subscribers).max().unwrap_or(0);

    let mut candidates: Vec<(&CommunityProfile, SelectionAudit)> = profiles
        .iter()
        .filter_map(|profile| {
            let days_since = days_since_last(&profile.id, history, today);
            if days_since < config.min_days_between_same_community {
                return None;
            }
            let mean_score = mean_historical_score(&profile.id, history);
            let reach = normalized_subscribers(profile, max_subscribers);
            let score = W_RECENCY * days_since as f64
                + W_PERFORMANCE * mean_score
                + W_REACH * reach * 100.0;
            Some((
                profile,
                SelectionAudit {
                    score,
                    days_since,
                    mean_score,
                },
            ))
        })
        .collect();

    // sort_by 是稳定排序，同分保持输入顺序
    candidates.sort_by(|a, b| b.1.score.partial_cmp(&a.1.score).unwrap_or(Ordering::Equal));

    let mut used_angles: HashSet<Angle> = HashSet::new();
    let mut selected = Vec::new();

    for (profile, audit) in candidates.into_iter().take(remaining as usize) {
        let angle = choose_angle(profile, last_angle_used(&profile.id, history), &used_angles);
        used_angles.insert(angle);
        selected.push(ScheduledTarget {
            community: profile.id.clone(),
            angle,
            profile: profile.clone(),
            audit,
        });
    }

    selected
}

/// 角度选择
///
/// - 没有历史：用档案里的偏好角度，没有偏好则用 A
/// - 有历史：上次角度的下一个；如果今天已经用过且三种还没用齐，
///   换一个今天没用过、也不是该社区上次用过的角度
fn choose_angle(
    profile: &CommunityProfile,
    last: Option<Angle>,
    used_today: &HashSet<Angle>,
) -> Angle {
    let Some(last) = last else {
        return profile.preferred_angle.unwrap_or(Angle::A);
    };

    let angle = last.next();
    if used_today.contains(&angle) && used_today.len() < Angle::CYCLE.len() {
        if let Some(alt) = Angle::CYCLE
            .iter()
            .copied()
            .find(|a| !used_today.contains(a) && *a != last)
        {
            return alt;
        }
    }
    angle
}

/// 冷却中的社区，以及还需等待的天数
pub fn cooling_down(
    profiles: &[CommunityProfile],
    history: &[PostRecord],
    config: &AutomationConfig,
    today: NaiveDate,
) -> Vec<Cooldown> {
    profiles
        .iter()
        .filter_map(|p| {
            let days_since = days_since_last(&p.id, history, today);
            (days_since < config.min_days_between_same_community).then(|| Cooldown {
                community: p.id.clone(),
                days_since,
                days_remaining: config.min_days_between_same_community - days_since,
            })
        })
        .collect()
}
