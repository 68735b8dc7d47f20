//! 内容生成 - 业务能力层
//!
//! 输入：社区档案 + 产品配置 + 发帖历史 + 角度；输出：标题 + 正文。
//! 内部按质量检查结果重试，每一轮都把上一轮没通过的具体原因带进 prompt。

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::draft_writer::{DraftExample, DraftWriter};
use super::llm_service::LlmService;
use super::metrics_client::{CommunityRules, CommunityRulesSource};
use super::quality::{quality_check, BANNED_PHRASES, SPAM_TRIGGER_WORDS};
use crate::models::automation::ProductConfig;
use crate::models::post_record::{Angle, PostRecord};
use crate::models::profile::{ActivityTier, CommunityProfile};

/// 生成结果
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPost {
    pub title: String,
    pub body: String,
    /// 模型在 `FLAIR:` 行里给出的 flair
    pub flair: Option<String>,
    pub quality_passed: bool,
    pub issues: Vec<String>,
    pub attempts: u32,
}

/// 内容生成能力
///
/// 返回 `Ok(None)` 表示重试用尽也没有得到可解析的输出
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        profile: &CommunityProfile,
        product: &ProductConfig,
        history: &[PostRecord],
        angle: Angle,
    ) -> Result<Option<GeneratedPost>>;
}

/// 单轮重试状态，显式传给下一轮
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    /// 从 0 开始
    pub attempt: u32,
    /// 上一轮的问题
    pub issues: Vec<String>,
}

impl RetryState {
    pub fn first() -> Self {
        Self::default()
    }

    pub fn next(&self, issues: Vec<String>) -> Self {
        Self {
            attempt: self.attempt + 1,
            issues,
        }
    }

    /// 追加到 user prompt 末尾的反馈
    pub fn feedback(&self) -> String {
        if self.attempt == 0 || self.issues.is_empty() {
            return String::new();
        }
        format!(
            "\n\nPREVIOUS ATTEMPT FAILED quality check. Issues: {}. Please fix these specific problems.",
            self.issues.join(", ")
        )
    }
}

/// 基于 LLM 的内容生成
pub struct LlmContentGenerator {
    llm: LlmService,
    rules: Option<Arc<dyn CommunityRulesSource>>,
    drafts: DraftWriter,
    retry_budget: u32,
}

impl LlmContentGenerator {
    pub fn new(
        llm: LlmService,
        rules: Option<Arc<dyn CommunityRulesSource>>,
        drafts: DraftWriter,
        retry_budget: u32,
    ) -> Self {
        Self {
            llm,
            rules,
            drafts,
            retry_budget,
        }
    }
}

#[async_trait]
impl ContentGenerator for LlmContentGenerator {
    async fn generate(
        &self,
        profile: &CommunityProfile,
        product: &ProductConfig,
        history: &[PostRecord],
        angle: Angle,
    ) -> Result<Option<GeneratedPost>> {
        let rules = match &self.rules {
            Some(source) => {
                info!("  📋 正在获取 {} 的发帖规则...", profile.id);
                source.fetch_community_rules(&profile.id).await
            }
            None => CommunityRules::default(),
        };
        if rules.rules.is_empty() {
            debug!("未获取到 {} 的特定规则", profile.id);
        } else {
            info!("  ✅ 获取到 {} 条规则", rules.rules.len());
        }
        if rules.flair_required() {
            info!("  ⚠️ 该社区要求 flair");
        }

        let examples = self.drafts.load_examples(2).await;
        let (system_prompt, user_prompt) =
            build_prompts(product, profile, angle, history, &examples, &rules);

        let mut state = RetryState::first();
        loop {
            let prompt = format!("{}{}", user_prompt, state.feedback());
            let text = self
                .llm
                .send_to_llm(&prompt, Some(&system_prompt))
                .await
                .with_context(|| format!("第 {} 次生成调用失败", state.attempt + 1))?;

            let Some(parsed) = parse_response(&text) else {
                warn!("  ⚠️ 第 {} 次生成无法解析", state.attempt + 1);
                if state.attempt < self.retry_budget {
                    state = state.next(vec!["could not parse TITLE/BODY".to_string()]);
                    continue;
                }
                return Ok(None);
            };

            let report = quality_check(&parsed.title, &parsed.body);
            if report.passed() || state.attempt >= self.retry_budget {
                return Ok(Some(GeneratedPost {
                    title: parsed.title,
                    body: parsed.body,
                    flair: parsed.flair,
                    quality_passed: report.passed(),
                    issues: report.issues,
                    attempts: state.attempt + 1,
                }));
            }

            warn!(
                "  ⚠️ 第 {} 次生成未通过质量检查: {}",
                state.attempt + 1,
                report.issues.join("; ")
            );
            state = state.next(report.issues);
        }
    }
}

// ========== 响应解析 ==========

/// 解析出的稿子
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDraft {
    pub title: String,
    pub body: String,
    pub flair: Option<String>,
}

/// 解析 `TITLE: … / --- / BODY: …` 格式；可选的 `FLAIR:` 行从正文中去掉
pub fn parse_response(text: &str) -> Option<ParsedDraft> {
    let mut title = String::new();
    let mut body_lines: Vec<&str> = Vec::new();
    let mut flair = None;
    let mut in_body = false;

    for line in text.trim().lines() {
        let trimmed = line.trim();
        if trimmed.get(..6).is_some_and(|p| p.eq_ignore_ascii_case("FLAIR:")) {
            if flair.is_none() {
                let value = trimmed
                    .get(6..)
                    .unwrap_or_default()
                    .trim()
                    .trim_matches(|c| c == '[' || c == ']');
                if !value.is_empty() {
                    flair = Some(value.to_string());
                }
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("TITLE:") {
            title = rest.trim().trim_matches('"').trim().to_string();
        } else if trimmed == "---" {
            continue;
        } else if let Some(rest) = line.strip_prefix("BODY:") {
            in_body = true;
            if !rest.trim().is_empty() {
                body_lines.push(rest.trim());
            }
        } else if in_body {
            body_lines.push(line);
        }
    }

    let body = body_lines.join("\n").trim().to_string();
    if title.is_empty() || body.is_empty() {
        return None;
    }
    Some(ParsedDraft { title, body, flair })
}

// ========== Prompt ==========

fn angle_guide(angle: Angle) -> &'static str {
    match angle {
        Angle::A => {
            "Story/Journey angle:\n\
             - Hook with a specific failure, turning point, or surprising result\n\
             - Structure: what happened -> what you learned -> what you built -> question for readers\n\
             - Use real numbers and timelines\n\
             - Sharing failures and lessons makes it authentic"
        }
        Angle::B => {
            "Feedback Request angle:\n\
             - Hook with the problem you're stuck on or the input you need\n\
             - Structure: what you did -> what you're unsure about -> a specific question\n\
             - Make the community feel their opinion is genuinely needed\n\
             - Be concrete about what you tried and what happened"
        }
        Angle::C => {
            "Value/Insight angle:\n\
             - Hook with a counter-intuitive finding or a hard-won lesson\n\
             - Structure: insight -> why it matters -> how you found it (product context) -> discussion\n\
             - Give value first, mention the product later\n\
             - Readers should get something even if they never click a link"
        }
    }
}

fn activity_label(activity: ActivityTier) -> &'static str {
    match activity {
        ActivityTier::High => "high",
        ActivityTier::Medium => "medium",
        ActivityTier::Low => "low",
        ActivityTier::Unknown => "?",
    }
}

fn with_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// 最近的帖子标题（最多 20 个），提示模型避开相似话题
pub fn recent_titles(history: &[PostRecord]) -> Vec<&str> {
    let titles: Vec<&str> = history
        .iter()
        .map(|r| r.title.as_str())
        .filter(|t| !t.is_empty())
        .collect();
    let skip = titles.len().saturating_sub(20);
    titles.into_iter().skip(skip).collect()
}

/// 构建 (system_prompt, user_prompt)
pub fn build_prompts(
    product: &ProductConfig,
    profile: &CommunityProfile,
    angle: Angle,
    history: &[PostRecord],
    examples: &[DraftExample],
    rules: &CommunityRules,
) -> (String, String) {
    let product_name = if product.name.is_empty() {
        "the product"
    } else {
        product.name.as_str()
    };

    let system_prompt = format!(
        r#"You are a Reddit content writer for {name}.

Product: {description}
Target user: {target_user}
Website: {website}

STRICT RULES:
1. Title: NEVER start with "I built", "I made", "Check out", "Launching", "Excited to share"
2. Title: Use specific numbers, questions, "how I...", "what I learned", "after X months"
3. Title: 60-100 characters ideal
4. BANNED phrases (NEVER use): {banned}
5. REQUIRED patterns: contractions (I'm, it's), hedging ("I think", "might"), specific failures, approximate numbers ("~200 users", "about 3 months")
5b. SPAM TRIGGER WORDS (avoid these, they trigger the spam filter): {spam}
6. Body template: Hook (1-2 sentences) -> Context (2-3 sentences) -> Substance (story/insight/question) -> Product mention (1 honest sentence) -> CTA (one genuine question)
7. Must NOT sound like marketing. Sound like a real person sharing on Reddit.
8. Must disclose you built/work on the product.
9. End with a genuine, specific question for the community.
10. Use markdown formatting (bold, lists) sparingly and naturally."#,
        name = product_name,
        description = product.description,
        target_user = product.target_user,
        website = product.website_url,
        banned = BANNED_PHRASES.join(", "),
        spam = SPAM_TRIGGER_WORDS.join(", "),
    );

    let mut rules_section = String::new();
    if !rules.rules.is_empty() {
        rules_section.push_str("\n\nSUBREDDIT RULES (YOU MUST FOLLOW ALL OF THESE):\n");
        for rule in &rules.rules {
            let description: String = rule.description.chars().take(200).collect();
            rules_section.push_str(&format!("- **{}**: {}\n", rule.name, description));
        }
    }

    let reqs = &rules.requirements;
    let mut req_parts = Vec::new();
    if let Some(n) = reqs.title_min_length {
        req_parts.push(format!("Title minimum length: {} chars", n));
    }
    if let Some(n) = reqs.body_min_length {
        req_parts.push(format!("Body minimum length: {} chars", n));
    }
    if !reqs.title_required_strings.is_empty() {
        req_parts.push(format!(
            "Title MUST contain one of: {}",
            reqs.title_required_strings.join(", ")
        ));
    }
    if !reqs.body_required_strings.is_empty() {
        req_parts.push(format!(
            "Body MUST contain one of: {}",
            reqs.body_required_strings.join(", ")
        ));
    }
    if reqs.is_flair_required {
        req_parts.push("Flair is REQUIRED for this subreddit".to_string());
    }
    let requirements_section = if req_parts.is_empty() {
        String::new()
    } else {
        format!(
            "\n\nPOST REQUIREMENTS:\n{}",
            req_parts
                .iter()
                .map(|p| format!("- {}", p))
                .collect::<Vec<_>>()
                .join("\n")
        )
    };

    let mut flair_section = String::new();
    if !rules.flair_options.is_empty() {
        flair_section.push_str("\n\nAVAILABLE FLAIRS (pick the most appropriate one):\n");
        for f in rules.flair_options.iter().take(10) {
            flair_section.push_str(&format!("- {} (id: {})\n", f.text, f.id));
        }
        flair_section.push_str("\nInclude your flair choice at the end: FLAIR: [flair text]");
    }

    let titles = recent_titles(history);
    let recent_section = if titles.is_empty() {
        "(no previous posts)".to_string()
    } else {
        titles
            .iter()
            .map(|t| format!("- {}", t))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let examples_section = if examples.is_empty() {
        String::new()
    } else {
        let mut s = String::from("Reference examples of good posts:");
        for (i, ex) in examples.iter().enumerate() {
            s.push_str(&format!(
                "\n--- Example {} ---\nTITLE: {}\nBODY:\n{}\n",
                i + 1,
                ex.title,
                ex.body
            ));
        }
        s
    };

    let user_prompt = format!(
        r#"Write a Reddit post for **{community}** using **Angle {angle} ({angle_name})**.

{guide}

Subreddit context:
- Subscribers: {subscribers}
- Activity: {activity}
- Tone/rules: {promo_rules}
- Community notes: {notes}
{rules_section}{requirements_section}{flair_section}

Recent post titles (AVOID similar topics, be fresh and different):
{recent_section}

{examples_section}

CRITICAL: Your post MUST comply with ALL subreddit rules above. If rules say no promotion, make the post genuinely valuable with only a brief, natural mention of the product. If rules require specific formats, follow them exactly.

Output EXACTLY in this format:
TITLE: [your title here]
---
BODY:
[your body here]"#,
        community = profile.id,
        angle = angle,
        angle_name = angle.name(),
        guide = angle_guide(angle),
        subscribers = with_thousands(profile.subscribers),
        activity = activity_label(profile.activity),
        promo_rules = profile.promo_rules,
        notes = profile.notes,
        rules_section = rules_section,
        requirements_section = requirements_section,
        flair_section = flair_section,
        recent_section = recent_section,
        examples_section = examples_section,
    );

    (system_prompt, user_prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::metrics_client::{CommunityRule, FlairOption, PostRequirements};

    #[test]
    fn parses_title_body_and_strips_flair() {
        let text = "TITLE: \"After 6 months, what I learned\"\n---\nBODY:\nFirst line.\n\nWhat do you think?\nFLAIR: [Discussion]\n";
        let parsed = parse_response(text).unwrap();
        assert_eq!(parsed.title, "After 6 months, what I learned");
        assert_eq!(parsed.body, "First line.\n\nWhat do you think?");
        assert_eq!(parsed.flair.as_deref(), Some("Discussion"));
    }

    #[test]
    fn body_on_same_line_as_marker() {
        let parsed = parse_response("TITLE: t\nBODY: inline start\nmore").unwrap();
        assert_eq!(parsed.body, "inline start\nmore");
        assert!(parsed.flair.is_none());
    }

    #[test]
    fn unparseable_output_is_none() {
        assert!(parse_response("Sure! Here's a post about your product.").is_none());
        assert!(parse_response("TITLE: only a title").is_none());
    }

    #[test]
    fn retry_state_threads_issues_forward() {
        let first = RetryState::first();
        assert_eq!(first.feedback(), "");

        let second = first.next(vec!["title too short".into(), "body too short".into()]);
        assert_eq!(second.attempt, 1);
        assert!(second.feedback().contains("Issues: title too short, body too short"));
    }

    #[test]
    fn prompts_include_rules_flairs_and_recent_titles() {
        let product = ProductConfig {
            name: "Tally".into(),
            description: "Expense splitting".into(),
            ..ProductConfig::default()
        };
        let profile = CommunityProfile::new("r/SideProject", 250_000);
        let rules = CommunityRules {
            rules: vec![CommunityRule {
                name: "No spam".into(),
                description: "Self-promo only on weekends".into(),
            }],
            requirements: PostRequirements {
                is_flair_required: true,
                ..PostRequirements::default()
            },
            flair_options: vec![FlairOption {
                id: "f1".into(),
                text: "Feedback".into(),
            }],
        };
        let history = vec![PostRecord::new(
            "abc",
            "https://www.reddit.com/r/a/comments/abc/",
            "r/a",
            "Old title to avoid",
            Angle::A,
            chrono::Utc::now(),
        )
        .unwrap()];

        let (system, user) = build_prompts(&product, &profile, Angle::B, &history, &[], &rules);
        assert!(system.contains("content writer for Tally"));
        assert!(user.contains("Angle B (Feedback Request)"));
        assert!(user.contains("Subscribers: 250,000"));
        assert!(user.contains("**No spam**"));
        assert!(user.contains("Flair is REQUIRED"));
        assert!(user.contains("- Feedback (id: f1)"));
        assert!(user.contains("- Old title to avoid"));
    }

    #[test]
    fn thousands_separator() {
        assert_eq!(with_thousands(0), "0");
        assert_eq!(with_thousands(999), "999");
        assert_eq!(with_thousands(1000), "1,000");
        assert_eq!(with_thousands(1234567), "1,234,567");
    }
}
