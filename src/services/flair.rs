//! Flair 匹配 - 业务能力层
//!
//! 两种用法：
//! - 有明确提示（内容生成给出的 `FLAIR:` 行）：按名字解析
//! - 没有提示：按标题和正文给每个 flair 打分，自动挑选

use phf::phf_map;

use super::metrics_client::FlairOption;

/// 语义类别 → 关键词
///
/// flair 文本里出现类别名时，正文每命中一个关键词 +3
static CATEGORY_KEYWORDS: phf::Map<&'static str, &'static [&'static str]> = phf_map! {
    "feedback" => &["feedback", "thoughts", "opinion", "review", "critique", "roast"],
    "question" => &["?", "how do", "how would", "what is", "anyone", "advice"],
    "help" => &["help", "stuck", "advice", "struggling", "problem"],
    "showcase" => &["built", "made", "launched", "project", "demo", "shipped"],
    "show" => &["built", "made", "launched", "project", "demo", "shipped"],
    "discussion" => &["discuss", "thoughts", "opinion", "debate", "curious"],
    "resource" => &["guide", "tutorial", "tips", "lessons", "learned", "checklist"],
    "milestone" => &["revenue", "users", "mrr", "growth", "months", "first"],
    "story" => &["journey", "story", "months", "years", "learned", "failed"],
};

/// 没有任何 flair 得分时，优先选这类通用 flair
const GENERIC_MARKERS: [&str; 4] = ["discussion", "general", "other", "misc"];

/// 按名字解析 flair：先忽略大小写精确匹配，再双向包含匹配
pub fn resolve_flair<'a>(hint: &str, options: &'a [FlairOption]) -> Option<&'a FlairOption> {
    let hint = hint.trim().to_lowercase();
    if hint.is_empty() {
        return None;
    }

    if let Some(exact) = options.iter().find(|f| f.text.trim().to_lowercase() == hint) {
        return Some(exact);
    }

    options.iter().find(|f| {
        let text = f.text.trim().to_lowercase();
        !text.is_empty() && (text.contains(&hint) || hint.contains(&text))
    })
}

/// 单个 flair 的得分
pub fn score_flair(flair_text: &str, title: &str, body: &str) -> u32 {
    let tag = flair_text.to_lowercase();
    let title = title.to_lowercase();
    let content = format!("{} {}", title, body.to_lowercase());

    let mut score = 0;

    for (category, keywords) in CATEGORY_KEYWORDS.entries() {
        if tag.contains(category) {
            score += 3 * keywords.iter().filter(|kw| content.contains(*kw)).count() as u32;
        }
    }

    for word in tag
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
    {
        if content.contains(word) {
            score += 1;
        }
        if title.contains(word) {
            score += 2;
        }
    }

    score
}

/// 自动挑选 flair
///
/// 得分最高者胜出，同分取先出现的；全部为 0 时退回通用 flair，再退回第一个
pub fn auto_select_flair<'a>(
    options: &'a [FlairOption],
    title: &str,
    body: &str,
) -> Option<&'a FlairOption> {
    let mut best: Option<(&FlairOption, u32)> = None;
    for option in options {
        let score = score_flair(&option.text, title, body);
        if score > 0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((option, score));
        }
    }

    if let Some((option, _)) = best {
        return Some(option);
    }

    options
        .iter()
        .find(|f| {
            let text = f.text.to_lowercase();
            GENERIC_MARKERS.iter().any(|m| text.contains(m))
        })
        .or_else(|| options.first())
}
