//! 内容质量检查 - 业务能力层
//!
//! 只回答"这篇稿子能不能发"，并列出不通过的具体原因，供下一轮生成参考。

/// 营销腔禁用词
pub const BANNED_PHRASES: [&str; 11] = [
    "game-changing",
    "revolutionary",
    "excited to share",
    "thrilled to announce",
    "innovative",
    "disruptive",
    "passionate about",
    "leveraging",
    "seamless",
    "robust",
    "cutting-edge",
];

/// 不允许的标题开头
pub const BAD_TITLE_STARTS: [&str; 5] = ["i built", "i made", "check out", "launching", "excited"];

/// 容易触发站点垃圾过滤的词
pub const SPAM_TRIGGER_WORDS: [&str; 10] = [
    "free",
    "discount",
    "promo code",
    "hack",
    "scrape",
    "bot",
    "automate posting",
    "growth hack",
    "viral trick",
    "monetize fast",
];

const TITLE_MIN_CHARS: usize = 30;
const TITLE_MAX_CHARS: usize = 150;
const BODY_MIN_CHARS: usize = 200;

/// 检查结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualityReport {
    pub issues: Vec<String>,
}

impl QualityReport {
    pub fn passed(&self) -> bool {
        self.issues.is_empty()
    }
}

/// 检查标题和正文
pub fn quality_check(title: &str, body: &str) -> QualityReport {
    let mut issues = Vec::new();
    let full_text = format!("{} {}", title, body).to_lowercase();

    for phrase in BANNED_PHRASES {
        if full_text.contains(phrase) {
            issues.push(format!("contains banned phrase '{}'", phrase));
        }
    }

    for word in SPAM_TRIGGER_WORDS {
        if full_text.contains(word) {
            issues.push(format!("contains spam trigger word '{}'", word));
        }
    }

    let title_lower = title.to_lowercase();
    for start in BAD_TITLE_STARTS {
        if title_lower.starts_with(start) {
            issues.push(format!("title starts with '{}'", start));
        }
    }

    let title_len = title.chars().count();
    if title_len < TITLE_MIN_CHARS {
        issues.push(format!("title too short ({} chars, aim for 60-100)", title_len));
    } else if title_len > TITLE_MAX_CHARS {
        issues.push(format!("title too long ({} chars, aim for 60-100)", title_len));
    }

    if body.chars().count() < BODY_MIN_CHARS {
        issues.push(format!("body too short (at least {} chars)", BODY_MIN_CHARS));
    }

    if !ends_with_question(body) {
        issues.push("body does not end with a question".to_string());
    }

    QualityReport { issues }
}

/// 只看最后一行和倒数第二行是否有问号
fn ends_with_question(body: &str) -> bool {
    let lines: Vec<&str> = body.trim().split('\n').collect();
    lines.iter().rev().take(2).any(|line| line.contains('?'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_TITLE: &str = "After 8 months of side-project nights, what I learned about pricing";

    fn good_body() -> String {
        format!(
            "{}\n\nI'm not sure the annual plan was worth it.\nHow did you decide on yours?",
            "Some honest context about the journey so far. ".repeat(5)
        )
    }

    #[test]
    fn clean_post_passes() {
        let report = quality_check(GOOD_TITLE, &good_body());
        assert!(report.passed(), "{:?}", report.issues);
    }

    #[test]
    fn each_rule_reports_its_issue() {
        let report = quality_check("I built a revolutionary bot", "short body");
        let joined = report.issues.join(" | ");
        assert!(joined.contains("banned phrase 'revolutionary'"));
        assert!(joined.contains("spam trigger word 'bot'"));
        assert!(joined.contains("title starts with 'i built'"));
        assert!(joined.contains("title too short"));
        assert!(joined.contains("body too short"));
        assert!(joined.contains("does not end with a question"));
    }

    #[test]
    fn question_in_second_to_last_line_is_enough() {
        let body = format!("{}\nWhat would you do?\nThanks for reading.", "x".repeat(250));
        assert!(quality_check(GOOD_TITLE, &body).passed());

        // 更早的问号不算
        let body = format!("Why?\n{}\nline two\nline three", "x".repeat(250));
        assert!(!quality_check(GOOD_TITLE, &body).passed());
    }
}
