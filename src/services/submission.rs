//! 发帖适配器 - 业务能力层
//!
//! 通过已登录的浏览器会话，在页面上下文里调用站点自己的接口发帖：
//!
//! 1. 检查控制通道可用、至少有一个窗口
//! 2. 确保活动标签页与站点同源（否则导航过去）
//! 3. 页面内请求 `/api/me.json` 取 modhash（CSRF token），拿不到即视为未登录
//! 4. 页面内 POST `/api/submit`
//! 5. 结构化错误命中人机验证 → 打开预填好的人工发帖页，返回 `captcha_fallback`
//! 6. 成功时取帖子 URL / ID
//! 7. 需要或指定了 flair 时，再调一次 `/api/selectflair`（失败只记日志）
//! 8. 等待一段时间后用公开接口验证帖子是否被自动移除

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::browser::site_origin;
use crate::error::{ApiError, AppError, AppResult, SubmissionError};
use crate::infrastructure::ScriptChannel;
use crate::models::profile::bare_community;
use crate::services::flair::{auto_select_flair, resolve_flair};
use crate::services::metrics_client::{CommunityRulesSource, FlairOption, PostMetricsSource};

/// dry-run 使用的合成帖子 ID
pub const DRY_RUN_POST_ID: &str = "DRY_RUN";

/// 一次发帖请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub community: String,
    pub title: String,
    pub body: String,
    /// 内容生成给出的 flair 名称
    pub flair_hint: Option<String>,
    pub dry_run: bool,
}

/// 发帖结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub success: bool,
    pub url: String,
    pub post_id: String,
    pub error: Option<String>,
    pub verified: bool,
    /// 需要人工在打开的页面里完成发帖
    pub captcha_fallback: bool,
    /// 实际使用的 flair 文本
    pub flair: Option<String>,
    pub dry_run: bool,
}

impl SubmitOutcome {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// 发帖能力
///
/// 流程层只依赖这个 trait；失败都折叠进 [`SubmitOutcome`]，不返回 Err。
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, request: &SubmitRequest) -> SubmitOutcome;
}

/// 站点对 `/api/submit` 的回应
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResponse {
    Posted { url: String, post_id: String },
    Challenge(String),
    Rejected(String),
    Unrecognized(String),
}

/// 基于浏览器会话的发帖适配器
pub struct SubmissionAdapter {
    channel: Option<Arc<dyn ScriptChannel>>,
    metrics: Arc<dyn PostMetricsSource>,
    rules: Arc<dyn CommunityRulesSource>,
    site_base_url: String,
    token_wait: Duration,
    submit_wait: Duration,
    verify_delay: Duration,
    verify: bool,
}

impl SubmissionAdapter {
    /// `channel` 为 None 表示浏览器连不上；此时只有 dry-run 能成功
    pub fn new(
        channel: Option<Arc<dyn ScriptChannel>>,
        metrics: Arc<dyn PostMetricsSource>,
        rules: Arc<dyn CommunityRulesSource>,
        site_base_url: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            metrics,
            rules,
            site_base_url: site_base_url.into().trim_end_matches('/').to_string(),
            token_wait: Duration::from_secs(3),
            submit_wait: Duration::from_secs(5),
            verify_delay: Duration::from_secs(60),
            verify: true,
        }
    }

    /// 设置 token 等待 / 发帖等待 / 验证前等待
    pub fn with_timings(mut self, token_wait: Duration, submit_wait: Duration, verify_delay: Duration) -> Self {
        self.token_wait = token_wait;
        self.submit_wait = submit_wait;
        self.verify_delay = verify_delay;
        self
    }

    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    fn dry_run_outcome(&self, request: &SubmitRequest) -> SubmitOutcome {
        let sub = bare_community(&request.community);
        info!("  [DRY RUN] 模拟发帖到 r/{}", sub);
        info!("  标题: {}", request.title);
        SubmitOutcome {
            success: true,
            url: format!("{}/r/{}/comments/{}/", self.site_base_url, sub, DRY_RUN_POST_ID),
            post_id: DRY_RUN_POST_ID.to_string(),
            error: None,
            verified: true,
            captcha_fallback: false,
            flair: request.flair_hint.clone(),
            dry_run: true,
        }
    }

    /// 步骤 1：控制通道检查
    async fn ready_channel(&self) -> AppResult<&Arc<dyn ScriptChannel>> {
        let channel = self.channel.as_ref().ok_or_else(|| SubmissionError::ChannelUnavailable {
            reason: "未连接到浏览器（请以调试端口启动浏览器）".to_string(),
        })?;

        match channel.window_count().await {
            Ok(0) => Err(SubmissionError::ChannelUnavailable {
                reason: "浏览器没有打开任何窗口".to_string(),
            }
            .into()),
            Ok(n) => {
                info!("  ✅ 浏览器已就绪 ({} 个窗口)", n);
                Ok(channel)
            }
            Err(e) => Err(SubmissionError::ChannelUnavailable {
                reason: e.to_string(),
            }
            .into()),
        }
    }

    /// 步骤 2：保证同源
    async fn ensure_site_origin(&self, channel: &dyn ScriptChannel) -> AppResult<()> {
        let current = channel.current_url().await.unwrap_or_default();
        if site_origin(&current) == site_origin(&self.site_base_url) {
            return Ok(());
        }
        info!("  当前页面不在站点上，导航到 {}", self.site_base_url);
        channel.navigate(&self.site_base_url).await
    }

    /// 步骤 3：取 modhash
    async fn fetch_modhash(&self, channel: &dyn ScriptChannel) -> AppResult<String> {
        let raw = channel
            .invoke_and_await(&modhash_script(), self.token_wait)
            .await
            .map_err(|e| {
                debug!("获取 modhash 失败: {}", e);
                AppError::Submission(SubmissionError::NotAuthenticated)
            })?;

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::String(modhash)) if !modhash.is_empty() => Ok(modhash),
            _ => Err(SubmissionError::NotAuthenticated.into()),
        }
    }

    /// 决定要用的 flair：有提示按名字解析，否则在社区要求时自动挑选
    async fn choose_flair(&self, request: &SubmitRequest) -> Option<FlairOption> {
        let rules = self.rules.fetch_community_rules(&request.community).await;
        if rules.flair_options.is_empty() {
            if rules.flair_required() {
                warn!("  ⚠️ 社区要求 flair，但没有取到可选项");
            }
            return None;
        }

        if let Some(hint) = request.flair_hint.as_deref().filter(|h| !h.trim().is_empty()) {
            match resolve_flair(hint, &rules.flair_options) {
                Some(option) => return Some(option.clone()),
                None => warn!("  ⚠️ 没有与 '{}' 匹配的 flair", hint),
            }
        }

        if rules.flair_required() || request.flair_hint.is_some() {
            return auto_select_flair(&rules.flair_options, &request.title, &request.body).cloned();
        }
        None
    }

    /// 步骤 5：打开人工兜底页面
    async fn open_fallback(&self, channel: &dyn ScriptChannel, request: &SubmitRequest, flair: Option<&FlairOption>) {
        match fallback_url(&self.site_base_url, request, flair) {
            Ok(url) => {
                if let Err(e) = channel.open_tab(&url).await {
                    warn!("  ⚠️ 打开人工发帖页失败: {}", e);
                } else {
                    info!("  🧑 已打开预填好的发帖页，请人工完成验证");
                }
            }
            Err(e) => warn!("  ⚠️ 构建人工发帖链接失败: {}", e),
        }
    }

    /// 步骤 7：应用 flair
    async fn apply_flair(&self, channel: &dyn ScriptChannel, post_id: &str, flair: &FlairOption, modhash: &str) -> AppResult<()> {
        let raw = channel
            .invoke_and_await(&select_flair_script(post_id, &flair.id, modhash), self.token_wait)
            .await?;
        let value: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);
        let status = value.get("status").and_then(Value::as_u64).unwrap_or(0);
        let errors = collect_errors(value.get("body").unwrap_or(&Value::Null));
        if !(200..300).contains(&status) || !errors.is_empty() {
            return Err(SubmissionError::Rejected {
                message: format!("selectflair HTTP {} {}", status, errors.join("; ")),
            }
            .into());
        }
        Ok(())
    }

    /// 步骤 8：验证帖子是否仍然存在
    async fn verify_post(&self, url: &str) -> bool {
        if !self.verify_delay.is_zero() {
            info!("  等待 {} 秒后验证帖子状态...", self.verify_delay.as_secs());
            sleep(self.verify_delay).await;
        }
        match self.metrics.fetch_post_metrics(url).await {
            Ok(metrics) => !metrics.is_removed,
            Err(AppError::Api(ApiError::NotFound { .. })) => false,
            Err(e) => {
                debug!("验证请求失败，按未删除处理: {}", e);
                true
            }
        }
    }

    async fn try_submit(&self, request: &SubmitRequest) -> AppResult<SubmitOutcome> {
        let channel = self.ready_channel().await?;
        self.ensure_site_origin(channel.as_ref()).await?;

        info!("  正在获取认证信息...");
        let modhash = self.fetch_modhash(channel.as_ref()).await?;
        info!("  ✅ 认证成功");

        let flair = self.choose_flair(request).await;
        if let Some(f) = &flair {
            info!("  🏷️ 使用 flair: {}", f.text);
        }

        let sub = bare_community(&request.community);
        info!("  正在发帖到 r/{}...", sub);
        let raw = channel
            .invoke_and_await(&submit_script(sub, &request.title, &request.body, &modhash), self.submit_wait)
            .await?;

        match interpret_submit_response(&raw) {
            SubmitResponse::Challenge(message) => {
                warn!("  🤖 触发人机验证: {}", message);
                self.open_fallback(channel.as_ref(), request, flair.as_ref()).await;
                Ok(SubmitOutcome {
                    success: false,
                    error: Some(SubmissionError::ChallengeRequired { message }.to_string()),
                    captcha_fallback: true,
                    flair: flair.map(|f| f.text),
                    ..SubmitOutcome::default()
                })
            }
            SubmitResponse::Rejected(message) => Err(SubmissionError::Rejected { message }.into()),
            SubmitResponse::Unrecognized(message) => Err(SubmissionError::UnrecognizedResponse { message }.into()),
            SubmitResponse::Posted { url, post_id } => {
                info!("  ✅ 发帖成功: {}", url);

                let mut applied = None;
                if let Some(f) = flair {
                    match self.apply_flair(channel.as_ref(), &post_id, &f, &modhash).await {
                        Ok(()) => applied = Some(f.text),
                        Err(e) => warn!("  ⚠️ flair 设置失败（帖子已发出）: {}", e),
                    }
                }

                let verified = if self.verify && !url.is_empty() {
                    let ok = self.verify_post(&url).await;
                    if ok {
                        info!("  ✅ 帖子验证通过（未被自动删除）");
                    } else {
                        warn!("  ⚠️ 帖子可能被自动删除");
                    }
                    ok
                } else {
                    true
                };

                Ok(SubmitOutcome {
                    success: true,
                    url,
                    post_id,
                    error: None,
                    verified,
                    captcha_fallback: false,
                    flair: applied,
                    dry_run: false,
                })
            }
        }
    }
}

#[async_trait]
impl Submitter for SubmissionAdapter {
    async fn submit(&self, request: &SubmitRequest) -> SubmitOutcome {
        if request.dry_run {
            return self.dry_run_outcome(request);
        }
        match self.try_submit(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("  ❌ 发帖失败: {}", e);
                SubmitOutcome::failed(e.to_string())
            }
        }
    }
}

// ========== 页面脚本 ==========

fn modhash_script() -> String {
    r#"
        const resp = await fetch("/api/me.json", { credentials: "include" });
        const data = await resp.json();
        return (data && data.data && data.data.modhash) || "";
    "#
    .to_string()
}

fn submit_script(sub: &str, title: &str, body: &str, modhash: &str) -> String {
    let form = json!({
        "sr": sub,
        "kind": "self",
        "title": title,
        "text": body,
        "uh": modhash,
        "api_type": "json",
        "resubmit": "true",
    });
    format!(
        r#"
        const params = new URLSearchParams({form});
        const resp = await fetch("/api/submit", {{
            method: "POST",
            credentials: "include",
            headers: {{ "Content-Type": "application/x-www-form-urlencoded" }},
            body: params.toString(),
        }});
        return await resp.json();
        "#,
        form = form,
    )
}

fn select_flair_script(post_id: &str, flair_id: &str, modhash: &str) -> String {
    let link = format!("t3_{}", post_id.trim_start_matches("t3_"));
    let form = json!({
        "api_type": "json",
        "link": link,
        "flair_template_id": flair_id,
        "uh": modhash,
    });
    format!(
        r#"
        const resp = await fetch("/api/selectflair", {{
            method: "POST",
            credentials: "include",
            headers: {{ "Content-Type": "application/x-www-form-urlencoded" }},
            body: new URLSearchParams({form}).toString(),
        }});
        return {{ status: resp.status, body: await resp.json().catch(() => null) }};
        "#,
        form = form,
    )
}

/// 人工兜底页：标题 / 正文（/ flair）预填好的发帖页
pub fn fallback_url(base: &str, request: &SubmitRequest, flair: Option<&FlairOption>) -> AppResult<String> {
    let mut params = vec![("title", request.title.as_str()), ("text", request.body.as_str())];
    if let Some(f) = flair {
        params.push(("flair_id", f.id.as_str()));
    }
    let page = format!("{}/r/{}/submit", base, bare_community(&request.community));
    reqwest::Url::parse_with_params(&page, &params)
        .map(|u| u.to_string())
        .map_err(|e| AppError::Other(format!("无效的发帖链接 {}: {}", page, e)))
}

// ========== 响应解析 ==========

/// 错误文本是否指向人机验证
pub fn is_challenge(message: &str) -> bool {
    if let Ok(re) = Regex::new(r"(?i)captcha|challenge|verif(y|ication)|are you (a )?(human|robot)") {
        return re.is_match(message);
    }
    message.to_lowercase().contains("captcha")
}

/// `json.errors` 是 `[[code, message, field], ...]`，拼成可读文本
fn collect_errors(payload: &Value) -> Vec<String> {
    payload
        .get("json")
        .and_then(|j| j.get("errors"))
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .map(|e| match e {
                    Value::Array(parts) => parts
                        .iter()
                        .filter_map(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>()
                        .join(": "),
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// 解析 `/api/submit` 的返回
pub fn interpret_submit_response(raw: &str) -> SubmitResponse {
    let payload: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => return SubmitResponse::Unrecognized(format!("解析响应失败: {}", e)),
    };

    let errors = collect_errors(&payload);
    let has_captcha_field = payload
        .get("json")
        .and_then(|j| j.get("captcha"))
        .is_some_and(|c| !c.is_null());
    if has_captcha_field || errors.iter().any(|e| is_challenge(e)) {
        let message = if errors.is_empty() {
            "captcha".to_string()
        } else {
            errors.join("; ")
        };
        return SubmitResponse::Challenge(message);
    }
    if !errors.is_empty() {
        return SubmitResponse::Rejected(errors.join("; "));
    }

    let data = payload.get("json").and_then(|j| j.get("data"));
    let url = data
        .and_then(|d| d.get("url"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let post_id = data
        .and_then(|d| d.get("id"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    if url.is_empty() || post_id.is_empty() {
        let preview: String = raw.chars().take(100).collect();
        return SubmitResponse::Unrecognized(preview);
    }

    SubmitResponse::Posted {
        url: url.to_string(),
        post_id: post_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::metrics_client::{CommunityRules, PostMetrics, PostRequirements};
    use std::sync::Mutex;

    /// 按脚本内容返回预设结果的假通道
    struct FakeChannel {
        windows: usize,
        url: Mutex<String>,
        modhash: &'static str,
        submit_response: Value,
        scripts: Mutex<Vec<String>>,
        opened: Mutex<Vec<String>>,
    }

    impl FakeChannel {
        fn new(submit_response: Value) -> Self {
            Self {
                windows: 1,
                url: Mutex::new("https://www.reddit.com/".to_string()),
                modhash: "uh-123",
                submit_response,
                scripts: Mutex::new(Vec::new()),
                opened: Mutex::new(Vec::new()),
            }
        }

        fn scripts_containing(&self, needle: &str) -> usize {
            self.scripts.lock().unwrap().iter().filter(|s| s.contains(needle)).count()
        }
    }

    #[async_trait]
    impl ScriptChannel for FakeChannel {
        async fn window_count(&self) -> AppResult<usize> {
            Ok(self.windows)
        }

        async fn current_url(&self) -> AppResult<String> {
            Ok(self.url.lock().unwrap().clone())
        }

        async fn navigate(&self, url: &str) -> AppResult<()> {
            *self.url.lock().unwrap() = url.to_string();
            Ok(())
        }

        async fn invoke_and_await(&self, body: &str, _timeout: Duration) -> AppResult<String> {
            self.scripts.lock().unwrap().push(body.to_string());
            if body.contains("/api/me.json") {
                return Ok(Value::String(self.modhash.to_string()).to_string());
            }
            if body.contains("/api/submit") {
                return Ok(self.submit_response.to_string());
            }
            if body.contains("/api/selectflair") {
                return Ok(json!({"status": 200, "body": {"json": {"errors": []}}}).to_string());
            }
            Ok("null".to_string())
        }

        async fn open_tab(&self, url: &str) -> AppResult<()> {
            self.opened.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    struct FakeMetrics {
        removed: bool,
    }

    #[async_trait]
    impl PostMetricsSource for FakeMetrics {
        async fn fetch_post_metrics(&self, _post_url: &str) -> AppResult<PostMetrics> {
            Ok(PostMetrics {
                is_removed: self.removed,
                ..PostMetrics::default()
            })
        }
    }

    struct FakeRules {
        required: bool,
        options: Vec<FlairOption>,
    }

    #[async_trait]
    impl CommunityRulesSource for FakeRules {
        async fn fetch_community_rules(&self, _community: &str) -> CommunityRules {
            CommunityRules {
                requirements: PostRequirements {
                    is_flair_required: self.required,
                    ..PostRequirements::default()
                },
                flair_options: self.options.clone(),
                ..CommunityRules::default()
            }
        }
    }

    fn no_rules() -> Arc<FakeRules> {
        Arc::new(FakeRules {
            required: false,
            options: Vec::new(),
        })
    }

    fn adapter(channel: Option<Arc<FakeChannel>>, removed: bool, rules: Arc<FakeRules>) -> SubmissionAdapter {
        SubmissionAdapter::new(
            channel.map(|c| c as Arc<dyn ScriptChannel>),
            Arc::new(FakeMetrics { removed }),
            rules,
            "https://www.reddit.com",
        )
        .with_timings(Duration::ZERO, Duration::ZERO, Duration::ZERO)
    }

    fn request(dry_run: bool) -> SubmitRequest {
        SubmitRequest {
            community: "r/SideProject".to_string(),
            title: "What three months of nights taught me".to_string(),
            body: "Body with \"quotes\" and\nnewlines".to_string(),
            flair_hint: None,
            dry_run,
        }
    }

    fn posted() -> Value {
        json!({"json": {"errors": [], "data": {"url": "https://www.reddit.com/r/SideProject/comments/abc123/x/", "id": "abc123", "name": "t3_abc123"}}})
    }

    #[tokio::test]
    async fn challenge_opens_prefilled_fallback() {
        let channel = Arc::new(FakeChannel::new(json!({
            "json": {"errors": [["BAD_CAPTCHA", "care to try these again?", "captcha"]]}
        })));
        let outcome = adapter(Some(channel.clone()), false, no_rules())
            .submit(&request(false))
            .await;

        assert!(!outcome.success);
        assert!(outcome.captcha_fallback);
        let opened = channel.opened.lock().unwrap();
        assert_eq!(opened.len(), 1);
        assert!(opened[0].starts_with("https://www.reddit.com/r/SideProject/submit?title="));
        assert!(opened[0].contains("text="));
    }

    #[tokio::test]
    async fn missing_modhash_means_not_authenticated() {
        let mut channel = FakeChannel::new(posted());
        channel.modhash = "";
        let channel = Arc::new(channel);
        let outcome = adapter(Some(channel.clone()), false, no_rules())
            .submit(&request(false))
            .await;

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("modhash"));
        assert_eq!(channel.scripts_containing("/api/submit"), 0);
    }

    #[tokio::test]
    async fn no_windows_short_circuits() {
        let mut channel = FakeChannel::new(posted());
        channel.windows = 0;
        let channel = Arc::new(channel);
        let outcome = adapter(Some(channel.clone()), false, no_rules())
            .submit(&request(false))
            .await;

        assert!(!outcome.success);
        assert!(channel.scripts.lock().unwrap().is_empty());

        let outcome = adapter(None, false, no_rules()).submit(&request(false)).await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn dry_run_never_touches_the_channel() {
        let channel = Arc::new(FakeChannel::new(posted()));
        let outcome = adapter(Some(channel.clone()), false, no_rules())
            .submit(&request(true))
            .await;

        assert!(outcome.success);
        assert!(outcome.dry_run);
        assert_eq!(outcome.post_id, DRY_RUN_POST_ID);
        assert_eq!(outcome.url, "https://www.reddit.com/r/SideProject/comments/DRY_RUN/");
        assert!(channel.scripts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn success_navigates_applies_flair_and_verifies() {
        let mut channel = FakeChannel::new(posted());
        channel.url = Mutex::new("https://example.com/elsewhere".to_string());
        let channel = Arc::new(channel);
        let rules = Arc::new(FakeRules {
            required: true,
            options: vec![
                FlairOption {
                    id: "f1".to_string(),
                    text: "Showcase".to_string(),
                },
                FlairOption {
                    id: "f2".to_string(),
                    text: "Feedback Request".to_string(),
                },
            ],
        });
        let mut req = request(false);
        req.flair_hint = Some("feedback".to_string());

        let outcome = adapter(Some(channel.clone()), false, rules).submit(&req).await;

        assert!(outcome.success);
        assert!(outcome.verified);
        assert_eq!(outcome.post_id, "abc123");
        assert_eq!(outcome.flair.as_deref(), Some("Feedback Request"));
        assert_eq!(*channel.url.lock().unwrap(), "https://www.reddit.com");
        assert_eq!(channel.scripts_containing(r#""flair_template_id":"f2""#), 1);
        // 标题正文经过 JSON 转义后嵌入脚本
        assert_eq!(channel.scripts_containing(r#"\"quotes\""#), 1);
    }

    #[tokio::test]
    async fn removed_post_is_unverified() {
        let channel = Arc::new(FakeChannel::new(posted()));
        let outcome = adapter(Some(channel), true, no_rules())
            .submit(&request(false))
            .await;
        assert!(outcome.success);
        assert!(!outcome.verified);
    }

    #[test]
    fn response_classification() {
        assert_eq!(
            interpret_submit_response(&json!({"json": {"errors": [["SUBREDDIT_NOTALLOWED", "you aren't allowed", "sr"]]}}).to_string()),
            SubmitResponse::Rejected("SUBREDDIT_NOTALLOWED: you aren't allowed: sr".to_string())
        );
        assert!(matches!(
            interpret_submit_response(r#"{"json": {"errors": [], "captcha": "xyz"}}"#),
            SubmitResponse::Challenge(_)
        ));
        assert!(matches!(interpret_submit_response("<html>"), SubmitResponse::Unrecognized(_)));
        assert!(matches!(interpret_submit_response(&posted().to_string()), SubmitResponse::Posted { .. }));
    }
}
