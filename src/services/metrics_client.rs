//! 公开数据客户端 - 业务能力层
//!
//! 只负责"读取公开的帖子 / 社区元数据"能力，不需要任何认证。
//! 站点上的公开内容都可以通过在 URL 后面加 `.json` 读取。
//!
//! 限流（HTTP 429）按服务端给出的 `Retry-After` 等待后重试，重试次数有上限；
//! 用尽后只让当前这一项失败，不影响批处理。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{ApiError, AppError, AppResult};
use crate::models::profile::bare_community;

const USER_AGENT: &str = "reddit-auto-post/0.1 (personal use)";
/// 没有 Retry-After 头时的默认等待
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
/// 单次限流等待的上限
const MAX_RETRY_AFTER_SECS: u64 = 300;

/// 帖子公开指标
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostMetrics {
    pub score: i64,
    pub upvote_ratio: f64,
    pub num_comments: u64,
    pub title: String,
    /// `r/<name>` 形式
    pub community: String,
    pub author: String,
    pub created_utc: f64,
    pub url: String,
    /// 被版主或自动审核移除
    pub is_removed: bool,
}

/// 社区基本信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunityInfo {
    pub name: String,
    pub subscribers: u64,
    pub active_users: u64,
    pub description: String,
    pub over18: bool,
    pub allow_text: bool,
    pub allow_link: bool,
}

/// 社区近期帖子
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecentPost {
    pub title: String,
    pub score: i64,
    pub num_comments: u64,
    pub upvote_ratio: f64,
    pub is_self: bool,
    pub flair: String,
    pub url: String,
    pub created_utc: f64,
}

/// 社区规则条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityRule {
    pub name: String,
    pub description: String,
}

/// 发帖要求
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostRequirements {
    pub title_min_length: Option<u64>,
    pub body_min_length: Option<u64>,
    pub title_required_strings: Vec<String>,
    pub body_required_strings: Vec<String>,
    pub is_flair_required: bool,
}

/// 可选的 flair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlairOption {
    pub id: String,
    pub text: String,
}

/// 规则 + 发帖要求 + flair 选项（每部分都是尽力获取）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunityRules {
    pub rules: Vec<CommunityRule>,
    pub requirements: PostRequirements,
    pub flair_options: Vec<FlairOption>,
}

impl CommunityRules {
    pub fn flair_required(&self) -> bool {
        self.requirements.is_flair_required
    }
}

/// 帖子指标来源
///
/// 发帖验证和表现刷新只依赖这个能力，测试时可以替换。
#[async_trait]
pub trait PostMetricsSource: Send + Sync {
    async fn fetch_post_metrics(&self, post_url: &str) -> AppResult<PostMetrics>;
}

/// 社区规则来源（规则 / 发帖要求 / flair 选项）
#[async_trait]
pub trait CommunityRulesSource: Send + Sync {
    /// 任何一部分失败都只记日志，返回默认值
    async fn fetch_community_rules(&self, community: &str) -> CommunityRules;
}

/// 公开数据客户端
pub struct MetricsClient {
    http: reqwest::Client,
    base_url: String,
    max_retries: u32,
    connect_retry_delay: Duration,
}

impl MetricsClient {
    /// 创建新的客户端（15 秒请求超时，最多重试 2 次）
    pub fn new(base_url: impl Into<String>) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                AppError::Api(ApiError::RequestFailed {
                    endpoint: "client".to_string(),
                    message: e.to_string(),
                })
            })?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_retries: 2,
            connect_retry_delay: Duration::from_secs(3),
        })
    }

    /// 通用 GET，处理限流和网络抖动
    async fn get_json(&self, url: &str) -> AppResult<Value> {
        let mut attempt = 0;
        loop {
            debug!("GET {} (第 {} 次)", url, attempt + 1);
            let resp = match self.http.get(url).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    if attempt < self.max_retries {
                        warn!("网络请求失败，{:?} 后重试: {}", self.connect_retry_delay, e);
                        attempt += 1;
                        sleep(self.connect_retry_delay).await;
                        continue;
                    }
                    return Err(ApiError::RequestFailed {
                        endpoint: url.to_string(),
                        message: e.to_string(),
                    }
                    .into());
                }
            };

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                let header = resp.headers().get(RETRY_AFTER).and_then(|v| v.to_str().ok());
                let wait = retry_after_secs(header);
                if attempt < self.max_retries {
                    warn!("⏳ 触发速率限制，等待 {} 秒后重试", wait);
                    attempt += 1;
                    sleep(Duration::from_secs(wait)).await;
                    continue;
                }
                return Err(ApiError::RateLimited {
                    endpoint: url.to_string(),
                    retry_after: wait,
                }
                .into());
            }
            if status == StatusCode::NOT_FOUND {
                return Err(ApiError::NotFound {
                    endpoint: url.to_string(),
                }
                .into());
            }
            if status == StatusCode::FORBIDDEN {
                return Err(ApiError::Forbidden {
                    endpoint: url.to_string(),
                }
                .into());
            }
            if !status.is_success() {
                return Err(ApiError::BadStatus {
                    endpoint: url.to_string(),
                    status: status.as_u16(),
                }
                .into());
            }

            return resp.json::<Value>().await.map_err(|e| {
                AppError::Api(ApiError::UnexpectedShape {
                    endpoint: url.to_string(),
                    message: e.to_string(),
                })
            });
        }
    }

    /// 获取社区基本信息
    pub async fn fetch_community_info(&self, community: &str) -> AppResult<CommunityInfo> {
        let name = bare_community(community);
        let url = format!("{}/r/{}/about.json", self.base_url, name);
        let data = self.get_json(&url).await?;
        parse_community_info(&data, name).ok_or_else(|| unexpected(&url, "缺少 data 字段"))
    }

    /// 获取社区帖子列表（sort: hot / new / top / rising）
    pub async fn fetch_community_recent_posts(
        &self,
        community: &str,
        sort: &str,
        limit: u32,
    ) -> AppResult<Vec<RecentPost>> {
        let url = format!(
            "{}/r/{}/{}.json?limit={}",
            self.base_url,
            bare_community(community),
            sort,
            limit
        );
        let data = self.get_json(&url).await?;
        parse_recent_posts(&data, &self.base_url).ok_or_else(|| unexpected(&url, "缺少 children"))
    }
}

#[async_trait]
impl CommunityRulesSource for MetricsClient {
    async fn fetch_community_rules(&self, community: &str) -> CommunityRules {
        let name = bare_community(community);
        let mut rules = CommunityRules::default();

        match self
            .get_json(&format!("{}/r/{}/about/rules.json", self.base_url, name))
            .await
        {
            Ok(data) => rules.rules = parse_rules(&data),
            Err(e) => debug!("获取 r/{} 规则失败: {}", name, e),
        }

        match self
            .get_json(&format!("{}/api/v1/{}/post_requirements", self.base_url, name))
            .await
        {
            Ok(data) => rules.requirements = parse_requirements(&data),
            Err(e) => debug!("获取 r/{} 发帖要求失败: {}", name, e),
        }

        match self
            .get_json(&format!("{}/r/{}/api/link_flair_v2.json", self.base_url, name))
            .await
        {
            Ok(data) => rules.flair_options = parse_flair_options(&data),
            Err(e) => debug!("获取 r/{} flair 失败: {}", name, e),
        }

        rules
    }
}

#[async_trait]
impl PostMetricsSource for MetricsClient {
    async fn fetch_post_metrics(&self, post_url: &str) -> AppResult<PostMetrics> {
        let url = post_json_url(post_url);
        let data = self.get_json(&url).await?;
        parse_post_metrics(&data, &self.base_url).ok_or_else(|| unexpected(&url, "缺少帖子数据"))
    }
}

fn unexpected(endpoint: &str, message: &str) -> AppError {
    AppError::Api(ApiError::UnexpectedShape {
        endpoint: endpoint.to_string(),
        message: message.to_string(),
    })
}

// ========== 纯解析函数 ==========

/// 帖子 URL → 对应的 `.json` 地址
pub fn post_json_url(post_url: &str) -> String {
    let clean = post_url
        .split('?')
        .next()
        .unwrap_or(post_url)
        .trim_end_matches('/');
    if clean.ends_with(".json") {
        clean.to_string()
    } else {
        format!("{}.json", clean)
    }
}

/// 解析 Retry-After（秒），缺失或无法解析时取默认值，并限制上限
pub fn retry_after_secs(header: Option<&str>) -> u64 {
    header
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
        .min(MAX_RETRY_AFTER_SECS)
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn permalink_url(base_url: &str, v: &Value) -> String {
    format!("{}{}", base_url, str_field(v, "permalink"))
}

/// 解析 `/comments/<id>.json` 的返回（一个 listing 数组，第一个是帖子本身）
pub fn parse_post_metrics(data: &Value, base_url: &str) -> Option<PostMetrics> {
    let p = data.get(0)?.get("data")?.get("children")?.get(0)?.get("data")?;
    Some(PostMetrics {
        score: p.get("score").and_then(Value::as_i64).unwrap_or(0),
        upvote_ratio: p.get("upvote_ratio").and_then(Value::as_f64).unwrap_or(0.0),
        num_comments: p.get("num_comments").and_then(Value::as_u64).unwrap_or(0),
        title: str_field(p, "title"),
        community: str_field(p, "subreddit_name_prefixed"),
        author: str_field(p, "author"),
        created_utc: p.get("created_utc").and_then(Value::as_f64).unwrap_or(0.0),
        url: permalink_url(base_url, p),
        is_removed: p.get("removed_by_category").is_some_and(|v| !v.is_null()),
    })
}

pub fn parse_community_info(data: &Value, fallback_name: &str) -> Option<CommunityInfo> {
    let d = data.get("data")?;
    let submission_type = d
        .get("submission_type")
        .and_then(Value::as_str)
        .unwrap_or("any");
    let display_name = d
        .get("display_name")
        .and_then(Value::as_str)
        .unwrap_or(fallback_name);

    Some(CommunityInfo {
        name: format!("r/{}", display_name),
        subscribers: d.get("subscribers").and_then(Value::as_u64).unwrap_or(0),
        active_users: d.get("active_user_count").and_then(Value::as_u64).unwrap_or(0),
        description: str_field(d, "public_description").chars().take(300).collect(),
        over18: d.get("over18").and_then(Value::as_bool).unwrap_or(false),
        allow_text: matches!(submission_type, "any" | "self"),
        allow_link: matches!(submission_type, "any" | "link"),
    })
}

pub fn parse_recent_posts(data: &Value, base_url: &str) -> Option<Vec<RecentPost>> {
    let children = data.get("data")?.get("children")?.as_array()?;
    Some(
        children
            .iter()
            .filter_map(|child| child.get("data"))
            .map(|p| RecentPost {
                title: str_field(p, "title"),
                score: p.get("score").and_then(Value::as_i64).unwrap_or(0),
                num_comments: p.get("num_comments").and_then(Value::as_u64).unwrap_or(0),
                upvote_ratio: p.get("upvote_ratio").and_then(Value::as_f64).unwrap_or(0.0),
                is_self: p.get("is_self").and_then(Value::as_bool).unwrap_or(true),
                flair: str_field(p, "link_flair_text"),
                url: permalink_url(base_url, p),
                created_utc: p.get("created_utc").and_then(Value::as_f64).unwrap_or(0.0),
            })
            .collect(),
    )
}

pub fn parse_rules(data: &Value) -> Vec<CommunityRule> {
    data.get("rules")
        .and_then(Value::as_array)
        .map(|rules| {
            rules
                .iter()
                .map(|r| CommunityRule {
                    name: str_field(r, "short_name"),
                    description: str_field(r, "description"),
                })
                .filter(|r| !r.name.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

pub fn parse_requirements(data: &Value) -> PostRequirements {
    let strings = |key: &str| -> Vec<String> {
        data.get(key)
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    };
    PostRequirements {
        title_min_length: data.get("title_text_min_length").and_then(Value::as_u64),
        body_min_length: data.get("body_text_min_length").and_then(Value::as_u64),
        title_required_strings: strings("title_required_strings"),
        body_required_strings: strings("body_required_strings"),
        is_flair_required: data
            .get("is_flair_required")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    }
}

/// flair 接口返回数组 `[{id, text, ...}]`
pub fn parse_flair_options(data: &Value) -> Vec<FlairOption> {
    data.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|f| {
                    let id = f.get("id").and_then(Value::as_str)?;
                    let text = f.get("text").and_then(Value::as_str)?;
                    Some(FlairOption {
                        id: id.to_string(),
                        text: text.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn post_json_url_strips_query_and_slash() {
        assert_eq!(
            post_json_url("https://www.reddit.com/r/rust/comments/abc/t/?utm=1"),
            "https://www.reddit.com/r/rust/comments/abc/t.json"
        );
        assert_eq!(post_json_url("https://x/y.json"), "https://x/y.json");
    }

    #[test]
    fn retry_after_defaults_and_caps() {
        assert_eq!(retry_after_secs(None), 60);
        assert_eq!(retry_after_secs(Some("7")), 7);
        assert_eq!(retry_after_secs(Some("soon")), 60);
        assert_eq!(retry_after_secs(Some("86400")), 300);
    }

    #[test]
    fn removed_post_is_flagged() {
        let data = json!([{
            "data": {"children": [{"data": {
                "score": 5, "upvote_ratio": 0.8, "num_comments": 2,
                "title": "hello", "subreddit_name_prefixed": "r/rust",
                "permalink": "/r/rust/comments/abc/hello/",
                "removed_by_category": "automod_filtered"
            }}]}
        }]);
        let m = parse_post_metrics(&data, "https://www.reddit.com").unwrap();
        assert!(m.is_removed);
        assert_eq!(m.score, 5);
        assert_eq!(m.url, "https://www.reddit.com/r/rust/comments/abc/hello/");

        let live = json!([{"data": {"children": [{"data": {"removed_by_category": null}}]}}]);
        assert!(!parse_post_metrics(&live, "").unwrap().is_removed);
        assert!(parse_post_metrics(&json!({}), "").is_none());
    }

    #[test]
    fn community_info_submission_type() {
        let data = json!({"data": {"display_name": "rust", "subscribers": 300000, "submission_type": "self"}});
        let info = parse_community_info(&data, "rust").unwrap();
        assert_eq!(info.name, "r/rust");
        assert!(info.allow_text);
        assert!(!info.allow_link);
    }

    #[test]
    fn rules_requirements_and_flairs() {
        let rules = parse_rules(&json!({"rules": [
            {"short_name": "No spam", "description": "Self-promo on Saturdays"},
            {"short_name": "", "description": "ignored"}
        ]}));
        assert_eq!(rules.len(), 1);

        let reqs = parse_requirements(&json!({
            "is_flair_required": true,
            "title_text_min_length": 20,
            "title_required_strings": ["[Showoff]"]
        }));
        assert!(reqs.is_flair_required);
        assert_eq!(reqs.title_min_length, Some(20));
        assert_eq!(reqs.title_required_strings, vec!["[Showoff]".to_string()]);

        let flairs = parse_flair_options(&json!([
            {"id": "f1", "text": "Discussion"},
            {"id": "f2"}
        ]));
        assert_eq!(flairs, vec![FlairOption { id: "f1".into(), text: "Discussion".into() }]);
    }

    // ========== 本地 HTTP 桩 ==========

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn response(status: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
            status,
            body.len(),
            extra_headers,
            body
        )
    }

    fn rate_limited(retry_after: u64) -> String {
        response(
            "429 Too Many Requests",
            &format!("Retry-After: {}\r\n", retry_after),
            "{}",
        )
    }

    /// 按顺序对每个连接回放一条响应，返回 base_url 和已处理的请求数
    async fn serve(responses: Vec<String>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            for reply in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                counter.fetch_add(1, Ordering::SeqCst);
                socket.write_all(reply.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}", addr), hits)
    }

    const POST_BODY: &str = r#"[{"data":{"children":[{"data":{"score":12,"upvote_ratio":0.93,"num_comments":4,"title":"hello","permalink":"/r/rust/comments/abc/hello/"}}]}}]"#;

    // 用真实时钟：暂停时钟会在等待回环 IO 时自动推进，抢先触发请求超时
    #[tokio::test]
    async fn rate_limit_waits_for_retry_after_then_succeeds() {
        let (base, hits) = serve(vec![
            rate_limited(1),
            rate_limited(1),
            response("200 OK", "", POST_BODY),
        ])
        .await;
        let client = MetricsClient::new(&base).unwrap();

        let started = std::time::Instant::now();
        let metrics = client
            .fetch_post_metrics(&format!("{}/r/rust/comments/abc/hello/", base))
            .await
            .unwrap();

        assert_eq!(metrics.score, 12);
        assert_eq!(metrics.num_comments, 4);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn rate_limit_exhausting_retries_is_reported() {
        let (base, hits) = serve(vec![rate_limited(0), rate_limited(0), rate_limited(7)]).await;
        let client = MetricsClient::new(&base).unwrap();

        let err = client
            .fetch_post_metrics(&format!("{}/r/rust/comments/abc/hello/", base))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::Api(ApiError::RateLimited { retry_after: 7, .. })
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn missing_post_is_not_found_without_retry() {
        let (base, hits) = serve(vec![response("404 Not Found", "", "{}")]).await;
        let client = MetricsClient::new(&base).unwrap();

        let err = client
            .fetch_post_metrics(&format!("{}/r/rust/comments/gone/x/", base))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Api(ApiError::NotFound { .. })));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_host_retries_then_fails() {
        // 绑定后立即释放，端口上没有监听者
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let mut client = MetricsClient::new(format!("http://{}", addr)).unwrap();
        client.connect_retry_delay = Duration::from_millis(10);

        let err = client
            .fetch_community_info("r/rust")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Api(ApiError::RequestFailed { .. })));
    }

    #[tokio::test]
    #[ignore]
    async fn fetch_live_community_info() {
        let client = MetricsClient::new("https://www.reddit.com").unwrap();
        let info = client.fetch_community_info("r/rust").await.unwrap();
        assert!(info.subscribers > 0);
    }
}
