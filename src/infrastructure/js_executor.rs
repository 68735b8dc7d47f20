//! JS 执行器 - 基础设施层
//!
//! 持有唯一的浏览器会话资源，只暴露"执行 JS / 取回页面内异步结果"的能力。
//!
//! 页面内的 `fetch` 是异步的，而控制通道只负责把脚本发出去，所以结果通过侧信道取回：
//! 脚本把结果序列化后写到 `window.__autopostResults[slot]`，执行器按固定间隔轮询该属性，
//! 超过等待上限即视为失败。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{Browser, Page};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{AppError, AppResult, BrowserError};

/// 侧信道所用的页面属性名
const RESULT_PROPERTY: &str = "__autopostResults";

/// 浏览器控制通道
///
/// 发帖适配器只依赖这个能力，测试里可以换成假的实现。
#[async_trait]
pub trait ScriptChannel: Send + Sync {
    /// 当前打开的窗口（标签页）数量
    async fn window_count(&self) -> AppResult<usize>;

    /// 活动标签页的 URL
    async fn current_url(&self) -> AppResult<String>;

    /// 活动标签页导航到指定 URL
    async fn navigate(&self, url: &str) -> AppResult<()>;

    /// 在页面上下文里执行一段异步函数体，等待侧信道结果（JSON 字符串）
    ///
    /// 超过 `timeout` 返回 [`BrowserError::ResultTimeout`]；页面内抛出异常返回
    /// [`BrowserError::ScriptRejected`]。
    async fn invoke_and_await(&self, body: &str, timeout: Duration) -> AppResult<String>;

    /// 新开一个标签页（人工兜底视图）
    async fn open_tab(&self, url: &str) -> AppResult<()>;
}

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Browser / Page 资源
/// - 暴露 eval() 和侧信道调用能力
/// - 不认识帖子 / 社区
pub struct JsExecutor {
    browser: Browser,
    page: Page,
    poll_interval: Duration,
    next_slot: AtomicU64,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(browser: Browser, page: Page) -> Self {
        Self {
            browser,
            page,
            poll_interval: Duration::from_millis(250),
            next_slot: AtomicU64::new(1),
        }
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> AppResult<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value().map_err(|e| {
            AppError::Browser(BrowserError::ScriptExecutionFailed {
                source: Box::new(e),
            })
        })?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> AppResult<T> {
        let json_value = self.eval(js_code).await?;
        serde_json::from_value(json_value).map_err(|e| {
            AppError::Browser(BrowserError::ScriptExecutionFailed {
                source: Box::new(e),
            })
        })
    }

    fn allocate_slot(&self) -> String {
        format!("r{}", self.next_slot.fetch_add(1, Ordering::Relaxed))
    }
}

#[async_trait]
impl ScriptChannel for JsExecutor {
    async fn window_count(&self) -> AppResult<usize> {
        let pages = self.browser.pages().await?;
        Ok(pages.len())
    }

    async fn current_url(&self) -> AppResult<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn navigate(&self, url: &str) -> AppResult<()> {
        self.page.goto(url).await.map_err(|e| {
            AppError::Browser(BrowserError::NavigationFailed {
                url: url.to_string(),
                source: Box::new(e),
            })
        })?;
        Ok(())
    }

    async fn invoke_and_await(&self, body: &str, timeout: Duration) -> AppResult<String> {
        let slot = self.allocate_slot();
        debug!("侧信道调用 slot={} 等待上限 {:?}", slot, timeout);

        // 只负责发出去，不等待 promise
        self.eval(build_invoke_script(&slot, body)).await?;

        let poll = build_poll_script(&slot);
        let deadline = Instant::now() + timeout;
        loop {
            let raw: Option<String> = self.eval_as(poll.as_str()).await?;
            if let Some(raw) = raw {
                return unwrap_envelope(&raw);
            }
            if Instant::now() >= deadline {
                return Err(AppError::Browser(BrowserError::ResultTimeout {
                    waited_ms: timeout.as_millis() as u64,
                }));
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn open_tab(&self, url: &str) -> AppResult<()> {
        self.browser.new_page(url).await.map_err(|e| {
            AppError::Browser(BrowserError::NavigationFailed {
                url: url.to_string(),
                source: Box::new(e),
            })
        })?;
        Ok(())
    }
}

// ========== 侧信道脚本 ==========

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    value: Option<JsonValue>,
    #[serde(default)]
    error: Option<String>,
}

/// 构建"发出即返回"的调用脚本；结果写入 `window.__autopostResults[slot]`
pub fn build_invoke_script(slot: &str, body: &str) -> String {
    let slot = JsonValue::String(slot.to_string());
    format!(
        r#"
        (() => {{
            const box = (window.{prop} = window.{prop} || {{}});
            const slot = {slot};
            delete box[slot];
            (async () => {{
                {body}
            }})()
                .then((value) => {{ box[slot] = JSON.stringify({{ ok: true, value: value === undefined ? null : value }}); }})
                .catch((e) => {{ box[slot] = JSON.stringify({{ ok: false, error: String((e && e.message) || e) }}); }});
            return true;
        }})()
        "#,
        prop = RESULT_PROPERTY,
        slot = slot,
        body = body,
    )
}

/// 构建轮询脚本：取到结果后删除该槽位，未就绪时返回 null
pub fn build_poll_script(slot: &str) -> String {
    let slot = JsonValue::String(slot.to_string());
    format!(
        r#"
        (() => {{
            const box = window.{prop};
            if (!box || !({slot} in box)) return null;
            const value = box[{slot}];
            delete box[{slot}];
            return value;
        }})()
        "#,
        prop = RESULT_PROPERTY,
        slot = slot,
    )
}

/// 解析侧信道信封，成功时返回 value 的 JSON 文本
pub fn unwrap_envelope(raw: &str) -> AppResult<String> {
    let envelope: Envelope = serde_json::from_str(raw).map_err(|e| {
        AppError::Browser(BrowserError::ScriptExecutionFailed {
            source: Box::new(e),
        })
    })?;

    if envelope.ok {
        Ok(envelope.value.unwrap_or(JsonValue::Null).to_string())
    } else {
        Err(AppError::Browser(BrowserError::ScriptRejected {
            message: envelope.error.unwrap_or_else(|| "unknown".to_string()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoke_script_embeds_quoted_slot_and_body() {
        let script = build_invoke_script("r7", "return 1 + 1;");
        assert!(script.contains(r#"const slot = "r7";"#));
        assert!(script.contains("return 1 + 1;"));
        assert!(script.contains("window.__autopostResults"));
    }

    #[test]
    fn envelope_success_returns_value_json() {
        let raw = r#"{"ok":true,"value":{"data":{"modhash":"abc"}}}"#;
        let value: JsonValue = serde_json::from_str(&unwrap_envelope(raw).unwrap()).unwrap();
        assert_eq!(value["data"]["modhash"], "abc");
    }

    #[test]
    fn envelope_failure_is_script_rejected() {
        let err = unwrap_envelope(r#"{"ok":false,"error":"Failed to fetch"}"#).unwrap_err();
        assert!(matches!(
            err,
            AppError::Browser(BrowserError::ScriptRejected { ref message }) if message == "Failed to fetch"
        ));
    }
}
