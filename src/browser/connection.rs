use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::error::{AppError, AppResult, BrowserError};
use crate::infrastructure::JsExecutor;

/// 连接到已登录的浏览器，挑选一个可用标签页
///
/// 优先使用已经停在目标站点上的标签页，其次使用第一个标签页；
/// 浏览器里没有任何窗口时返回 [`BrowserError::NoWindows`]。
pub async fn connect_to_browser_and_page(port: u16, site_url: &str) -> AppResult<(Browser, Page)> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        AppError::browser_connection_failed(port, e)
    })?;
    debug!("浏览器连接成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    let pages = browser.pages().await?;
    debug!("获取到 {} 个页面", pages.len());
    if pages.is_empty() {
        return Err(BrowserError::NoWindows.into());
    }

    let origin = site_origin(site_url);
    for p in pages.iter() {
        if let Ok(Some(url)) = p.url().await {
            if url.starts_with(&origin) {
                info!("✓ 找到目标站点页面: {}", url);
                return Ok((browser, p.clone()));
            }
        }
    }

    debug!("没有停在 {} 的页面，使用第一个标签页", origin);
    let first = pages[0].clone();
    Ok((browser, first))
}

/// 连接浏览器并包装成执行器
pub async fn connect_session(port: u16, site_url: &str) -> AppResult<JsExecutor> {
    let (browser, page) = connect_to_browser_and_page(port, site_url).await?;
    Ok(JsExecutor::new(browser, page))
}

/// 取 URL 的 origin（scheme + host + port）
pub fn site_origin(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.origin().ascii_serialization(),
        Err(_) => url.trim_end_matches('/').to_string(),
    }
}
