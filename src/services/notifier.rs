//! 桌面通知 - 业务能力层
//!
//! 通知失败只记 debug 日志，不影响运行结果。

use notify_rust::Notification;
use tracing::debug;

const APP_TITLE: &str = "Reddit Auto Post";

/// 运行结果通知
pub trait Notifier: Send + Sync {
    fn notify_success(&self, count: usize, communities: &[String]);
    fn notify_partial(&self, succeeded: usize, failed: usize, communities: &[String]);
    fn notify_failure(&self, message: &str);
}

/// 系统桌面通知
pub struct DesktopNotifier;

impl DesktopNotifier {
    fn send(&self, subtitle: &str, body: &str) {
        let result = Notification::new()
            .summary(&format!("{} - {}", APP_TITLE, subtitle))
            .body(body)
            .show()
            .map(|_| ());
        if let Err(e) = result {
            debug!("发送桌面通知失败: {}", e);
        }
    }
}

impl Notifier for DesktopNotifier {
    fn notify_success(&self, count: usize, communities: &[String]) {
        self.send("发帖成功", &success_message(count, communities));
    }

    fn notify_partial(&self, succeeded: usize, failed: usize, communities: &[String]) {
        self.send("部分成功", &partial_message(succeeded, failed, communities));
    }

    fn notify_failure(&self, message: &str) {
        self.send("发帖失败", message);
    }
}

/// 关闭通知时使用
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify_success(&self, _count: usize, _communities: &[String]) {}
    fn notify_partial(&self, _succeeded: usize, _failed: usize, _communities: &[String]) {}
    fn notify_failure(&self, _message: &str) {}
}

fn success_message(count: usize, communities: &[String]) -> String {
    format!("已发布 {} 篇帖子: {}", count, communities.join(", "))
}

fn partial_message(succeeded: usize, failed: usize, communities: &[String]) -> String {
    let mut msg = format!("成功 {} 篇，失败 {} 篇", succeeded, failed);
    if !communities.is_empty() {
        msg.push_str(&format!("（{}）", communities.join(", ")));
    }
    msg
}
