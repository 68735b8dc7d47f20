//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责一次运行的调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `run_lock` - 运行锁
//! - 同一时间只允许一次运行
//! - 残留锁（持有进程已退出）自动回收
//! - 通过 Guard 保证任何退出路径都会释放
//!
//! ### `daily_runner` - 每日运行器
//! - 加载配置、连接浏览器、构建各项能力
//! - 选择今天的目标
//! - 逐个目标调用 PostFlow，目标之间按配置等待
//! - 写日报、发通知
//!
//! ## 层次关系
//!
//! ```text
//! daily_runner (处理 Vec<ScheduledTarget>)
//!     ↓
//! workflow::PostFlow (处理单个目标)
//!     ↓
//! services (能力层：generate / draft / submit / history / report)
//!     ↓
//! infrastructure (基础设施：JsExecutor)
//! ```

pub mod daily_runner;
pub mod run_lock;

// 重新导出主要类型
pub use daily_runner::{DailyRunner, RunOptions, RunResult, RunStatus};
pub use run_lock::{RunLock, RunLockGuard};
