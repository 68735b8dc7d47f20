//! # Reddit Auto Post
//!
//! 每天自动选几个社区、用 LLM 生成帖子、通过已登录的浏览器会话发出去
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `browser/` - 连接以调试端口启动的浏览器
//! - `infrastructure/` - 持有稀缺资源（Browser / Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 eval() 和侧信道取结果的能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个能力只处理一个对象
//! - `target_scheduler` - 选今天的 (社区, 角度)
//! - `content_generator` / `quality` - 生成内容并做质量检查
//! - `submission` / `flair` - 在页面上下文里发帖、设置 flair
//! - `metrics_client` - 读取公开的帖子 / 社区数据
//! - `history_store` / `history_repair` / `performance_sync` / `manual_log` - 发帖历史
//! - `draft_writer` / `report_writer` / `notifier` - 草稿、日报、通知
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个目标"的完整处理流程
//! - `PostCtx` - 上下文封装（第几个目标、社区、角度）
//! - `PostFlow` - 流程编排（generate → draft → submit → verify → record）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/run_lock` - 单实例运行锁
//! - `orchestrator/daily_runner` - 每日运行状态机
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::connect_session;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{JsExecutor, ScriptChannel};
pub use models::{Angle, CommunityProfile, PostRecord};
pub use orchestrator::{DailyRunner, RunOptions, RunStatus};
pub use workflow::{PostCtx, PostFlow};
