//! 发帖上下文
//!
//! 封装"我正在处理今天第几个目标、发到哪个社区、用哪个角度"这一信息

use std::fmt::Display;

use chrono::NaiveDate;

use crate::models::post_record::Angle;

/// 单个目标的处理上下文
#[derive(Debug, Clone)]
pub struct PostCtx {
    /// 目标序号（从 1 开始）
    pub slot: usize,

    /// 本次运行的目标总数（仅用于日志显示）
    pub total: usize,

    /// 社区标识（`r/<name>`）
    pub community: String,

    pub angle: Angle,

    /// 运行日期（UTC），用于草稿文件名
    pub date: NaiveDate,

    pub dry_run: bool,
}

impl PostCtx {
    pub fn new(
        slot: usize,
        total: usize,
        community: impl Into<String>,
        angle: Angle,
        date: NaiveDate,
        dry_run: bool,
    ) -> Self {
        Self {
            slot,
            total,
            community: community.into(),
            angle,
            date,
            dry_run,
        }
    }
}

impl Display for PostCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[目标 {}/{}]", self.slot, self.total)
    }
}
