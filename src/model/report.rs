use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 举报类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportCategory {
    Harassment,
    Spam,
    Inappropriate,
    Other,
}

/// 用户举报（追加写，消费方是外部 moderation-action 系统）
///
/// 外部系统可能据此翻转 Identity.banned；核心只负责在观察到
/// 封禁后强制结束相关会话
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// 所属会话
    pub session_id: Uuid,
    /// 举报人
    pub reporter_id: u64,
    /// 被举报人
    pub reported_id: u64,
    /// 类别
    pub category: ReportCategory,
    /// 描述
    pub reason: String,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}
