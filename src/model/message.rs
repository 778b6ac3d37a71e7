use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 审核判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationVerdict {
    Allow,
    Block,
}

/// 拦截原因
///
/// 规则管线按固定顺序求值，首个命中即返回，保证同一输入永远得到
/// 同一原因（审计与测试依赖这一点）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    LinksNotAllowed,
    PhoneNumber,
    EmailAddress,
    Profanity,
    Harassment,
}

impl BlockReason {
    /// 稳定的文本标识（事件 payload 与指标标签用）
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::LinksNotAllowed => "links_not_allowed",
            BlockReason::PhoneNumber => "phone_number",
            BlockReason::EmailAddress => "email_address",
            BlockReason::Profanity => "profanity",
            BlockReason::Harassment => "harassment",
        }
    }
}

/// 审核结果（判定 + 可选原因）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationOutcome {
    pub verdict: ModerationVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<BlockReason>,
}

impl ModerationOutcome {
    pub fn allow() -> Self {
        Self {
            verdict: ModerationVerdict::Allow,
            reason: None,
        }
    }

    pub fn block(reason: BlockReason) -> Self {
        Self {
            verdict: ModerationVerdict::Block,
            reason: Some(reason),
        }
    }

    pub fn is_allow(&self) -> bool {
        self.verdict == ModerationVerdict::Allow
    }
}

/// 会话消息
///
/// 持久化后不可变。被拦截的消息不会出现在这里，它从未成为可投递消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// 消息 ID（snowflake，时间有序）
    pub id: u64,
    /// 所属会话
    pub session_id: Uuid,
    /// 发送者
    pub sender_id: u64,
    /// 正文
    pub content: String,
    /// 审核结果（可投递消息恒为 allow）
    pub moderation: ModerationOutcome,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

/// PostMessage 的两种结果
///
/// Rejected 是正常业务结果而非错误：消息管线把内容拦截当作
/// 一等公民返回给调用方
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PostOutcome {
    Accepted { message_id: u64 },
    Rejected { reason: BlockReason },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_constructors() {
        assert!(ModerationOutcome::allow().is_allow());

        let blocked = ModerationOutcome::block(BlockReason::Profanity);
        assert!(!blocked.is_allow());
        assert_eq!(blocked.reason, Some(BlockReason::Profanity));
    }

    #[test]
    fn test_block_reason_serde_names() {
        let json = serde_json::to_string(&BlockReason::LinksNotAllowed).unwrap();
        assert_eq!(json, "\"links_not_allowed\"");
    }
}
