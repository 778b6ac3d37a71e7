use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 会话状态
///
/// 单向推进：Pending -> Active -> Ended，任何回退都是 bug
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// 匹配已提交、双方尚未全部确认在场
    Pending,
    /// 双方均已确认，可收发消息
    Active,
    /// 终态
    Ended,
}

impl SessionState {
    /// 状态只能前进不能后退
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Pending, SessionState::Active)
                | (SessionState::Pending, SessionState::Ended)
                | (SessionState::Active, SessionState::Ended)
        )
    }
}

/// 会话结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// 一方主动离开
    UserLeft,
    /// 参与者被封禁（举报升级）
    ReportedBan,
    /// 确认窗口超时（有一方始终没连上）
    Timeout,
    /// 正常关闭
    NormalClose,
}

impl EndReason {
    /// 稳定的文本标识（事件 payload 与指标标签用）
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::UserLeft => "user_left",
            EndReason::ReportedBan => "reported_ban",
            EndReason::Timeout => "timeout",
            EndReason::NormalClose => "normal_close",
        }
    }
}

/// 1:1 聊天会话
///
/// 参与者在创建后不可变；state 单调推进；归 SessionCoordinator 独占管理
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    /// 会话 ID
    pub id: Uuid,
    /// 参与者 A（匹配中较早入队的一方）
    pub participant_a: u64,
    /// 参与者 B
    pub participant_b: u64,
    /// 当前状态
    pub state: SessionState,
    /// 创建时间（同时是确认窗口的起点）
    pub created_at: DateTime<Utc>,
    /// 结束时间
    pub ended_at: Option<DateTime<Utc>>,
    /// 结束原因
    pub end_reason: Option<EndReason>,
    /// A 是否已确认在场
    pub acked_a: bool,
    /// B 是否已确认在场
    pub acked_b: bool,
}

impl ChatSession {
    pub fn new(participant_a: u64, participant_b: u64, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            participant_a,
            participant_b,
            state: SessionState::Pending,
            created_at,
            ended_at: None,
            end_reason: None,
            acked_a: false,
            acked_b: false,
        }
    }

    /// 是否为会话参与者
    pub fn is_participant(&self, identity_id: u64) -> bool {
        self.participant_a == identity_id || self.participant_b == identity_id
    }

    /// 对端参与者
    pub fn peer_of(&self, identity_id: u64) -> Option<u64> {
        if self.participant_a == identity_id {
            Some(self.participant_b)
        } else if self.participant_b == identity_id {
            Some(self.participant_a)
        } else {
            None
        }
    }

    /// 记录一方的在场确认（幂等），返回是否双方均已确认
    pub fn record_ack(&mut self, identity_id: u64) -> bool {
        if self.participant_a == identity_id {
            self.acked_a = true;
        } else if self.participant_b == identity_id {
            self.acked_b = true;
        }
        self.acked_a && self.acked_b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_monotonic() {
        assert!(SessionState::Pending.can_transition_to(SessionState::Active));
        assert!(SessionState::Pending.can_transition_to(SessionState::Ended));
        assert!(SessionState::Active.can_transition_to(SessionState::Ended));

        // 不允许回退
        assert!(!SessionState::Active.can_transition_to(SessionState::Pending));
        assert!(!SessionState::Ended.can_transition_to(SessionState::Active));
        assert!(!SessionState::Ended.can_transition_to(SessionState::Pending));
    }

    #[test]
    fn test_record_ack_both_sides() {
        let mut session = ChatSession::new(1, 2, Utc::now());

        assert!(!session.record_ack(1));
        // 同一方重复确认是幂等的
        assert!(!session.record_ack(1));
        assert!(session.record_ack(2));
    }

    #[test]
    fn test_peer_of() {
        let session = ChatSession::new(1, 2, Utc::now());
        assert_eq!(session.peer_of(1), Some(2));
        assert_eq!(session.peer_of(2), Some(1));
        assert_eq!(session.peer_of(3), None);
    }
}
