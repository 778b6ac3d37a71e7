use std::sync::Arc;
use chrono::Duration;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::error::{Result, ServerError};
use crate::fanout::{EventType, FanoutEvent, FanoutHub, Topic};
use crate::infra::snowflake::next_message_id;
use crate::model::{
    ChatSession, EndReason, Message, PostOutcome, Report, SessionState,
};
use crate::moderation::ModerationService;
use super::reports::ReportSink;
use super::violations::ViolationTracker;

/// 会话协调器
///
/// 独占持有全部 ChatSession 与消息日志，负责状态机推进
/// （pending -> active -> ended）、消息管线（审核门 -> 持久化 -> 发布）、
/// 举报与终止请求。消息的持久化与发布在会话条目锁内按接受顺序完成，
/// 同一会话的事件顺序即接受顺序。
pub struct SessionCoordinator {
    /// 会话表：session_id -> ChatSession
    sessions: DashMap<Uuid, ChatSession>,
    /// 每会话消息日志（只追加）
    messages: DashMap<Uuid, Vec<Message>>,
    /// 举报日志（只追加）
    reports: Mutex<Vec<Report>>,
    /// 违规计数器
    violations: ViolationTracker,
    moderation: ModerationService,
    report_sink: Arc<dyn ReportSink>,
    fanout: Arc<FanoutHub>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

impl SessionCoordinator {
    pub fn new(
        config: SessionConfig,
        moderation: ModerationService,
        report_sink: Arc<dyn ReportSink>,
        fanout: Arc<FanoutHub>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            messages: DashMap::new(),
            reports: Mutex::new(Vec::new()),
            violations: ViolationTracker::new(config.violation_ttl_secs),
            moderation,
            report_sink,
            fanout,
            clock,
            config,
        }
    }

    /// 创建会话（匹配提交时由匹配器调用）
    ///
    /// 新会话处于 pending；session_created 发往双方的 queue 主题，
    /// 双方此刻还没订阅 session 主题
    pub async fn create_session(&self, participant_a: u64, participant_b: u64) -> ChatSession {
        let now = self.clock.now();
        let session = ChatSession::new(participant_a, participant_b, now);

        self.sessions.insert(session.id, session.clone());
        self.messages.insert(session.id, Vec::new());

        info!(
            "✅ 会话创建: session={}, a={}, b={}",
            session.id, participant_a, participant_b
        );

        for (me, peer) in [(participant_a, participant_b), (participant_b, participant_a)] {
            self.fanout.publish(
                &Topic::Queue(me),
                FanoutEvent::new(
                    EventType::SessionCreated,
                    json!({ "session_id": session.id, "peer_id": peer }),
                    now,
                ),
            );
        }

        session
    }

    /// 在场确认（幂等）
    ///
    /// 双方都确认后转入 active；对已结束的会话是 no-op
    pub async fn acknowledge(&self, session_id: Uuid, identity_id: u64) -> Result<()> {
        let now = self.clock.now();
        let mut entry = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| ServerError::SessionNotFound(session_id.to_string()))?;

        if !entry.is_participant(identity_id) {
            return Err(ServerError::NotParticipant(identity_id));
        }
        if entry.state == SessionState::Ended {
            return Ok(());
        }

        let already_acked = if entry.participant_a == identity_id {
            entry.acked_a
        } else {
            entry.acked_b
        };

        let both_acked = entry.record_ack(identity_id);

        if !already_acked {
            self.fanout.publish(
                &Topic::Session(session_id),
                FanoutEvent::new(
                    EventType::PresenceJoin,
                    json!({ "identity_id": identity_id }),
                    now,
                ),
            );
        }

        if both_acked && entry.state == SessionState::Pending {
            entry.state = SessionState::Active;
            info!("🟢 会话转入 active: session={}", session_id);
            self.fanout.publish(
                &Topic::Session(session_id),
                FanoutEvent::new(EventType::SessionActivated, json!({}), now),
            );
        }

        Ok(())
    }

    /// 发送消息
    ///
    /// 仅 active 会话接受消息；审核门在前，拦截即返回 Rejected
    /// （正常业务结果），放行则持久化并发布，两步在会话锁内按
    /// 接受顺序完成
    pub async fn post_message(
        &self,
        session_id: Uuid,
        sender_id: u64,
        content: &str,
    ) -> Result<PostOutcome> {
        if content.trim().is_empty() {
            return Err(ServerError::InvalidRequest("消息内容为空".to_string()));
        }
        if content.chars().count() > self.config.max_message_chars {
            return Err(ServerError::InvalidRequest(format!(
                "消息超过 {} 字符上限",
                self.config.max_message_chars
            )));
        }

        // 预检查：会话在场、发送者是参与者、状态为 active
        {
            let entry = self
                .sessions
                .get(&session_id)
                .ok_or_else(|| ServerError::SessionNotFound(session_id.to_string()))?;
            if !entry.is_participant(sender_id) {
                return Err(ServerError::NotParticipant(sender_id));
            }
            if entry.state != SessionState::Active {
                return Err(ServerError::SessionNotActive(session_id.to_string()));
            }
        }

        // 审核门（可能含外部评分调用，不持锁）
        let outcome = self.moderation.classify(content).await;

        if let Some(reason) = outcome.reason {
            // 拦截的消息从不持久化为可投递消息；计一次违规
            let count = self.violations.record(sender_id, self.clock.now());
            crate::infra::metrics::record_message_rejected(reason.as_str());
            info!(
                "🚫 消息被拦截: session={}, sender={}, reason={}, violations={}",
                session_id,
                sender_id,
                reason.as_str(),
                count
            );
            return Ok(PostOutcome::Rejected { reason });
        }

        // 接受：重新取锁校验状态（审核期间会话可能已结束），
        // 然后在锁内持久化并发布
        let now = self.clock.now();
        let entry = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| ServerError::SessionNotFound(session_id.to_string()))?;
        if entry.state != SessionState::Active {
            return Err(ServerError::SessionNotActive(session_id.to_string()));
        }

        let message = Message {
            id: next_message_id(),
            session_id,
            sender_id,
            content: content.to_string(),
            moderation: outcome,
            created_at: now,
        };

        if let Some(mut log) = self.messages.get_mut(&session_id) {
            log.push(message.clone());
        }

        self.fanout.publish(
            &Topic::Session(session_id),
            FanoutEvent::new(
                EventType::Message,
                json!({
                    "message_id": message.id,
                    "sender_id": sender_id,
                    "content": content,
                }),
                now,
            ),
        );

        crate::infra::metrics::record_message_accepted();
        Ok(PostOutcome::Accepted {
            message_id: message.id,
        })
    }

    /// 结束会话（幂等）
    ///
    /// 已结束的会话返回首次记录的 end_reason，不是错误；
    /// by 不为空时必须是参与者
    pub async fn end(
        &self,
        session_id: Uuid,
        by: Option<u64>,
        reason: EndReason,
    ) -> Result<EndReason> {
        let now = self.clock.now();
        let mut entry = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| ServerError::SessionNotFound(session_id.to_string()))?;

        if let Some(by_id) = by {
            if !entry.is_participant(by_id) {
                return Err(ServerError::NotParticipant(by_id));
            }
        }

        if entry.state == SessionState::Ended {
            // 幂等：重复 End 返回既有原因
            return Ok(entry.end_reason.unwrap_or(reason));
        }

        entry.state = SessionState::Ended;
        entry.ended_at = Some(now);
        entry.end_reason = Some(reason);

        info!(
            "🔚 会话结束: session={}, reason={}, by={:?}",
            session_id,
            reason.as_str(),
            by
        );

        self.fanout.publish(
            &Topic::Session(session_id),
            FanoutEvent::new(
                EventType::SessionEnded,
                json!({ "reason": reason.as_str(), "by": by }),
                now,
            ),
        );

        crate::infra::metrics::record_session_ended(reason.as_str());
        Ok(reason)
    }

    /// 观察到封禁：强制结束该身份参与的所有未结束会话
    pub async fn on_ban_observed(&self, identity_id: u64) -> usize {
        let affected: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|e| e.is_participant(identity_id) && e.state != SessionState::Ended)
            .map(|e| e.id)
            .collect();

        let mut ended = 0;
        for session_id in &affected {
            match self.end(*session_id, None, EndReason::ReportedBan).await {
                Ok(_) => ended += 1,
                Err(e) => warn!("封禁强制结束失败: session={}, err={}", session_id, e),
            }
        }

        if ended > 0 {
            warn!("⛔ 封禁生效: identity={}, 强制结束 {} 个会话", identity_id, ended);
        }
        ended
    }

    /// 提交举报（追加写 + fire-and-forget 投递给外部系统）
    pub async fn submit_report(&self, report: Report) -> Result<()> {
        {
            let entry = self
                .sessions
                .get(&report.session_id)
                .ok_or_else(|| ServerError::SessionNotFound(report.session_id.to_string()))?;
            if !entry.is_participant(report.reporter_id) {
                return Err(ServerError::NotParticipant(report.reporter_id));
            }
        }

        self.reports.lock().push(report.clone());
        crate::infra::metrics::record_report_submitted();

        // fire-and-forget：失败只记日志，外部系统有自己的对账渠道
        let sink = Arc::clone(&self.report_sink);
        tokio::spawn(async move {
            if let Err(e) = sink.submit(&report).await {
                warn!("举报投递失败: session={}, err={}", report.session_id, e);
            }
        });

        Ok(())
    }

    /// 超期未确认的 pending 会话以 timeout 结束（调度器 tick 调用）
    pub async fn expire_pending(&self) -> usize {
        let now = self.clock.now();
        let window = Duration::seconds(self.config.ack_window_secs as i64);

        let expired: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|e| {
                e.state == SessionState::Pending
                    && now.signed_duration_since(e.created_at) > window
            })
            .map(|e| e.id)
            .collect();

        let mut ended = 0;
        for session_id in expired {
            if self.end(session_id, None, EndReason::Timeout).await.is_ok() {
                ended += 1;
            }
        }

        if ended > 0 {
            info!("⏰ 确认窗口超时: {} 个 pending 会话结束", ended);
        }
        ended
    }

    /// 清理过期的违规计数（调度器 tick 调用）
    pub fn cleanup_violations(&self) -> usize {
        self.violations.cleanup_expired(self.clock.now())
    }

    /// 会话查询
    pub fn get_session(&self, session_id: Uuid) -> Option<ChatSession> {
        self.sessions.get(&session_id).map(|e| e.value().clone())
    }

    /// 未结束会话的参与者列表（封禁巡检的输入）
    pub fn live_participants(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .sessions
            .iter()
            .filter(|e| e.state != SessionState::Ended)
            .flat_map(|e| [e.participant_a, e.participant_b])
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// 当前 active 会话数
    pub fn active_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|e| e.state == SessionState::Active)
            .count()
    }

    /// 全部会话快照（测试与诊断）
    pub fn all_sessions(&self) -> Vec<ChatSession> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }

    /// 某会话的消息日志（测试与诊断）
    pub fn messages_of(&self, session_id: Uuid) -> Vec<Message> {
        self.messages
            .get(&session_id)
            .map(|log| log.value().clone())
            .unwrap_or_default()
    }

    /// 某身份的累计违规次数
    pub fn violation_count(&self, identity_id: u64) -> u32 {
        self.violations.count_of(identity_id)
    }

    /// 举报日志长度（测试与诊断）
    pub fn report_count(&self) -> usize {
        self.reports.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::moderation::{ModerationGate, ModerationService};
    use crate::session::reports::LogReportSink;

    fn coordinator(clock: &ManualClock) -> SessionCoordinator {
        SessionCoordinator::new(
            SessionConfig::default(),
            ModerationService::rules_only(ModerationGate::default()),
            Arc::new(LogReportSink),
            Arc::new(FanoutHub::default()),
            Arc::new(clock.clone()),
        )
    }

    async fn active_session(coordinator: &SessionCoordinator) -> Uuid {
        let session = coordinator.create_session(1, 2).await;
        coordinator.acknowledge(session.id, 1).await.unwrap();
        coordinator.acknowledge(session.id, 2).await.unwrap();
        session.id
    }

    #[tokio::test]
    async fn test_ack_both_sides_activates() {
        let clock = ManualClock::from_system();
        let coordinator = coordinator(&clock);
        let session = coordinator.create_session(1, 2).await;

        assert_eq!(
            coordinator.get_session(session.id).unwrap().state,
            SessionState::Pending
        );

        coordinator.acknowledge(session.id, 1).await.unwrap();
        // 单方确认还不够
        assert_eq!(
            coordinator.get_session(session.id).unwrap().state,
            SessionState::Pending
        );

        // 重复确认是幂等的
        coordinator.acknowledge(session.id, 1).await.unwrap();
        coordinator.acknowledge(session.id, 2).await.unwrap();
        assert_eq!(
            coordinator.get_session(session.id).unwrap().state,
            SessionState::Active
        );
    }

    #[tokio::test]
    async fn test_post_message_on_pending_is_rejected() {
        let clock = ManualClock::from_system();
        let coordinator = coordinator(&clock);
        let session = coordinator.create_session(1, 2).await;

        // 内容无关紧要：pending 会话一律 SessionNotActive
        let err = coordinator
            .post_message(session.id, 1, "hello there")
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::SessionNotActive(_)));
    }

    #[tokio::test]
    async fn test_post_message_accept_and_reject() {
        let clock = ManualClock::from_system();
        let coordinator = coordinator(&clock);
        let session_id = active_session(&coordinator).await;

        let outcome = coordinator
            .post_message(session_id, 1, "hello there")
            .await
            .unwrap();
        assert!(matches!(outcome, PostOutcome::Accepted { .. }));
        assert_eq!(coordinator.messages_of(session_id).len(), 1);

        // 被拦截的消息不持久化，违规 +1
        let outcome = coordinator
            .post_message(session_id, 1, "visit http://x.com")
            .await
            .unwrap();
        assert!(matches!(outcome, PostOutcome::Rejected { .. }));
        assert_eq!(coordinator.messages_of(session_id).len(), 1);
        assert_eq!(coordinator.violation_count(1), 1);
    }

    #[tokio::test]
    async fn test_post_message_from_non_participant() {
        let clock = ManualClock::from_system();
        let coordinator = coordinator(&clock);
        let session_id = active_session(&coordinator).await;

        let err = coordinator
            .post_message(session_id, 99, "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::NotParticipant(99)));
    }

    #[tokio::test]
    async fn test_end_is_idempotent() {
        let clock = ManualClock::from_system();
        let coordinator = coordinator(&clock);
        let session_id = active_session(&coordinator).await;

        let first = coordinator
            .end(session_id, Some(1), EndReason::UserLeft)
            .await
            .unwrap();
        assert_eq!(first, EndReason::UserLeft);

        // 第二次 End 返回首次记录的原因，而不是新传入的
        let second = coordinator
            .end(session_id, Some(2), EndReason::NormalClose)
            .await
            .unwrap();
        assert_eq!(second, EndReason::UserLeft);
    }

    #[tokio::test]
    async fn test_post_message_after_end() {
        let clock = ManualClock::from_system();
        let coordinator = coordinator(&clock);
        let session_id = active_session(&coordinator).await;

        coordinator
            .end(session_id, Some(1), EndReason::UserLeft)
            .await
            .unwrap();

        let err = coordinator
            .post_message(session_id, 2, "still there?")
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::SessionNotActive(_)));
    }

    #[tokio::test]
    async fn test_on_ban_observed_ends_all_sessions() {
        let clock = ManualClock::from_system();
        let coordinator = coordinator(&clock);

        let s1 = coordinator.create_session(1, 2).await;
        let s2 = coordinator.create_session(1, 3).await;

        let ended = coordinator.on_ban_observed(1).await;
        assert_eq!(ended, 2);

        for sid in [s1.id, s2.id] {
            let session = coordinator.get_session(sid).unwrap();
            assert_eq!(session.state, SessionState::Ended);
            assert_eq!(session.end_reason, Some(EndReason::ReportedBan));
        }
    }

    #[tokio::test]
    async fn test_expire_pending_after_ack_window() {
        let clock = ManualClock::from_system();
        let coordinator = coordinator(&clock);

        let session = coordinator.create_session(1, 2).await;
        // 只有一方确认
        coordinator.acknowledge(session.id, 1).await.unwrap();

        clock.advance_secs(16);
        let ended = coordinator.expire_pending().await;
        assert_eq!(ended, 1);

        let session = coordinator.get_session(session.id).unwrap();
        assert_eq!(session.state, SessionState::Ended);
        assert_eq!(session.end_reason, Some(EndReason::Timeout));
    }

    #[tokio::test]
    async fn test_active_session_survives_expiry_tick() {
        let clock = ManualClock::from_system();
        let coordinator = coordinator(&clock);
        let session_id = active_session(&coordinator).await;

        clock.advance_secs(3600);
        assert_eq!(coordinator.expire_pending().await, 0);
        assert_eq!(
            coordinator.get_session(session_id).unwrap().state,
            SessionState::Active
        );
    }

    #[tokio::test]
    async fn test_submit_report_validates_participant() {
        let clock = ManualClock::from_system();
        let coordinator = coordinator(&clock);
        let session_id = active_session(&coordinator).await;

        let report = Report {
            session_id,
            reporter_id: 99,
            reported_id: 2,
            category: crate::model::ReportCategory::Spam,
            reason: "spam links".to_string(),
            created_at: clock.now(),
        };
        assert!(matches!(
            coordinator.submit_report(report).await,
            Err(ServerError::NotParticipant(99))
        ));

        let report = Report {
            session_id,
            reporter_id: 1,
            reported_id: 2,
            category: crate::model::ReportCategory::Spam,
            reason: "spam links".to_string(),
            created_at: clock.now(),
        };
        coordinator.submit_report(report).await.unwrap();
        assert_eq!(coordinator.report_count(), 1);
    }
}
