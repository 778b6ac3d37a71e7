use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::fanout::{EventType, FanoutEvent, FanoutHub, Topic};
use crate::model::IdentityResolver;
use crate::queue::{Matchmaker, QueueManager};
use crate::session::SessionCoordinator;

/// 调度器统计信息
#[derive(Debug, Clone, Default)]
pub struct TickStats {
    pub total_ticks: u64,
    pub total_matches: u64,
    pub total_evictions: u64,
    pub total_expired_sessions: u64,
    pub total_ban_ends: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
}

/// 周期调度器
///
/// 系统里唯一的后台任务：匹配 pass、队列 TTL 驱逐、pending 会话
/// 确认窗口超时、封禁巡检、违规计数清理全部挂在同一个固定 tick 上，
/// 不使用任何 per-connection 定时器。tick() 可从测试直接调用，
/// 配合注入的 Clock 实现无等待的确定性测试。
pub struct Scheduler {
    queue: Arc<QueueManager>,
    matchmaker: Arc<Matchmaker>,
    sessions: Arc<SessionCoordinator>,
    resolver: Arc<dyn IdentityResolver>,
    fanout: Arc<FanoutHub>,
    clock: Arc<dyn Clock>,
    /// tick 间隔（秒）
    tick_interval_secs: u64,
    /// 运行状态
    running: Arc<tokio::sync::Mutex<bool>>,
    /// 统计信息
    stats: Arc<tokio::sync::Mutex<TickStats>>,
}

impl Scheduler {
    pub fn new(
        queue: Arc<QueueManager>,
        matchmaker: Arc<Matchmaker>,
        sessions: Arc<SessionCoordinator>,
        resolver: Arc<dyn IdentityResolver>,
        fanout: Arc<FanoutHub>,
        clock: Arc<dyn Clock>,
        tick_interval_secs: u64,
    ) -> Self {
        Self {
            queue,
            matchmaker,
            sessions,
            resolver,
            fanout,
            clock,
            tick_interval_secs,
            running: Arc::new(tokio::sync::Mutex::new(false)),
            stats: Arc::new(tokio::sync::Mutex::new(TickStats::default())),
        }
    }

    /// 启动后台 tick 循环
    pub async fn start(self: Arc<Self>) {
        {
            let mut running = self.running.lock().await;
            if *running {
                return;
            }
            *running = true;
        }

        info!("⏱️ 调度器启动: tick 间隔 {}s", self.tick_interval_secs);

        let scheduler = Arc::clone(&self);
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(scheduler.tick_interval_secs));

            loop {
                ticker.tick().await;

                {
                    let running = scheduler.running.lock().await;
                    if !*running {
                        break;
                    }
                }

                scheduler.tick().await;
            }
        });
    }

    /// 停止调度器
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        *running = false;
        info!("调度器停止");
    }

    /// 获取统计信息
    pub async fn get_stats(&self) -> TickStats {
        self.stats.lock().await.clone()
    }

    /// 执行一个完整的 tick
    ///
    /// tick 内任何一步失败只记日志，下个周期自然重试，核心里
    /// 没有对进程致命的路径
    pub async fn tick(&self) {
        let now = self.clock.now();

        // 1. 队列 TTL 驱逐：移除在前（锁内），通知在后（锁外），
        //    每个条目恰好一条 queue_timeout
        let evicted = self.queue.evict_expired().await;
        let eviction_count = evicted.len();
        for entry in evicted {
            self.fanout.publish(
                &Topic::Queue(entry.identity_id),
                FanoutEvent::new(
                    EventType::QueueTimeout,
                    serde_json::json!({ "identity_id": entry.identity_id }),
                    now,
                ),
            );
        }

        // 2. 匹配 pass
        let matched = self.matchmaker.run_pass().await;

        // 3. pending 会话确认窗口超时
        let expired_sessions = self.sessions.expire_pending().await;

        // 4. 封禁巡检：观察到封禁的参与者，其全部会话强制结束
        let mut ban_ends = 0;
        for identity_id in self.sessions.live_participants() {
            match self.resolver.is_banned(identity_id).await {
                Ok(true) => {
                    ban_ends += self.sessions.on_ban_observed(identity_id).await as u64;
                }
                Ok(false) => {}
                Err(e) => {
                    error!("封禁巡检失败: identity={}, err={}", identity_id, e);
                }
            }
        }

        // 5. 违规计数清理
        let cleaned = self.sessions.cleanup_violations();
        if cleaned > 0 {
            debug!("🧹 违规计数清理: {} 条", cleaned);
        }

        // 6. 刷新指标
        crate::infra::metrics::record_queue_depth(self.queue.depth().await);
        crate::infra::metrics::record_active_sessions(self.sessions.active_count());
        crate::infra::metrics::record_fanout_topics(self.fanout.topic_count());

        let mut stats = self.stats.lock().await;
        stats.total_ticks += 1;
        stats.total_matches += matched as u64;
        stats.total_evictions += eviction_count as u64;
        stats.total_expired_sessions += expired_sessions as u64;
        stats.total_ban_ends += ban_ends;
        stats.last_tick_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashSet;
    use crate::clock::ManualClock;
    use crate::config::{QueueConfig, SessionConfig};
    use crate::model::{Identity, LookingFor, StaticIdentityResolver, Tier};
    use crate::moderation::{ModerationGate, ModerationService};
    use crate::session::LogReportSink;

    struct Fixture {
        scheduler: Scheduler,
        queue: Arc<QueueManager>,
        matchmaker: Arc<Matchmaker>,
        sessions: Arc<SessionCoordinator>,
        resolver: Arc<StaticIdentityResolver>,
        fanout: Arc<FanoutHub>,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::from_system();
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let fanout = Arc::new(FanoutHub::default());
        let queue = Arc::new(QueueManager::new(
            QueueConfig::default(),
            Arc::clone(&shared_clock),
        ));
        let sessions = Arc::new(SessionCoordinator::new(
            SessionConfig::default(),
            ModerationService::rules_only(ModerationGate::default()),
            Arc::new(LogReportSink),
            Arc::clone(&fanout),
            Arc::clone(&shared_clock),
        ));
        let matchmaker = Arc::new(Matchmaker::new(
            Arc::clone(&queue),
            Arc::clone(&sessions),
            0.5,
        ));
        let resolver = Arc::new(StaticIdentityResolver::new());

        let scheduler = Scheduler::new(
            Arc::clone(&queue),
            Arc::clone(&matchmaker),
            Arc::clone(&sessions),
            resolver.clone() as Arc<dyn IdentityResolver>,
            Arc::clone(&fanout),
            shared_clock,
            3,
        );

        Fixture {
            scheduler,
            queue,
            matchmaker,
            sessions,
            resolver,
            fanout,
            clock,
        }
    }

    fn guest(id: u64) -> Identity {
        Identity::Guest {
            id,
            tier: Tier::Free,
            banned: false,
        }
    }

    #[tokio::test]
    async fn test_tick_matches_waiting_entries() {
        let f = fixture();

        // 直接塞两个条目（绕开 join 快速配对路径）
        f.queue
            .insert_entry(&guest(1), FxHashSet::default(), LookingFor::Text)
            .await
            .unwrap();
        f.queue
            .insert_entry(&guest(2), FxHashSet::default(), LookingFor::Text)
            .await
            .unwrap();

        f.scheduler.tick().await;

        // 两个条目都离开队列且有会话把它们配在一起
        assert_eq!(f.queue.depth().await, 0);
        let stats = f.scheduler.get_stats().await;
        assert_eq!(stats.total_matches, 1);
    }

    #[tokio::test]
    async fn test_tick_evicts_and_notifies_exactly_once() {
        let f = fixture();

        let mut sub = f.fanout.subscribe(Topic::Queue(1));
        f.queue
            .insert_entry(&guest(1), FxHashSet::default(), LookingFor::Text)
            .await
            .unwrap();

        f.clock.advance_secs(121);
        f.scheduler.tick().await;
        f.scheduler.tick().await;

        // 恰好一条 queue_timeout
        let event = sub.try_recv().unwrap();
        assert_eq!(event.event_type, EventType::QueueTimeout);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_tick_ends_sessions_of_banned_identity() {
        let f = fixture();

        f.resolver.register(guest(1));
        f.resolver.register(guest(2));
        let session = f.sessions.create_session(1, 2).await;

        // 外部系统翻转封禁位，下一个 tick 必须观察到
        f.resolver.set_banned(1, true);
        f.scheduler.tick().await;

        let session = f.sessions.get_session(session.id).unwrap();
        assert_eq!(session.state, crate::model::SessionState::Ended);
        assert_eq!(
            session.end_reason,
            Some(crate::model::EndReason::ReportedBan)
        );
    }

    #[tokio::test]
    async fn test_tick_expires_unacked_pending_session() {
        let f = fixture();

        let session = f.sessions.create_session(1, 2).await;
        f.clock.advance_secs(16);
        f.scheduler.tick().await;

        assert_eq!(
            f.sessions.get_session(session.id).unwrap().end_reason,
            Some(crate::model::EndReason::Timeout)
        );
    }

    #[tokio::test]
    async fn test_join_fast_path_matches_immediately() {
        let f = fixture();

        let outcome = f
            .matchmaker
            .join(&guest(1), FxHashSet::default(), LookingFor::Text)
            .await
            .unwrap();
        assert!(matches!(outcome, crate::model::JoinOutcome::Queued { .. }));

        // 第二个加入者立刻配上第一个，无需等 tick
        let outcome = f
            .matchmaker
            .join(&guest(2), FxHashSet::default(), LookingFor::Text)
            .await
            .unwrap();
        assert!(matches!(outcome, crate::model::JoinOutcome::Matched { .. }));
        assert_eq!(f.queue.depth().await, 0);
    }
}
