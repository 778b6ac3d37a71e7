use std::sync::Arc;
use anyhow::Result;
use tracing::warn;

use crate::clock::{Clock, SystemClock};
use crate::config::ServerConfig;
use crate::fanout::FanoutHub;
use crate::http::{ApiHttpServer, HttpServerState};
use crate::model::{IdentityResolver, StaticIdentityResolver};
use crate::moderation::{ExternalScorer, HttpScorer, ModerationGate, ModerationService};
use crate::queue::{Matchmaker, QueueManager};
use crate::scheduler::Scheduler;
use crate::session::{LogReportSink, SessionCoordinator};

/// Pairchat 服务器
///
/// 组装全部组件并持有调度器与 HTTP 状态：
/// 队列存储、会话协调器、审核服务、事件分发中心与周期调度器
pub struct PairchatServer {
    config: ServerConfig,
    state: HttpServerState,
    scheduler: Arc<Scheduler>,
}

impl PairchatServer {
    /// 按配置组装服务器
    pub fn new(config: ServerConfig) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let fanout = Arc::new(FanoutHub::new(config.fanout.channel_capacity));

        let queue = Arc::new(QueueManager::new(config.queue.clone(), Arc::clone(&clock)));

        let gate = ModerationGate::new(
            &config.moderation.extra_profanity,
            &config.moderation.extra_harassment,
        );
        let scorer: Option<Arc<dyn ExternalScorer>> = match &config.moderation.scorer_url {
            Some(url) => Some(Arc::new(HttpScorer::new(
                url.clone(),
                config.moderation.scorer_timeout_ms,
            )?)),
            None => None,
        };
        let moderation = ModerationService::new(gate, scorer);

        let sessions = Arc::new(SessionCoordinator::new(
            config.session.clone(),
            moderation,
            Arc::new(LogReportSink),
            Arc::clone(&fanout),
            Arc::clone(&clock),
        ));

        let matchmaker = Arc::new(Matchmaker::new(
            Arc::clone(&queue),
            Arc::clone(&sessions),
            config.queue.cross_tier_weight,
        ));

        let resolver: Arc<dyn IdentityResolver> = Arc::new(StaticIdentityResolver::new());

        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&queue),
            Arc::clone(&matchmaker),
            Arc::clone(&sessions),
            Arc::clone(&resolver),
            Arc::clone(&fanout),
            Arc::clone(&clock),
            config.queue.tick_interval_secs,
        ));

        let state = HttpServerState {
            queue,
            matchmaker,
            sessions,
            resolver,
            fanout,
            clock,
        };

        Ok(Self {
            config,
            state,
            scheduler,
        })
    }

    /// 运行服务器（启动调度器后阻塞在 HTTP 服务上）
    pub async fn run(&self) -> Result<()> {
        if self.config.enable_metrics {
            if let Err(e) = crate::infra::metrics::init() {
                warn!("⚠️ 指标初始化失败（继续运行）: {}", e);
            }
        }

        Arc::clone(&self.scheduler).start().await;

        let http = ApiHttpServer::new(
            self.state.clone(),
            self.config.host.clone(),
            self.config.port,
        );
        http.start()
            .await
            .map_err(|e| anyhow::anyhow!("HTTP 服务器退出: {}", e))?;

        Ok(())
    }

    /// 共享状态（测试与演示）
    pub fn state(&self) -> &HttpServerState {
        &self.state
    }

    /// 调度器（测试可直接驱动 tick）
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }
}
