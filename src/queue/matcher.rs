use std::sync::Arc;
use rustc_hash::FxHashSet;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{Identity, JoinOutcome, LookingFor, QueueEntry};
use crate::session::SessionCoordinator;
use super::manager::QueueManager;

/// 一对条目的配对得分：tier_compatibility × (1 + interest_overlap_ratio)
///
/// 同级 tier_compatibility 为 1.0，跨级取配置权重：免费用户
/// 面对付费用户只是降权，不会被排除
pub fn score_pair(a: &QueueEntry, b: &QueueEntry, cross_tier_weight: f64) -> f64 {
    let tier_compatibility = if a.tier == b.tier {
        1.0
    } else {
        cross_tier_weight
    };
    tier_compatibility * (1.0 + a.interest_overlap_ratio(b))
}

/// 在候选集中为 entry 挑选得分最高的未用条目（同组内）
///
/// 得分相同取更早入队者，保证同一快照的选择是确定的
fn best_candidate<'a>(
    entry: &QueueEntry,
    candidates: impl Iterator<Item = &'a QueueEntry>,
    cross_tier_weight: f64,
) -> Option<u64> {
    let mut best: Option<(&QueueEntry, f64)> = None;

    for candidate in candidates {
        if candidate.identity_id == entry.identity_id
            || candidate.looking_for != entry.looking_for
        {
            continue;
        }

        let score = score_pair(entry, candidate, cross_tier_weight);
        let better = match best {
            None => true,
            Some((current, current_score)) => {
                score > current_score
                    || (score == current_score && candidate.entered_at < current.entered_at)
            }
        };
        if better {
            best = Some((candidate, score));
        }
    }

    best.map(|(candidate, _)| candidate.identity_id)
}

/// 对一份队列快照做一轮配对规划
///
/// 按 entered_at 升序处理（最老的先配，限制饥饿）；对每个未配对
/// 条目选得分最高的候选。返回规划出的 (a, b) 对，a 为较早入队一方。
/// 这里只做规划不做提交，提交走 QueueManager 的原子认领事务。
pub fn plan_matches(snapshot: &[QueueEntry], cross_tier_weight: f64) -> Vec<(u64, u64)> {
    let mut ordered: Vec<&QueueEntry> = snapshot.iter().filter(|e| !e.claimed).collect();
    ordered.sort_by(|a, b| {
        a.entered_at
            .cmp(&b.entered_at)
            .then(a.identity_id.cmp(&b.identity_id))
    });

    let mut used: FxHashSet<u64> = FxHashSet::default();
    let mut pairs = Vec::new();

    for entry in &ordered {
        if used.contains(&entry.identity_id) {
            continue;
        }

        let candidates = ordered
            .iter()
            .filter(|e| !used.contains(&e.identity_id))
            .copied();

        if let Some(partner) = best_candidate(entry, candidates, cross_tier_weight) {
            used.insert(entry.identity_id);
            used.insert(partner);
            pairs.push((entry.identity_id, partner));
        }
    }

    pairs
}

/// 匹配服务
///
/// 把队列存储、配对规划和会话创建串成一个提交单元：
/// 认领成功即创建会话，认领冲突的一侧留在池中等下一个 tick
pub struct Matchmaker {
    queue: Arc<QueueManager>,
    sessions: Arc<SessionCoordinator>,
    cross_tier_weight: f64,
}

impl Matchmaker {
    pub fn new(
        queue: Arc<QueueManager>,
        sessions: Arc<SessionCoordinator>,
        cross_tier_weight: f64,
    ) -> Self {
        Self {
            queue,
            sessions,
            cross_tier_weight,
        }
    }

    /// 入队；入队后立即尝试一次定向配对（Join 合同里的 matched 分支）
    pub async fn join(
        &self,
        identity: &Identity,
        interests: FxHashSet<String>,
        looking_for: LookingFor,
    ) -> Result<JoinOutcome> {
        let status = self
            .queue
            .insert_entry(identity, interests, looking_for)
            .await?;

        if let Some(session_id) = self.try_match_for(identity.id()).await {
            return Ok(JoinOutcome::Matched { session_id });
        }

        Ok(JoinOutcome::Queued {
            position: status.position_estimate,
            wait_estimate_s: status.wait_estimate_secs,
        })
    }

    /// 为指定条目做一次定向配对尝试
    pub async fn try_match_for(&self, identity_id: u64) -> Option<Uuid> {
        let snapshot = self.queue.snapshot().await;
        let entry = snapshot.iter().find(|e| e.identity_id == identity_id)?;

        let partner = best_candidate(entry, snapshot.iter(), self.cross_tier_weight)?;
        self.commit(identity_id, partner).await
    }

    /// 一轮完整的匹配 pass（由调度器 tick 驱动）
    ///
    /// 返回提交成功的配对数。认领冲突不是错误：落败一侧还在池中，
    /// 下个 tick 自然重试
    pub async fn run_pass(&self) -> usize {
        let snapshot = self.queue.snapshot().await;
        let planned = plan_matches(&snapshot, self.cross_tier_weight);

        let mut committed = 0;
        for (a, b) in planned {
            if self.commit(a, b).await.is_some() {
                committed += 1;
            }
        }

        if committed > 0 {
            tracing::info!("🤝 匹配 pass 完成: {} 对", committed);
        }
        committed
    }

    /// 提交一对配对：原子认领 + 创建会话
    async fn commit(&self, a: u64, b: u64) -> Option<Uuid> {
        let (entry_a, entry_b) = self.queue.claim_pair(a, b).await?;

        // 较早入队的一方作为 participant_a
        let (first, second) = if entry_a.entered_at <= entry_b.entered_at {
            (entry_a, entry_b)
        } else {
            (entry_b, entry_a)
        };

        let session = self
            .sessions
            .create_session(first.identity_id, second.identity_id)
            .await;

        crate::infra::metrics::record_match_committed();
        Some(session.id)
    }
}
