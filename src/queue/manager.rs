use std::collections::HashMap;
use std::sync::Arc;
use chrono::Duration;
use rustc_hash::FxHashSet;
use tokio::sync::RwLock;

use crate::clock::Clock;
use crate::config::QueueConfig;
use crate::error::{Result, ServerError};
use crate::model::{Identity, LookingFor, QueueEntry, QueueStatus};

/// 匹配队列管理器
///
/// 持有全部等待中的参与者条目。条目由 Join 创建，只有匹配事务可以
/// 改写 claimed 位，在 Leave、匹配成功或 TTL 驱逐时销毁。
/// 所有影响匹配正确性的变更（认领、驱逐）都在同一把写锁内完成，
/// 对外不暴露任何中间状态。
pub struct QueueManager {
    /// 条目表：identity_id -> QueueEntry
    entries: RwLock<HashMap<u64, QueueEntry>>,
    config: QueueConfig,
    clock: Arc<dyn Clock>,
}

impl QueueManager {
    pub fn new(config: QueueConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
            clock,
        }
    }

    /// 入队
    ///
    /// - 已封禁身份拒绝：AlreadyBanned
    /// - 已有未过期条目拒绝：AlreadyQueued
    /// - 已过期但尚未被 tick 驱逐的条目：静默替换，不补发 queue_timeout
    ///   （所有者正在重新入队，超时通知已无意义）
    pub async fn insert_entry(
        &self,
        identity: &Identity,
        interests: FxHashSet<String>,
        looking_for: LookingFor,
    ) -> Result<QueueStatus> {
        if identity.banned() {
            return Err(ServerError::AlreadyBanned(identity.id()));
        }

        let now = self.clock.now();
        let ttl = Duration::seconds(self.config.entry_ttl_secs as i64);

        let mut entries = self.entries.write().await;

        if let Some(existing) = entries.get(&identity.id()) {
            let expired = now.signed_duration_since(existing.entered_at) > ttl;
            if !expired {
                return Err(ServerError::AlreadyQueued(identity.id()));
            }
            entries.remove(&identity.id());
        }

        let entry = QueueEntry::new(identity.id(), identity.tier(), interests, looking_for, now);
        let status = Self::status_of(&entries, &entry, self.config.tick_interval_secs);
        entries.insert(identity.id(), entry);

        crate::infra::metrics::record_queue_join();
        tracing::debug!("📥 入队: identity={}, tier={:?}", identity.id(), identity.tier());

        Ok(status)
    }

    /// 离队（同时中止尚未提交的匹配尝试）
    pub async fn remove_entry(&self, identity_id: u64) -> Result<()> {
        let mut entries = self.entries.write().await;
        match entries.remove(&identity_id) {
            Some(_) => {
                tracing::debug!("📤 离队: identity={}", identity_id);
                Ok(())
            }
            None => Err(ServerError::NotInQueue(identity_id)),
        }
    }

    /// 队列状态查询
    pub async fn status(&self, identity_id: u64) -> Result<QueueStatus> {
        let entries = self.entries.read().await;
        let entry = entries
            .get(&identity_id)
            .ok_or(ServerError::NotInQueue(identity_id))?;

        Ok(Self::status_of(
            &entries,
            entry,
            self.config.tick_interval_secs,
        ))
    }

    /// 位置估算：同组未认领且更早入队的条目数 + 1；
    /// 等待估算：位置 × tick 间隔
    fn status_of(
        entries: &HashMap<u64, QueueEntry>,
        entry: &QueueEntry,
        tick_interval_secs: u64,
    ) -> QueueStatus {
        let position = entries
            .values()
            .filter(|e| {
                e.looking_for == entry.looking_for
                    && !e.claimed
                    && e.identity_id != entry.identity_id
                    && e.entered_at < entry.entered_at
            })
            .count()
            + 1;

        QueueStatus {
            position_estimate: position,
            wait_estimate_secs: position as u64 * tick_interval_secs,
        }
    }

    /// 未认领条目快照（匹配器的输入）
    pub async fn snapshot(&self) -> Vec<QueueEntry> {
        self.entries
            .read()
            .await
            .values()
            .filter(|e| !e.claimed)
            .cloned()
            .collect()
    }

    /// 原子认领一对条目
    ///
    /// 在同一把写锁内校验双方都在场且未被认领，然后标记认领并移出
    /// 队列：认领与移除是一个事务，绝不出现半认领状态。
    /// 任一侧已被并发认领或已离队时返回 None，另一侧原样留在池中，
    /// 等下一个 tick 重试。
    pub async fn claim_pair(&self, a: u64, b: u64) -> Option<(QueueEntry, QueueEntry)> {
        let mut entries = self.entries.write().await;

        let claimable = |id: u64| entries.get(&id).map(|e| !e.claimed).unwrap_or(false);
        if !claimable(a) || !claimable(b) {
            return None;
        }

        let mut entry_a = entries.remove(&a)?;
        let mut entry_b = entries.remove(&b)?;
        entry_a.claimed = true;
        entry_b.claimed = true;

        Some((entry_a, entry_b))
    }

    /// 驱逐过期条目，返回被驱逐的条目
    ///
    /// 移除发生在锁内、通知由调用方在锁外进行：每个被驱逐条目
    /// 恰好产生一次 queue_timeout 事件，与并发重入队不冲突
    pub async fn evict_expired(&self) -> Vec<QueueEntry> {
        let now = self.clock.now();
        let ttl = Duration::seconds(self.config.entry_ttl_secs as i64);

        let mut entries = self.entries.write().await;
        let expired_ids: Vec<u64> = entries
            .values()
            .filter(|e| !e.claimed && now.signed_duration_since(e.entered_at) > ttl)
            .map(|e| e.identity_id)
            .collect();

        let mut evicted = Vec::with_capacity(expired_ids.len());
        for id in expired_ids {
            if let Some(entry) = entries.remove(&id) {
                evicted.push(entry);
            }
        }

        if !evicted.is_empty() {
            crate::infra::metrics::record_queue_evictions(evicted.len() as u64);
            tracing::info!("🧹 队列驱逐: {} 个条目超过 TTL", evicted.len());
        }

        evicted
    }

    /// 当前队列深度
    pub async fn depth(&self) -> usize {
        self.entries.read().await.len()
    }
}
