use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// 单个身份的违规记录
#[derive(Debug, Clone)]
pub struct ViolationRecord {
    /// 累计违规次数
    pub count: u32,
    /// 最近一次违规时间
    pub last_violation_at: DateTime<Utc>,
}

/// 违规计数器
///
/// 按身份 ID 归档的计数 arena：消息被审核门拦截时 +1。封禁阈值
/// 策略归外部 moderation-action 系统所有，这里只负责计数与暴露。
/// 过期条目由调度器的周期 tick 清理，保证不会无界增长。
pub struct ViolationTracker {
    entries: DashMap<u64, ViolationRecord>,
    /// 记录保留时长，最近一次违规超过该时长即被清理
    ttl: Duration,
}

impl ViolationTracker {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }

    /// 记录一次违规，返回该身份的最新累计值
    pub fn record(&self, identity_id: u64, now: DateTime<Utc>) -> u32 {
        let mut record = self
            .entries
            .entry(identity_id)
            .or_insert_with(|| ViolationRecord {
                count: 0,
                last_violation_at: now,
            });
        record.count += 1;
        record.last_violation_at = now;
        record.count
    }

    /// 当前累计违规次数
    pub fn count_of(&self, identity_id: u64) -> u32 {
        self.entries
            .get(&identity_id)
            .map(|r| r.count)
            .unwrap_or(0)
    }

    /// 清理过期记录，返回清理条数
    pub fn cleanup_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, record| now.signed_duration_since(record.last_violation_at) <= self.ttl);
        before - self.entries.len()
    }
}
