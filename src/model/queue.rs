use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::identity::Tier;

/// 期望的会话形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookingFor {
    Text,
    Video,
}

/// 匹配队列条目
///
/// Join 时创建，只有匹配器可以改写 claimed 位；
/// 在 Leave、匹配成功或 TTL 过期驱逐时销毁。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// 身份 ID
    pub identity_id: u64,
    /// 服务等级（参与兼容度打分）
    pub tier: Tier,
    /// 兴趣标签集合
    pub interests: FxHashSet<String>,
    /// 期望的会话形式（只在同组内配对）
    pub looking_for: LookingFor,
    /// 入队时间（匹配按此排序，越早越优先）
    pub entered_at: DateTime<Utc>,
    /// 是否已被某次匹配事务认领
    pub claimed: bool,
}

impl QueueEntry {
    pub fn new(
        identity_id: u64,
        tier: Tier,
        interests: FxHashSet<String>,
        looking_for: LookingFor,
        entered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            identity_id,
            tier,
            interests,
            looking_for,
            entered_at,
            claimed: false,
        }
    }

    /// 与另一条目的兴趣重合率（Jaccard，双方都为空时记 0）
    pub fn interest_overlap_ratio(&self, other: &QueueEntry) -> f64 {
        let intersection = self.interests.intersection(&other.interests).count();
        let union = self.interests.union(&other.interests).count();
        if union == 0 {
            0.0
        } else {
            intersection as f64 / union as f64
        }
    }
}

/// 队列状态查询结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    /// 估算的队列位置（1 起）
    pub position_estimate: usize,
    /// 估算的等待秒数
    pub wait_estimate_secs: u64,
}

/// Join 的两种结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JoinOutcome {
    /// 已入队等待
    Queued { position: usize, wait_estimate_s: u64 },
    /// 入队即配对成功
    Matched { session_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(id: u64, interests: &[&str]) -> QueueEntry {
        QueueEntry::new(
            id,
            Tier::Free,
            interests.iter().map(|s| s.to_string()).collect(),
            LookingFor::Text,
            Utc::now(),
        )
    }

    #[test]
    fn test_interest_overlap_ratio() {
        let a = entry(1, &["rust", "music", "films"]);
        let b = entry(2, &["rust", "music", "hiking"]);

        // 交集 2 / 并集 4
        assert!((a.interest_overlap_ratio(&b) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_interests_overlap_is_zero() {
        let a = entry(1, &[]);
        let b = entry(2, &[]);
        assert_eq!(a.interest_overlap_ratio(&b), 0.0);
    }
}
