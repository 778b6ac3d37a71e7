/// 匹配队列模块
///
/// - manager: 等待条目存储，Join/Leave/Status、TTL 驱逐与原子认领事务
/// - matcher: 配对打分与规划、提交（认领 + 创建会话）
pub mod manager;
pub mod matcher;

pub use manager::QueueManager;
pub use matcher::{plan_matches, score_pair, Matchmaker};
