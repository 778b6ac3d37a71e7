/// 审核模块
///
/// 站在"消息已提交"与"消息可见"之间的内联审核门：
/// - 确定性规则管线（链接 / 联系方式 / 脏话 / 骚扰），同步、无副作用
/// - 可选的外部评分精修，严格增量，失败即回退规则判定（fail-closed）
pub mod gate;
pub mod scorer;
pub mod service;

pub use gate::ModerationGate;
pub use scorer::{ExternalScorer, HttpScorer, ScoreVerdict};
pub use service::ModerationService;
