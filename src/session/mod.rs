/// 会话模块
///
/// - coordinator: 会话状态机与消息管线
/// - violations: 按身份归档的违规计数 arena
/// - reports: 举报投递口（外部 moderation-action 系统）
pub mod coordinator;
pub mod reports;
pub mod violations;

pub use coordinator::SessionCoordinator;
pub use reports::{LogReportSink, ReportSink};
pub use violations::{ViolationRecord, ViolationTracker};
