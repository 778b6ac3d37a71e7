use std::time::Duration;
use tracing::info;

use crate::error::{Result, ServerError};
use crate::model::Report;

/// 举报下游（外部 moderation-action 系统的投递口）
///
/// 投递是 fire-and-forget：提交方不等待也不重试，外部系统消费后
/// 可能翻转 Identity.banned，核心经由封禁巡检观察到结果
#[async_trait::async_trait]
pub trait ReportSink: Send + Sync + 'static {
    /// 投递一条举报
    async fn submit(&self, report: &Report) -> Result<()>;
}

/// 简单的日志投递器（独立部署与测试用）
#[derive(Debug, Clone)]
pub struct LogReportSink;

#[async_trait::async_trait]
impl ReportSink for LogReportSink {
    async fn submit(&self, report: &Report) -> Result<()> {
        info!(
            "Forwarding report: session={}, reporter={}, reported={}, category={:?}",
            report.session_id, report.reporter_id, report.reported_id, report.category
        );

        // 模拟投递延迟
        tokio::time::sleep(Duration::from_millis(10)).await;

        // 模拟 5% 的失败率
        if rand::random::<f32>() < 0.05 {
            return Err(ServerError::Internal(
                "Simulated report delivery failure".to_string(),
            ));
        }

        Ok(())
    }
}
