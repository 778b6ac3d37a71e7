//! HTTP 路由模块
//!
//! 路由结构：
//! - `/queue/*`    - 匹配队列（join / leave / status）
//! - `/sessions/*` - 会话（ack / messages / end）
//! - `/events/*`   - SSE 事件流（session 与 queue 主题）
//! - `/reports`    - 举报提交（202，转发外部系统）
//! - `/metrics`    - Prometheus 抓取端点
//! - `/health`     - 存活探针

pub mod events;
pub mod metrics;
pub mod queue;
pub mod reports;
pub mod sessions;

use axum::{Router, routing::get};
use crate::http::HttpServerState;

/// 创建所有路由
pub fn create_routes() -> Router<HttpServerState> {
    Router::new()
        .route("/metrics", get(metrics::metrics_handler))
        .route("/health", get(metrics::health_handler))
        .merge(queue::create_route())    // /queue/* - 匹配队列
        .merge(sessions::create_route()) // /sessions/* - 会话操作
        .merge(events::create_route())   // /events/* - SSE 事件流
        .merge(reports::create_route())  // /reports - 举报
}
