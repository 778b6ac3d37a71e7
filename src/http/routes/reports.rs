//! 举报路由
//!
//! POST /reports -> 202（fire-and-forget 转发给外部 moderation-action 系统）

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::Result;
use crate::http::HttpServerState;
use crate::model::{Report, ReportCategory};

/// 创建举报路由
pub fn create_route() -> Router<HttpServerState> {
    Router::new().route("/reports", post(submit_report))
}

#[derive(Debug, Deserialize)]
struct ReportRequest {
    session_id: Uuid,
    reporter_id: u64,
    reported_id: u64,
    category: ReportCategory,
    reason: String,
}

/// 举报处理器
async fn submit_report(
    State(state): State<HttpServerState>,
    Json(request): Json<ReportRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let report = Report {
        session_id: request.session_id,
        reporter_id: request.reporter_id,
        reported_id: request.reported_id,
        category: request.category,
        reason: request.reason,
        created_at: state.clock.now(),
    };

    state.sessions.submit_report(report).await?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "accepted": true }))))
}
