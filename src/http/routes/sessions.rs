//! 会话路由
//!
//! POST /sessions/{id}/ack, POST /sessions/{id}/messages, POST /sessions/{id}/end

use axum::{
    extract::{Path, State},
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::Result;
use crate::http::HttpServerState;
use crate::model::{EndReason, PostOutcome};

/// 创建会话路由
pub fn create_route() -> Router<HttpServerState> {
    Router::new()
        .route("/sessions/{id}/ack", post(acknowledge_session))
        .route("/sessions/{id}/messages", post(post_message))
        .route("/sessions/{id}/end", post(end_session))
}

#[derive(Debug, Deserialize)]
struct AckRequest {
    identity_id: u64,
}

/// 在场确认处理器（幂等）
async fn acknowledge_session(
    State(state): State<HttpServerState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<AckRequest>,
) -> Result<Json<Value>> {
    state
        .sessions
        .acknowledge(session_id, request.identity_id)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
struct PostMessageRequest {
    sender_id: u64,
    content: String,
}

/// 发送消息处理器
///
/// 内容拦截是 200 正常结果（accepted=false），不是错误状态码
async fn post_message(
    State(state): State<HttpServerState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<PostMessageRequest>,
) -> Result<Json<Value>> {
    let outcome = state
        .sessions
        .post_message(session_id, request.sender_id, &request.content)
        .await?;

    let body = match outcome {
        PostOutcome::Accepted { message_id } => json!({
            "accepted": true,
            "message_id": message_id,
        }),
        PostOutcome::Rejected { reason } => json!({
            "accepted": false,
            "reason": reason.as_str(),
        }),
    };

    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
struct EndRequest {
    by: u64,
    #[serde(default = "default_end_reason")]
    reason: EndReason,
}

fn default_end_reason() -> EndReason {
    EndReason::UserLeft
}

/// 结束会话处理器（幂等）
async fn end_session(
    State(state): State<HttpServerState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<EndRequest>,
) -> Result<Json<Value>> {
    let reason = state
        .sessions
        .end(session_id, Some(request.by), request.reason)
        .await?;

    Ok(Json(json!({
        "ended": true,
        "reason": reason.as_str(),
    })))
}
