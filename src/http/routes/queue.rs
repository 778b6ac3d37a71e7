//! 匹配队列路由
//!
//! POST /queue/join, POST /queue/leave, GET /queue/status

use axum::{
    extract::{Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use rustc_hash::FxHashSet;

use crate::error::Result;
use crate::http::HttpServerState;
use crate::model::{Identity, JoinOutcome, LookingFor};

/// 创建队列路由
pub fn create_route() -> Router<HttpServerState> {
    Router::new()
        .route("/queue/join", post(join_queue))
        .route("/queue/leave", post(leave_queue))
        .route("/queue/status", get(queue_status))
}

#[derive(Debug, Deserialize)]
struct JoinRequest {
    /// 身份声明（kind/id/tier），在边界处解析一次
    identity: Identity,
    #[serde(default)]
    interests: Vec<String>,
    looking_for: LookingFor,
}

/// 入队处理器
async fn join_queue(
    State(state): State<HttpServerState>,
    Json(request): Json<JoinRequest>,
) -> Result<Json<Value>> {
    // 身份解析只发生在边界：核心代码拿到的是已解析的 Identity
    let identity = state.resolver.resolve(&request.identity).await?;

    let interests: FxHashSet<String> = request.interests.into_iter().collect();
    let outcome = state
        .matchmaker
        .join(&identity, interests, request.looking_for)
        .await?;

    let body = match outcome {
        JoinOutcome::Queued {
            position,
            wait_estimate_s,
        } => json!({
            "queued": true,
            "position": position,
            "wait_estimate_s": wait_estimate_s,
        }),
        JoinOutcome::Matched { session_id } => json!({
            "matched": true,
            "session_id": session_id,
        }),
    };

    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
struct LeaveRequest {
    identity_id: u64,
}

/// 离队处理器
async fn leave_queue(
    State(state): State<HttpServerState>,
    Json(request): Json<LeaveRequest>,
) -> Result<Json<Value>> {
    state.queue.remove_entry(request.identity_id).await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    id: u64,
}

/// 队列状态处理器
async fn queue_status(
    State(state): State<HttpServerState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Value>> {
    let status = state.queue.status(query.id).await?;
    Ok(Json(json!({
        "position": status.position_estimate,
        "wait_estimate_s": status.wait_estimate_secs,
    })))
}
