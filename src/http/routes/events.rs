//! SSE 事件流路由
//!
//! GET /events/session/{id}?identity_id=  会话主题
//! GET /events/queue/{identity_id}        队列主题
//!
//! 订阅的生命周期就是连接的生命周期：连接断开即退订，
//! fan-out 注册不会泄漏。

use std::convert::Infallible;
use std::sync::Arc;
use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{Result, ServerError};
use crate::fanout::{EventType, FanoutEvent, FanoutHub, SubscriptionHandle, Topic};
use crate::http::HttpServerState;
use crate::queue::QueueManager;

/// 创建事件流路由
pub fn create_route() -> Router<HttpServerState> {
    Router::new()
        .route("/events/session/{id}", get(session_events))
        .route("/events/queue/{identity_id}", get(queue_events))
}

#[derive(Debug, Deserialize)]
struct IdentityQuery {
    identity_id: u64,
}

/// 把订阅句柄变成 SSE 流；guard 随流一起存活，断开时执行清理
fn sse_stream<G: Send + 'static>(
    handle: SubscriptionHandle,
    guard: G,
) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    futures::stream::unfold((handle, guard), |(mut handle, guard)| async move {
        let event = handle.recv().await?;
        let sse = Event::default().json_data(&event).ok()?;
        Some((Ok(sse), (handle, guard)))
    })
}

/// 会话事件流
///
/// 连接即在场确认：订阅先于 acknowledge，订阅方不会错过自己
/// 触发的 presence_join / session_activated
async fn session_events(
    State(state): State<HttpServerState>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<IdentityQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let session = state
        .sessions
        .get_session(session_id)
        .ok_or_else(|| ServerError::SessionNotFound(session_id.to_string()))?;
    if !session.is_participant(query.identity_id) {
        return Err(ServerError::NotParticipant(query.identity_id));
    }

    let handle = state.fanout.subscribe(Topic::Session(session_id));
    state
        .sessions
        .acknowledge(session_id, query.identity_id)
        .await?;

    let guard = PresenceLeaveGuard {
        fanout: Arc::clone(&state.fanout),
        topic: Topic::Session(session_id),
        identity_id: query.identity_id,
        clock: Arc::clone(&state.clock),
    };

    Ok(Sse::new(sse_stream(handle, guard)).keep_alive(KeepAlive::default()))
}

/// 队列事件流
///
/// 可以在 Join 之前订阅（session_created 不会错过）；
/// 连接断开视作协同中止等待中的匹配，条目随之离队
async fn queue_events(
    State(state): State<HttpServerState>,
    Path(identity_id): Path<u64>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let handle = state.fanout.subscribe(Topic::Queue(identity_id));

    let guard = QueueLeaveGuard {
        queue: Arc::clone(&state.queue),
        identity_id,
    };

    Ok(Sse::new(sse_stream(handle, guard)).keep_alive(KeepAlive::default()))
}

/// 会话流断开时发布 presence_leave
struct PresenceLeaveGuard {
    fanout: Arc<FanoutHub>,
    topic: Topic,
    identity_id: u64,
    clock: Arc<dyn Clock>,
}

impl Drop for PresenceLeaveGuard {
    fn drop(&mut self) {
        self.fanout.publish(
            &self.topic,
            FanoutEvent::new(
                EventType::PresenceLeave,
                json!({ "identity_id": self.identity_id }),
                self.clock.now(),
            ),
        );
    }
}

/// 队列流断开时协同离队（已匹配或已离队时为 no-op）
struct QueueLeaveGuard {
    queue: Arc<QueueManager>,
    identity_id: u64,
}

impl Drop for QueueLeaveGuard {
    fn drop(&mut self) {
        let queue = Arc::clone(&self.queue);
        let identity_id = self.identity_id;
        tokio::spawn(async move {
            // 条目可能已被匹配走或显式离队，NotInQueue 在这里不是问题
            let _ = queue.remove_entry(identity_id).await;
        });
    }
}
