use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use pairchat::config::ServerConfig;
use pairchat::http::ApiHttpServer;
use pairchat::server::PairchatServer;

/// 组装一个不启动监听的测试路由（tower oneshot 直接打请求）
fn test_router() -> Router {
    let server = PairchatServer::new(ServerConfig::default()).unwrap();
    ApiHttpServer::new(server.state().clone(), "127.0.0.1".to_string(), 0).router()
}

async fn request(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");

    let request = match body {
        Some(value) => builder.body(Body::from(value.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, value)
}

fn join_body(id: u64) -> Value {
    json!({
        "identity": { "kind": "guest", "id": id, "tier": "free" },
        "interests": ["rust"],
        "looking_for": "text",
    })
}

#[tokio::test]
async fn test_join_then_match_over_http() {
    let router = test_router();

    let (status, body) = request(&router, "POST", "/queue/join", Some(join_body(1))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queued"], true);
    assert_eq!(body["position"], 1);

    // 第二个加入者直接配上第一个
    let (status, body) = request(&router, "POST", "/queue/join", Some(join_body(2))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["matched"], true);
    assert!(body["session_id"].is_string());
}

#[tokio::test]
async fn test_duplicate_join_conflicts() {
    let router = test_router();

    request(&router, "POST", "/queue/join", Some(join_body(3))).await;
    let (status, body) = request(&router, "POST", "/queue/join", Some(join_body(3))).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "AlreadyQueued");
}

#[tokio::test]
async fn test_banned_identity_is_forbidden() {
    let router = test_router();

    let body = json!({
        "identity": { "kind": "registered", "id": 4, "tier": "premium", "banned": true },
        "interests": [],
        "looking_for": "text",
    });
    let (status, body) = request(&router, "POST", "/queue/join", Some(body)).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "AlreadyBanned");
}

#[tokio::test]
async fn test_leave_and_status() {
    let router = test_router();

    request(&router, "POST", "/queue/join", Some(join_body(5))).await;

    let (status, body) = request(&router, "GET", "/queue/status?id=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["position"], 1);
    assert!(body["wait_estimate_s"].as_u64().is_some());

    let (status, _) = request(
        &router,
        "POST",
        "/queue/leave",
        Some(json!({ "identity_id": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // 再次离队与查询都是 404
    let (status, body) = request(
        &router,
        "POST",
        "/queue/leave",
        Some(json!({ "identity_id": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NotInQueue");

    let (status, _) = request(&router, "GET", "/queue/status?id=5", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// 建一个已匹配的会话，返回 session_id
async fn matched_session(router: &Router) -> String {
    request(router, "POST", "/queue/join", Some(join_body(1))).await;
    let (_, body) = request(router, "POST", "/queue/join", Some(join_body(2))).await;
    body["session_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_message_rejected_while_pending() {
    let router = test_router();
    let session_id = matched_session(&router).await;

    // 内容无关紧要：pending 会话一律 409
    let (status, body) = request(
        &router,
        "POST",
        &format!("/sessions/{}/messages", session_id),
        Some(json!({ "sender_id": 1, "content": "hello there" })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "SessionNotActive");
}

#[tokio::test]
async fn test_full_session_flow_over_http() {
    let router = test_router();
    let session_id = matched_session(&router).await;

    // 双方确认在场
    for id in [1, 2] {
        let (status, _) = request(
            &router,
            "POST",
            &format!("/sessions/{}/ack", session_id),
            Some(json!({ "identity_id": id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    // 正常消息
    let (status, body) = request(
        &router,
        "POST",
        &format!("/sessions/{}/messages", session_id),
        Some(json!({ "sender_id": 1, "content": "hello there" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], true);
    assert!(body["message_id"].as_u64().is_some());

    // 被审核门拦截：200 + accepted=false，不是错误
    let (status, body) = request(
        &router,
        "POST",
        &format!("/sessions/{}/messages", session_id),
        Some(json!({ "sender_id": 2, "content": "visit http://x.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], false);
    assert_eq!(body["reason"], "links_not_allowed");

    // 非参与者 403
    let (status, body) = request(
        &router,
        "POST",
        &format!("/sessions/{}/messages", session_id),
        Some(json!({ "sender_id": 99, "content": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "NotParticipant");

    // 结束是幂等的：两次都 200，原因一致
    let (status, body) = request(
        &router,
        "POST",
        &format!("/sessions/{}/end", session_id),
        Some(json!({ "by": 1, "reason": "user_left" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ended"], true);
    assert_eq!(body["reason"], "user_left");

    let (status, body) = request(
        &router,
        "POST",
        &format!("/sessions/{}/end", session_id),
        Some(json!({ "by": 2, "reason": "normal_close" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reason"], "user_left");

    // 结束后发消息 409
    let (status, _) = request(
        &router,
        "POST",
        &format!("/sessions/{}/messages", session_id),
        Some(json!({ "sender_id": 1, "content": "anyone?" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_report_is_accepted() {
    let router = test_router();
    let session_id = matched_session(&router).await;

    let (status, body) = request(
        &router,
        "POST",
        "/reports",
        Some(json!({
            "session_id": session_id,
            "reporter_id": 1,
            "reported_id": 2,
            "category": "harassment",
            "reason": "abusive messages",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["accepted"], true);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let router = test_router();

    let (status, body) = request(
        &router,
        "POST",
        "/sessions/00000000-0000-0000-0000-000000000000/end",
        Some(json!({ "by": 1, "reason": "user_left" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "SessionNotFound");
}

#[tokio::test]
async fn test_health_endpoint() {
    let router = test_router();

    let (status, _) = request(&router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}
