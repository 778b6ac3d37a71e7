//! HTTP 服务器 - 使用 Axum 提供 API 与 SSE 事件流

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::clock::Clock;
use crate::fanout::FanoutHub;
use crate::http::routes;
use crate::model::IdentityResolver;
use crate::queue::{Matchmaker, QueueManager};
use crate::session::SessionCoordinator;

/// HTTP 服务器共享状态
#[derive(Clone)]
pub struct HttpServerState {
    pub queue: Arc<QueueManager>,
    pub matchmaker: Arc<Matchmaker>,
    pub sessions: Arc<SessionCoordinator>,
    pub resolver: Arc<dyn IdentityResolver>,
    pub fanout: Arc<FanoutHub>,
    pub clock: Arc<dyn Clock>,
}

/// API HTTP 服务器
pub struct ApiHttpServer {
    state: HttpServerState,
    host: String,
    port: u16,
}

impl ApiHttpServer {
    /// 创建新的 HTTP 服务器
    pub fn new(state: HttpServerState, host: String, port: u16) -> Self {
        Self { state, host, port }
    }

    /// 构建路由（测试可直接拿 Router 走 tower::Service）
    pub fn router(&self) -> Router {
        Router::new()
            .merge(routes::create_routes())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// 启动 HTTP 服务器
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = self.router();

        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!("🌐 HTTP API 服务器启动在 {}", addr);

        axum::serve(listener, app).await?;

        Ok(())
    }
}
