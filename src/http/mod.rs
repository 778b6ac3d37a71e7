//! HTTP 服务器模块 - 使用 Axum 提供 API 与实时事件流
//!
//! 功能包括：
//! - 匹配队列接口（join / leave / status）
//! - 会话接口（ack / messages / end）
//! - SSE 事件流（session 与 queue 主题）
//! - 举报提交
//! - Prometheus 指标

pub mod routes;
pub mod server;

pub use server::{ApiHttpServer, HttpServerState};
