//! Prometheus 指标：队列深度、匹配量、消息接受/拦截量、驱逐量等
//!
//! 通过 `init()` 安装全局 Recorder，通过 HTTP GET `/metrics` 暴露抓取端点。

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::OnceLock;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// 指标名称
const COUNTER_QUEUE_JOINS: &str = "pairchat_queue_joins_total";
const COUNTER_MATCHES: &str = "pairchat_matches_total";
const COUNTER_QUEUE_EVICTIONS: &str = "pairchat_queue_evictions_total";
const COUNTER_MESSAGES_ACCEPTED: &str = "pairchat_messages_accepted_total";
const COUNTER_MESSAGES_REJECTED: &str = "pairchat_messages_rejected_total";
const COUNTER_SESSIONS_ENDED: &str = "pairchat_sessions_ended_total";
const COUNTER_REPORTS: &str = "pairchat_reports_total";
const COUNTER_FANOUT_LAGGED: &str = "pairchat_fanout_lagged_total";
const COUNTER_SCORER_FALLBACK: &str = "pairchat_scorer_fallback_total";
const GAUGE_QUEUE_DEPTH: &str = "pairchat_queue_depth";
const GAUGE_SESSIONS_ACTIVE: &str = "pairchat_sessions_active";
const GAUGE_FANOUT_TOPICS: &str = "pairchat_fanout_topics";

/// 初始化 Prometheus 指标（安装全局 Recorder，返回 Handle 用于 HTTP 暴露）。
/// 仅需在进程内调用一次；重复调用会返回 Err。
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    HANDLE
        .set(handle)
        .map_err(|_| "metrics already initialized")?;
    Ok(())
}

/// 是否已初始化（可供 /metrics 使用）
pub fn is_initialized() -> bool {
    HANDLE.get().is_some()
}

/// 渲染当前指标为 Prometheus 文本格式，供 GET /metrics 使用。
pub fn render_metrics() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

/// 记录一次入队。
pub fn record_queue_join() {
    metrics::counter!(COUNTER_QUEUE_JOINS).increment(1);
}

/// 记录一次匹配成功（两个条目 -> 一个会话）。
pub fn record_match_committed() {
    metrics::counter!(COUNTER_MATCHES).increment(1);
}

/// 记录 TTL 驱逐的队列条目数。
pub fn record_queue_evictions(count: u64) {
    metrics::counter!(COUNTER_QUEUE_EVICTIONS).increment(count);
}

/// 记录一条消息通过审核并投递。
pub fn record_message_accepted() {
    metrics::counter!(COUNTER_MESSAGES_ACCEPTED).increment(1);
}

/// 记录一条消息被审核门拦截（按原因分标签）。
pub fn record_message_rejected(reason: &str) {
    metrics::counter!(COUNTER_MESSAGES_REJECTED, "reason" => reason.to_string()).increment(1);
}

/// 记录一次会话结束（按原因分标签）。
pub fn record_session_ended(reason: &str) {
    metrics::counter!(COUNTER_SESSIONS_ENDED, "reason" => reason.to_string()).increment(1);
}

/// 记录一次举报提交。
pub fn record_report_submitted() {
    metrics::counter!(COUNTER_REPORTS).increment(1);
}

/// 记录 fanout 慢消费者被挤掉的事件数（Counter）。
pub fn record_fanout_lagged(count: u64) {
    metrics::counter!(COUNTER_FANOUT_LAGGED).increment(count);
}

/// 记录一次外部评分回退。
pub fn record_scorer_fallback() {
    metrics::counter!(COUNTER_SCORER_FALLBACK).increment(1);
}

/// 更新当前队列深度（Gauge）。由调度器 tick 周期调用。
pub fn record_queue_depth(depth: usize) {
    metrics::gauge!(GAUGE_QUEUE_DEPTH).set(depth as f64);
}

/// 更新当前活跃会话数（Gauge）。
pub fn record_active_sessions(count: usize) {
    metrics::gauge!(GAUGE_SESSIONS_ACTIVE).set(count as f64);
}

/// 更新当前 fanout 主题数（Gauge）。
pub fn record_fanout_topics(count: usize) {
    metrics::gauge!(GAUGE_FANOUT_TOPICS).set(count as f64);
}
