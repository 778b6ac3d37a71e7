use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, ServerError};
use crate::model::BlockReason;

/// 外部评分判定
#[derive(Debug, Clone, Copy)]
pub struct ScoreVerdict {
    /// 是否标记为违规
    pub flagged: bool,
    /// 标记时的拦截原因
    pub reason: Option<BlockReason>,
}

/// 外部内容评分服务
///
/// 规则引擎（规则 1-4）之后的严格增量精修：只能把 allow 收紧为 block，
/// 永远不会推翻规则引擎已给出的拦截
#[async_trait::async_trait]
pub trait ExternalScorer: Send + Sync + 'static {
    /// 对文本评分；调用失败返回 ModerationUnavailable，由调用方回退到规则判定
    async fn score(&self, text: &str) -> Result<ScoreVerdict>;
}

/// HTTP 评分服务客户端
pub struct HttpScorer {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct ScoreRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct ScoreResponse {
    flagged: bool,
    category: Option<String>,
}

impl HttpScorer {
    /// 创建评分客户端（超时是硬上限，超时即回退）
    pub fn new(endpoint: String, timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| ServerError::Configuration(format!("scorer client: {}", e)))?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait::async_trait]
impl ExternalScorer for HttpScorer {
    async fn score(&self, text: &str) -> Result<ScoreVerdict> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ScoreRequest { text })
            .send()
            .await
            .map_err(|e| ServerError::ModerationUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServerError::ModerationUnavailable(format!(
                "scorer returned {}",
                response.status()
            )));
        }

        let body: ScoreResponse = response
            .json()
            .await
            .map_err(|e| ServerError::ModerationUnavailable(e.to_string()))?;

        let reason = if body.flagged {
            Some(match body.category.as_deref() {
                Some("profanity") => BlockReason::Profanity,
                // 评分服务的其余类别统一归入骚扰
                _ => BlockReason::Harassment,
            })
        } else {
            None
        };

        Ok(ScoreVerdict {
            flagged: body.flagged,
            reason,
        })
    }
}
