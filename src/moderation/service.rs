use std::sync::Arc;
use tracing::warn;

use crate::model::ModerationOutcome;
use super::gate::ModerationGate;
use super::scorer::ExternalScorer;

/// 中央审核服务
///
/// 规则引擎恒定先行；外部评分只在规则放行后追加执行。
/// 评分服务出错或超时时回退到规则判定：失败路径永远不会
/// 放过一条未经规则 1-4 检查的消息。
pub struct ModerationService {
    gate: ModerationGate,
    scorer: Option<Arc<dyn ExternalScorer>>,
}

impl ModerationService {
    pub fn new(gate: ModerationGate, scorer: Option<Arc<dyn ExternalScorer>>) -> Self {
        Self { gate, scorer }
    }

    /// 仅规则引擎（无外部评分）
    pub fn rules_only(gate: ModerationGate) -> Self {
        Self::new(gate, None)
    }

    /// 分类消息文本
    ///
    /// 返回的判定对同一输入是确定的（规则部分）；外部评分只会把
    /// allow 收紧为 block
    pub async fn classify(&self, text: &str) -> ModerationOutcome {
        let outcome = self.gate.classify(text);

        // 规则已拦截：评分服务没有发言权
        if !outcome.is_allow() {
            return outcome;
        }

        let Some(scorer) = &self.scorer else {
            return outcome;
        };

        match scorer.score(text).await {
            Ok(verdict) if verdict.flagged => {
                // reason 缺失时保守归入骚扰
                ModerationOutcome::block(
                    verdict
                        .reason
                        .unwrap_or(crate::model::BlockReason::Harassment),
                )
            }
            Ok(_) => outcome,
            Err(e) => {
                // 回退到规则判定（此处是 allow）
                warn!("⚠️ 外部评分服务不可用，回退规则判定: {}", e);
                crate::infra::metrics::record_scorer_fallback();
                outcome
            }
        }
    }
}
