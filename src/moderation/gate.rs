use std::collections::HashSet;
use lazy_static::lazy_static;
use url::Url;

use crate::model::{BlockReason, ModerationOutcome};

lazy_static! {
    /// 常见顶级域（裸域名检测用）
    static ref COMMON_TLDS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        for tld in [
            "com", "net", "org", "io", "co", "me", "gg", "tv", "app", "dev",
            "xyz", "info", "biz", "online", "site", "club", "live", "chat",
            "link", "ru", "cn", "uk", "de", "fr", "jp", "br", "in", "us",
        ] {
            s.insert(tld);
        }
        s
    };

    /// 默认脏话词表（大小写不敏感子串匹配）
    static ref PROFANITY_TERMS: Vec<&'static str> = vec![
        "fuck", "shit", "bitch", "asshole", "bastard", "cunt", "dick",
        "slut", "whore", "faggot", "nigger",
    ];

    /// 默认骚扰词表
    static ref HARASSMENT_TERMS: Vec<&'static str> = vec![
        "kill yourself", "kys", "go die", "hang yourself", "nobody loves you",
        "you should die", "end yourself", "drink bleach",
    ];
}

/// 审核门
///
/// 纯函数式规则引擎：classify 同步、无副作用、确定性。
/// 管线按固定顺序求值（廉价/高置信度的检查在前），首个命中即返回：
/// 1. URL / 链接
/// 2. 联系方式（电话号码、邮箱）
/// 3. 脏话词表
/// 4. 骚扰词表
/// 5. 放行
pub struct ModerationGate {
    /// 脏话词表（默认 + 配置追加，已全部小写）
    profanity: Vec<String>,
    /// 骚扰词表（默认 + 配置追加，已全部小写）
    harassment: Vec<String>,
}

impl Default for ModerationGate {
    fn default() -> Self {
        Self::new(&[], &[])
    }
}

impl ModerationGate {
    /// 创建审核门，extra_* 为配置追加的词条
    pub fn new(extra_profanity: &[String], extra_harassment: &[String]) -> Self {
        let profanity = PROFANITY_TERMS
            .iter()
            .map(|t| t.to_string())
            .chain(extra_profanity.iter().map(|t| t.to_lowercase()))
            .collect();
        let harassment = HARASSMENT_TERMS
            .iter()
            .map(|t| t.to_string())
            .chain(extra_harassment.iter().map(|t| t.to_lowercase()))
            .collect();

        Self {
            profanity,
            harassment,
        }
    }

    /// 分类消息文本
    pub fn classify(&self, text: &str) -> ModerationOutcome {
        // 1. 链接
        if contains_link(text) {
            return ModerationOutcome::block(BlockReason::LinksNotAllowed);
        }

        // 2. 联系方式：先电话后邮箱
        if contains_phone_number(text) {
            return ModerationOutcome::block(BlockReason::PhoneNumber);
        }
        if contains_email(text) {
            return ModerationOutcome::block(BlockReason::EmailAddress);
        }

        let lowered = text.to_lowercase();

        // 3. 脏话
        if self.profanity.iter().any(|t| lowered.contains(t.as_str())) {
            return ModerationOutcome::block(BlockReason::Profanity);
        }

        // 4. 骚扰
        if self.harassment.iter().any(|t| lowered.contains(t.as_str())) {
            return ModerationOutcome::block(BlockReason::Harassment);
        }

        // 5. 放行
        ModerationOutcome::allow()
    }
}

/// 链接检测：带 scheme 的 URL、www. 前缀、常见 TLD 的裸域名
fn contains_link(text: &str) -> bool {
    for raw in text.split_whitespace() {
        let token = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != ':' && c != '/');

        if token.contains("://") && Url::parse(token).is_ok() {
            return true;
        }

        let lowered = token.to_lowercase();
        if lowered.starts_with("www.") && lowered.len() > 4 {
            return true;
        }

        if is_bare_domain(&lowered) {
            return true;
        }
    }
    false
}

/// 裸域名：形如 example.com，各标签为字母数字/连字符，末标签是常见 TLD
fn is_bare_domain(token: &str) -> bool {
    if token.contains('@') || !token.contains('.') {
        return false;
    }

    let labels: Vec<&str> = token.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let tld = labels[labels.len() - 1];
    if !COMMON_TLDS.contains(tld) {
        return false;
    }

    labels[..labels.len() - 1].iter().all(|label| {
        !label.is_empty()
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// 电话号码：数字串长度 >= 10
///
/// 号码内部常见的 -.() 分隔符不重置计数；空格会重置，
/// 否则 "2024 2025 2026" 这类年份序列会被误判
fn contains_phone_number(text: &str) -> bool {
    let mut run = 0usize;
    for c in text.chars() {
        if c.is_ascii_digit() {
            run += 1;
            if run >= 10 {
                return true;
            }
        } else if matches!(c, '-' | '.' | '(' | ')') {
            // 分隔符不重置数字串
        } else {
            run = 0;
        }
    }
    false
}

/// 邮箱地址：local@domain 且 domain 含点号
fn contains_email(text: &str) -> bool {
    for raw in text.split_whitespace() {
        let token = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '@' && c != '.');
        let mut parts = token.splitn(2, '@');
        let (Some(local), Some(domain)) = (parts.next(), parts.next()) else {
            continue;
        };
        if local.is_empty() || domain.is_empty() {
            continue;
        }
        if domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
            && domain.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModerationVerdict;

    #[test]
    fn test_classify_link_with_scheme() {
        let gate = ModerationGate::default();
        let outcome = gate.classify("visit http://x.com");
        assert_eq!(outcome.reason, Some(BlockReason::LinksNotAllowed));
    }

    #[test]
    fn test_classify_bare_domain() {
        let gate = ModerationGate::default();
        assert_eq!(
            gate.classify("check out example.com please").reason,
            Some(BlockReason::LinksNotAllowed)
        );
        assert_eq!(
            gate.classify("www.example.org").reason,
            Some(BlockReason::LinksNotAllowed)
        );
    }

    #[test]
    fn test_classify_phone_number() {
        let gate = ModerationGate::default();
        assert_eq!(
            gate.classify("call me at 5551234567").reason,
            Some(BlockReason::PhoneNumber)
        );
        // 分隔符不中断数字串
        assert_eq!(
            gate.classify("call 555-123-4567").reason,
            Some(BlockReason::PhoneNumber)
        );
        // 9 位数字放行
        assert!(gate.classify("lucky number 123456789").is_allow());
        // 空格隔开的年份不是电话号码
        assert!(gate.classify("from 2024 2025 2026 onwards").is_allow());
    }

    #[test]
    fn test_classify_email() {
        let gate = ModerationGate::default();
        assert_eq!(
            gate.classify("mail me someone@example.com").reason,
            Some(BlockReason::EmailAddress)
        );
    }

    #[test]
    fn test_classify_profanity_case_insensitive() {
        let gate = ModerationGate::default();
        assert_eq!(
            gate.classify("well FUCK that").reason,
            Some(BlockReason::Profanity)
        );
    }

    #[test]
    fn test_classify_harassment() {
        let gate = ModerationGate::default();
        assert_eq!(
            gate.classify("just go die already").reason,
            Some(BlockReason::Harassment)
        );
    }

    #[test]
    fn test_classify_allows_plain_text() {
        let gate = ModerationGate::default();
        let outcome = gate.classify("hello there");
        assert_eq!(outcome.verdict, ModerationVerdict::Allow);
        assert_eq!(outcome.reason, None);
    }

    #[test]
    fn test_pipeline_order_is_fixed() {
        let gate = ModerationGate::default();
        // 同时命中链接和脏话时，链接规则在前，原因必须是 links_not_allowed
        let outcome = gate.classify("fuck http://x.com");
        assert_eq!(outcome.reason, Some(BlockReason::LinksNotAllowed));
    }

    #[test]
    fn test_extra_terms_from_config() {
        let gate = ModerationGate::new(&["Blorbo".to_string()], &[]);
        assert_eq!(
            gate.classify("what a blorbo").reason,
            Some(BlockReason::Profanity)
        );
    }

    #[test]
    fn test_email_not_matched_as_link() {
        let gate = ModerationGate::default();
        // 带 @ 的 token 不算裸域名，落到邮箱规则
        assert_eq!(
            gate.classify("ping me a@b.com").reason,
            Some(BlockReason::EmailAddress)
        );
    }
}
