use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// 服务等级
///
/// 影响匹配兼容度权重（同级 1.0，跨级按配置降权），不做排除
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Student,
    Premium,
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Free
    }
}

/// 参与者身份（外部身份系统的只读视图）
///
/// 核心按值持有，从不直接修改；封禁状态的翻转由外部系统完成，
/// 核心只负责观察（见调度器的封禁巡检）。
/// guest / registered 在能力面上一致，只在 tier / 封禁策略处区分。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Identity {
    /// 匿名访客（外部 guest-provisioning 下发）
    Guest {
        id: u64,
        #[serde(default)]
        tier: Tier,
        #[serde(default)]
        banned: bool,
    },
    /// 注册用户
    Registered {
        id: u64,
        #[serde(default)]
        tier: Tier,
        #[serde(default)]
        banned: bool,
    },
}

impl Identity {
    /// 身份 ID
    pub fn id(&self) -> u64 {
        match self {
            Identity::Guest { id, .. } | Identity::Registered { id, .. } => *id,
        }
    }

    /// 服务等级
    pub fn tier(&self) -> Tier {
        match self {
            Identity::Guest { tier, .. } | Identity::Registered { tier, .. } => *tier,
        }
    }

    /// 是否被封禁
    pub fn banned(&self) -> bool {
        match self {
            Identity::Guest { banned, .. } | Identity::Registered { banned, .. } => *banned,
        }
    }

    /// 返回翻转了封禁位的副本（解析器内部使用）
    fn with_banned(&self, banned: bool) -> Identity {
        match self {
            Identity::Guest { id, tier, .. } => Identity::Guest {
                id: *id,
                tier: *tier,
                banned,
            },
            Identity::Registered { id, tier, .. } => Identity::Registered {
                id: *id,
                tier: *tier,
                banned,
            },
        }
    }
}

/// 身份解析器（外部边界）
///
/// 把调用方携带的身份凭据解析为 Identity。认证本身在系统之外，
/// 核心只消费解析结果；封禁巡检也经由此处观察封禁位。
#[async_trait::async_trait]
pub trait IdentityResolver: Send + Sync + 'static {
    /// 解析请求携带的身份声明
    async fn resolve(&self, claim: &Identity) -> Result<Identity>;

    /// 观察某身份当前是否被封禁
    async fn is_banned(&self, identity_id: u64) -> Result<bool>;
}

/// 进程内静态身份解析器
///
/// 独立部署与测试用：以请求声明为准建档，封禁位以本地登记表为准。
/// 生产集成时由外部身份系统的适配器替换。
#[derive(Default)]
pub struct StaticIdentityResolver {
    /// 已知身份登记表：identity_id -> Identity
    identities: DashMap<u64, Identity>,
}

impl StaticIdentityResolver {
    pub fn new() -> Self {
        Self {
            identities: DashMap::new(),
        }
    }

    /// 预登记身份（测试与演示）
    pub fn register(&self, identity: Identity) {
        self.identities.insert(identity.id(), identity);
    }

    /// 翻转封禁位（模拟外部 moderation-action 系统的动作）
    pub fn set_banned(&self, identity_id: u64, banned: bool) {
        if let Some(mut entry) = self.identities.get_mut(&identity_id) {
            let updated = entry.with_banned(banned);
            *entry = updated;
        }
    }
}

#[async_trait::async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn resolve(&self, claim: &Identity) -> Result<Identity> {
        if let Some(known) = self.identities.get(&claim.id()) {
            // 已登记：封禁位以登记表为准，tier 取声明值（外部系统会同步）
            return Ok(claim.with_banned(known.banned()));
        }

        // 未登记：按声明建档（guest-provisioning 的进程内替身）
        self.identities.insert(claim.id(), claim.clone());
        Ok(claim.clone())
    }

    async fn is_banned(&self, identity_id: u64) -> Result<bool> {
        Ok(self
            .identities
            .get(&identity_id)
            .map(|i| i.banned())
            .unwrap_or(false))
    }
}
