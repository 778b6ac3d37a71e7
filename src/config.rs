use std::env;
use std::fs;
use std::path::Path;
use tracing::info;
use serde::{Deserialize, Serialize};
use anyhow::{Result, Context};

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 服务器监听地址
    pub host: String,
    /// HTTP API 端口
    pub port: u16,
    /// 日志级别
    pub log_level: String,
    /// 是否启用 Prometheus 指标
    pub enable_metrics: bool,
    /// 匹配队列配置
    pub queue: QueueConfig,
    /// 会话配置
    pub session: SessionConfig,
    /// 审核配置
    pub moderation: ModerationConfig,
    /// 事件分发配置
    pub fanout: FanoutConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            enable_metrics: true,
            queue: QueueConfig::default(),
            session: SessionConfig::default(),
            moderation: ModerationConfig::default(),
            fanout: FanoutConfig::default(),
        }
    }
}

impl ServerConfig {
    /// 创建新的服务器配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 高流量部署配置（更密的 tick、更大的通道容量）
    pub fn for_high_traffic() -> Self {
        Self {
            queue: QueueConfig {
                tick_interval_secs: 2,
                ..QueueConfig::default()
            },
            fanout: FanoutConfig {
                channel_capacity: 1024,
            },
            ..Self::default()
        }
    }

    /// 从 TOML 文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("无法读取配置文件: {:?}", path.as_ref()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| "配置文件格式错误")?;

        Ok(toml_config.into())
    }

    /// 从环境变量加载配置（PAIRCHAT_ 前缀）
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(host) = env::var("PAIRCHAT_HOST") {
            self.host = host;
        }
        if let Ok(port) = env::var("PAIRCHAT_PORT") {
            self.port = port.parse().unwrap_or(self.port);
        }
        if let Ok(log_level) = env::var("PAIRCHAT_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(tick) = env::var("PAIRCHAT_MATCH_TICK_SECS") {
            self.queue.tick_interval_secs = tick.parse().unwrap_or(self.queue.tick_interval_secs);
        }
        if let Ok(ttl) = env::var("PAIRCHAT_QUEUE_TTL_SECS") {
            self.queue.entry_ttl_secs = ttl.parse().unwrap_or(self.queue.entry_ttl_secs);
        }
        if let Ok(window) = env::var("PAIRCHAT_ACK_WINDOW_SECS") {
            self.session.ack_window_secs = window.parse().unwrap_or(self.session.ack_window_secs);
        }
        if let Ok(url) = env::var("PAIRCHAT_SCORER_URL") {
            self.moderation.scorer_url = Some(url);
        }

        Ok(())
    }

    /// 从命令行参数合并配置
    pub fn merge_from_cli(&mut self, cli: &crate::cli::Cli) {
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(tick) = cli.match_tick_secs {
            self.queue.tick_interval_secs = tick;
        }
        if let Some(ttl) = cli.queue_ttl_secs {
            self.queue.entry_ttl_secs = ttl;
        }
        if cli.enable_metrics {
            self.enable_metrics = true;
        }
        if let Some(log_level) = cli.get_log_level() {
            self.log_level = log_level;
        }
    }

    /// 加载配置（按优先级：命令行 > 环境变量 > 配置文件 > 默认值）
    pub fn load(cli: &crate::cli::Cli) -> Result<Self> {
        // 1. 从默认配置开始
        let mut config = Self::new();

        // 2. 从配置文件加载（如果指定）
        if let Some(config_file) = &cli.config_file {
            if Path::new(config_file).exists() {
                info!("📄 从配置文件加载: {}", config_file);
                config = Self::from_toml_file(config_file)?;
            } else {
                tracing::warn!("⚠️ 配置文件不存在: {}", config_file);
            }
        } else if Path::new("config.toml").exists() {
            // 尝试加载默认配置文件
            info!("📄 从默认配置文件加载: config.toml");
            config = Self::from_toml_file("config.toml")?;
        }

        // 3. 从环境变量合并（优先级高于配置文件）
        config.merge_from_env()?;

        // 4. 从命令行参数合并（最高优先级）
        config.merge_from_cli(cli);

        config.validate()?;
        Ok(config)
    }

    /// 配置合法性检查
    pub fn validate(&self) -> Result<()> {
        if self.queue.tick_interval_secs == 0 {
            anyhow::bail!("queue.tick_interval_secs 必须大于 0");
        }
        if self.queue.entry_ttl_secs < self.queue.tick_interval_secs {
            anyhow::bail!("queue.entry_ttl_secs 不能小于 tick 间隔");
        }
        if !(0.0..=1.0).contains(&self.queue.cross_tier_weight) {
            anyhow::bail!("queue.cross_tier_weight 必须在 [0, 1] 区间内");
        }
        if self.session.ack_window_secs == 0 {
            anyhow::bail!("session.ack_window_secs 必须大于 0");
        }
        Ok(())
    }
}

/// 匹配队列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// 匹配 tick 间隔（秒）
    pub tick_interval_secs: u64,
    /// 队列条目 TTL（秒），过期驱逐并通知 queue_timeout
    pub entry_ttl_secs: u64,
    /// 跨等级配对权重（同级恒为 1.0）
    pub cross_tier_weight: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 3,
            entry_ttl_secs: 120,
            cross_tier_weight: 0.5,
        }
    }
}

/// 会话配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 确认窗口（秒）：pending 会话超过该窗口未被双方确认则以 timeout 结束
    pub ack_window_secs: u64,
    /// 单条消息最大长度（字符）
    pub max_message_chars: usize,
    /// 违规计数保留时长（秒），到期由调度器清理
    pub violation_ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ack_window_secs: 15,
            max_message_chars: 2000,
            violation_ttl_secs: 3600,
        }
    }
}

/// 审核配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// 外部评分服务地址（为空则只用规则引擎）
    pub scorer_url: Option<String>,
    /// 评分调用超时（毫秒）
    pub scorer_timeout_ms: u64,
    /// 追加的脏话词条
    pub extra_profanity: Vec<String>,
    /// 追加的骚扰词条
    pub extra_harassment: Vec<String>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            scorer_url: None,
            scorer_timeout_ms: 500,
            extra_profanity: vec![],
            extra_harassment: vec![],
        }
    }
}

/// 事件分发配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// 每主题通道容量
    pub channel_capacity: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// TOML 配置文件结构（用于反序列化）
#[derive(Debug, Deserialize)]
struct TomlConfig {
    server: Option<TomlServerConfig>,
    queue: Option<TomlQueueConfig>,
    session: Option<TomlSessionConfig>,
    moderation: Option<TomlModerationConfig>,
    fanout: Option<TomlFanoutConfig>,
    logging: Option<TomlLoggingConfig>,
}

#[derive(Debug, Deserialize)]
struct TomlServerConfig {
    host: Option<String>,
    port: Option<u16>,
    enable_metrics: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TomlQueueConfig {
    tick_interval_secs: Option<u64>,
    entry_ttl_secs: Option<u64>,
    cross_tier_weight: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TomlSessionConfig {
    ack_window_secs: Option<u64>,
    max_message_chars: Option<usize>,
    violation_ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TomlModerationConfig {
    scorer_url: Option<String>,
    scorer_timeout_ms: Option<u64>,
    extra_profanity: Option<Vec<String>>,
    extra_harassment: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct TomlFanoutConfig {
    channel_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct TomlLoggingConfig {
    level: Option<String>,
    format: Option<String>,
}

/// 启动早期读取的日志配置（完整配置加载前使用）
#[derive(Debug, Default)]
pub struct EarlyLoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
}

/// 快速读取 config.toml 的 [logging] 段（不加载完整配置）
pub fn load_early_logging_config(config_file: Option<&str>) -> EarlyLoggingConfig {
    let path = config_file.unwrap_or("config.toml");
    if !Path::new(path).exists() {
        return EarlyLoggingConfig::default();
    }

    let Ok(content) = fs::read_to_string(path) else {
        return EarlyLoggingConfig::default();
    };
    let Ok(parsed) = toml::from_str::<TomlConfig>(&content) else {
        return EarlyLoggingConfig::default();
    };

    match parsed.logging {
        Some(logging) => EarlyLoggingConfig {
            level: logging.level,
            format: logging.format,
        },
        None => EarlyLoggingConfig::default(),
    }
}

impl From<TomlConfig> for ServerConfig {
    fn from(toml: TomlConfig) -> Self {
        let mut config = Self::default();

        if let Some(server) = toml.server {
            if let Some(host) = server.host {
                config.host = host;
            }
            if let Some(port) = server.port {
                config.port = port;
            }
            if let Some(enable) = server.enable_metrics {
                config.enable_metrics = enable;
            }
        }

        if let Some(queue) = toml.queue {
            if let Some(tick) = queue.tick_interval_secs {
                config.queue.tick_interval_secs = tick;
            }
            if let Some(ttl) = queue.entry_ttl_secs {
                config.queue.entry_ttl_secs = ttl;
            }
            if let Some(weight) = queue.cross_tier_weight {
                config.queue.cross_tier_weight = weight;
            }
        }

        if let Some(session) = toml.session {
            if let Some(window) = session.ack_window_secs {
                config.session.ack_window_secs = window;
            }
            if let Some(max_chars) = session.max_message_chars {
                config.session.max_message_chars = max_chars;
            }
            if let Some(ttl) = session.violation_ttl_secs {
                config.session.violation_ttl_secs = ttl;
            }
        }

        if let Some(moderation) = toml.moderation {
            if let Some(url) = moderation.scorer_url {
                config.moderation.scorer_url = Some(url);
            }
            if let Some(timeout) = moderation.scorer_timeout_ms {
                config.moderation.scorer_timeout_ms = timeout;
            }
            if let Some(terms) = moderation.extra_profanity {
                config.moderation.extra_profanity = terms;
            }
            if let Some(terms) = moderation.extra_harassment {
                config.moderation.extra_harassment = terms;
            }
        }

        if let Some(fanout) = toml.fanout {
            if let Some(capacity) = fanout.channel_capacity {
                config.fanout.channel_capacity = capacity;
            }
        }

        if let Some(logging) = toml.logging {
            if let Some(level) = logging.level {
                config.log_level = level;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_toml_sections_override_defaults() {
        let toml_str = r#"
            [server]
            port = 9090

            [queue]
            tick_interval_secs = 5
            cross_tier_weight = 0.3

            [session]
            ack_window_secs = 30
        "#;
        let parsed: TomlConfig = toml::from_str(toml_str).unwrap();
        let config: ServerConfig = parsed.into();

        assert_eq!(config.port, 9090);
        assert_eq!(config.queue.tick_interval_secs, 5);
        assert!((config.queue.cross_tier_weight - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.session.ack_window_secs, 30);
        // 未覆盖的段保持默认
        assert_eq!(config.queue.entry_ttl_secs, 120);
    }

    #[test]
    fn test_validate_rejects_zero_tick() {
        let mut config = ServerConfig::default();
        config.queue.tick_interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
