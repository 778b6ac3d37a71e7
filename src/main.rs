use anyhow::{Context, Result};
use pairchat::{
    cli::Cli,
    config::{self, ServerConfig},
    logging, PairchatServer,
};
use std::fs;
use std::process;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载 .env 文件（如果存在）
    let _ = dotenvy::dotenv();

    // 解析命令行参数
    let cli = Cli::parse();

    // 处理子命令
    if let Some(command) = &cli.command {
        match command {
            pairchat::cli::Commands::GenerateConfig { path } => {
                return generate_config(path);
            }
            pairchat::cli::Commands::ValidateConfig { path } => {
                return validate_config(path);
            }
            pairchat::cli::Commands::ShowConfig => {
                return show_config(&cli);
            }
        }
    }

    // 快速读取 config.toml 的 [logging] 段（不加载完整配置）
    let early_log = config::load_early_logging_config(cli.config_file.as_deref());

    // 合并日志配置（优先级：CLI > config.toml > 默认值）
    let log_level = cli
        .get_log_level()
        .or(early_log.level)
        .unwrap_or_else(|| "info".to_string());
    let log_format = cli.get_log_format().or(early_log.format);

    logging::init_logging(&log_level, log_format.as_deref(), cli.quiet)?;

    tracing::info!("🚀 Pairchat Server starting...");

    // 加载配置（按优先级：命令行 > 环境变量 > 配置文件 > 默认值）
    let config = ServerConfig::load(&cli).context("加载配置失败")?;

    if cli.dev {
        tracing::info!("🔧 开发模式已启用");
    }

    // 显示配置信息
    tracing::info!("📊 Server Configuration:");
    tracing::info!("  - Listen: {}:{}", config.host, config.port);
    tracing::info!("  - Match Tick: {}s", config.queue.tick_interval_secs);
    tracing::info!("  - Queue Entry TTL: {}s", config.queue.entry_ttl_secs);
    tracing::info!("  - Cross-Tier Weight: {}", config.queue.cross_tier_weight);
    tracing::info!("  - Ack Window: {}s", config.session.ack_window_secs);
    tracing::info!(
        "  - External Scorer: {}",
        config.moderation.scorer_url.as_deref().unwrap_or("disabled")
    );
    tracing::info!("  - Metrics: {}", config.enable_metrics);
    tracing::info!("  - Log Level: {}", config.log_level);

    // 创建服务器
    let server = match PairchatServer::new(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("❌ 服务器初始化失败: {}", e);
            tracing::error!("💡 请检查配置后重试");
            process::exit(1);
        }
    };

    // 运行服务器
    if let Err(e) = server.run().await {
        tracing::error!("❌ 服务器运行失败: {}", e);
        tracing::error!("💡 服务器将退出");
        process::exit(1);
    }

    Ok(())
}

/// 生成默认配置文件
fn generate_config(path: &str) -> Result<()> {
    let default_config = r#"# Pairchat Server 配置文件
# 此文件由 pairchat generate-config 生成

[server]
host = "127.0.0.1"
port = 8080
enable_metrics = true

[queue]
tick_interval_secs = 3
entry_ttl_secs = 120
cross_tier_weight = 0.5

[session]
ack_window_secs = 15
max_message_chars = 2000
violation_ttl_secs = 3600

[moderation]
# scorer_url = "http://localhost:9100/score"
scorer_timeout_ms = 500
extra_profanity = []
extra_harassment = []

[fanout]
channel_capacity = 256

[logging]
level = "info"
format = "compact"
"#;

    fs::write(path, default_config).with_context(|| format!("无法写入配置文件: {}", path))?;

    println!("✅ 配置文件已生成: {}", path);
    Ok(())
}

/// 验证配置文件
fn validate_config(path: &str) -> Result<()> {
    let config = ServerConfig::from_toml_file(path)
        .with_context(|| format!("配置文件验证失败: {}", path))?;
    config.validate()?;

    println!("✅ 配置文件有效: {}", path);
    println!("📊 配置摘要:");
    println!("  - Listen: {}:{}", config.host, config.port);
    println!("  - Match Tick: {}s", config.queue.tick_interval_secs);
    println!("  - Queue Entry TTL: {}s", config.queue.entry_ttl_secs);
    println!("  - Ack Window: {}s", config.session.ack_window_secs);

    Ok(())
}

/// 显示最终配置（合并后的配置）
fn show_config(cli: &Cli) -> Result<()> {
    // 初始化基本日志（用于显示配置）
    logging::init_logging("info", None, false)?;

    let config = ServerConfig::load(cli).context("加载配置失败")?;

    println!("📊 最终配置（合并后的配置）:");
    println!("{}", serde_json::to_string_pretty(&config)?);

    Ok(())
}
