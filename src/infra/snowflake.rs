//! Snowflake ID 生成器
//!
//! 使用 snowflake-me 库生成全局唯一的、时间有序的消息ID：
//! 41位时间戳 + 5位数据中心ID + 5位机器ID + 12位序列号。
//! 消息按 ID 排序即按接受顺序排序，持久化与发布共用同一顺序。

use snowflake_me::Snowflake;
use std::sync::{Mutex, OnceLock};

/// 消息ID生成器（全局单例，线程安全）
static MESSAGE_ID_GENERATOR: OnceLock<Mutex<Snowflake>> = OnceLock::new();

/// 初始化消息ID生成器（线程安全，只初始化一次）
fn init_generator() -> &'static Mutex<Snowflake> {
    MESSAGE_ID_GENERATOR.get_or_init(|| {
        // 从环境变量读取配置，缺省单机部署取 1
        let data_center_id = std::env::var("SNOWFLAKE_DATA_CENTER_ID")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1u8);

        let machine_id = std::env::var("SNOWFLAKE_MACHINE_ID")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1u8);

        tracing::info!(
            "初始化 Snowflake ID 生成器: data_center_id={}, machine_id={}",
            data_center_id,
            machine_id
        );

        // 手动指定 machine_id 和 data_center_id，避免 IP 地址检测失败
        let snowflake = Snowflake::builder()
            .machine_id(&|| Ok(machine_id as u16))
            .data_center_id(&|| Ok(data_center_id as u16))
            .finalize()
            .expect("Failed to initialize Snowflake ID generator");

        Mutex::new(snowflake)
    })
}

/// 生成下一个消息ID（全局唯一、时间有序）
pub fn next_message_id() -> u64 {
    let generator = init_generator();
    let guard = generator.lock().expect("Snowflake generator lock poisoned");
    guard.next_id().expect("Failed to generate Snowflake ID")
}
