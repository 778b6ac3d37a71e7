use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// 时钟抽象
///
/// 队列 TTL、会话确认窗口等到期判断全部经由 Clock 读取当前时间，
/// 测试中注入 ManualClock 即可直接驱动 tick，无需真实等待。
pub trait Clock: Send + Sync + 'static {
    /// 当前时间
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟（生产环境）
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手动时钟（测试用）
///
/// 通过 advance() 推进时间，配合调度器的 tick() 实现确定性测试
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// 以指定起始时间创建
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// 从当前系统时间创建
    pub fn from_system() -> Self {
        Self::new(Utc::now())
    }

    /// 推进时间
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock();
        *now += delta;
    }

    /// 推进指定秒数
    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
