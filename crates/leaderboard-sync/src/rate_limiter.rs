//! 读取节流
//!
//! 外部存储对读取有速率限制。回填 / 全量加载比赛文件时逐个串行读取，
//! 两次读取之间至少间隔固定时间。这里只做节流，不做重试。

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// 固定间隔读取节流器
#[derive(Debug)]
pub struct ReadPacer {
    /// 两次读取之间的最小间隔
    min_interval: Duration,
    /// 上次读取时间
    last_read: Mutex<Option<Instant>>,
    /// 累计等待次数
    waits: Mutex<u64>,
}

impl ReadPacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_read: Mutex::new(None),
            waits: Mutex::new(0),
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// 不节流（测试 / 本地存储）
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// 距离上次读取不足间隔时等待，然后记录本次读取
    pub async fn pace(&self) {
        let wait = {
            let last = self.last_read.lock();
            last.map(|t| self.min_interval.saturating_sub(t.elapsed()))
                .unwrap_or(Duration::ZERO)
        };

        if !wait.is_zero() {
            debug!("读取节流: 等待 {:?}", wait);
            *self.waits.lock() += 1;
            tokio::time::sleep(wait).await;
        }

        *self.last_read.lock() = Some(Instant::now());
    }

    /// 重置：下次读取不等待
    pub fn reset(&self) {
        *self.last_read.lock() = None;
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn wait_count(&self) -> u64 {
        *self.waits.lock()
    }
}
