//! 比赛数据源
//!
//! 返回最近的比赛记录，按时间从新到旧排序。

pub mod henrik;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::entities::MatchRecord;
use crate::error::{LeaderboardSyncError, Result};

pub use henrik::{HenrikFeedClient, HenrikFeedConfig};

/// 比赛数据源
#[async_trait]
pub trait MatchFeedSource: Send + Sync {
    /// 最近的比赛，从新到旧
    async fn fetch_recent(&self) -> Result<Vec<MatchRecord>>;
}

/// 固定内容的数据源（测试 / 演练用）
#[derive(Debug, Default)]
pub struct StaticFeed {
    matches: Mutex<Vec<MatchRecord>>,
    failure: Mutex<Option<String>>,
}

impl StaticFeed {
    pub fn new(matches: Vec<MatchRecord>) -> Self {
        Self {
            matches: Mutex::new(matches),
            failure: Mutex::new(None),
        }
    }

    /// 替换返回的比赛列表
    pub fn set_matches(&self, matches: Vec<MatchRecord>) {
        *self.matches.lock() = matches;
    }

    /// 之后的拉取返回瞬时错误
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.lock() = Some(reason.into());
    }
}

#[async_trait]
impl MatchFeedSource for StaticFeed {
    async fn fetch_recent(&self) -> Result<Vec<MatchRecord>> {
        if let Some(reason) = self.failure.lock().clone() {
            return Err(LeaderboardSyncError::Transient(reason));
        }
        Ok(self.matches.lock().clone())
    }
}
