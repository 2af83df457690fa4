//! 同步游标
//!
//! 从最新的比赛开始往后扫描，遇到游标对应的比赛即停止，之前的都是新比赛。
//!
//! 游标不在本次拉取的窗口内（游标为空，或者游标比赛已超出数据源保留范围）时，
//! 全部相关比赛都视为新比赛（`CursorNotFound`）。这样宁可重复处理，也不丢数据；
//! 重复处理的比赛文件内容相同，覆盖写入即可。

use tracing::{debug, info, warn};

use crate::entities::{MatchRecord, RosterDocument};
use crate::rate_limiter::ReadPacer;
use crate::store::DocumentStore;

/// 游标判定结果
#[derive(Debug, Clone, PartialEq)]
pub enum CursorDecision {
    /// 在窗口内找到游标，`position` 为游标比赛的下标
    CursorFound {
        new_matches: Vec<MatchRecord>,
        position: usize,
    },
    /// 游标不在窗口内，全部视为新比赛
    CursorNotFound { new_matches: Vec<MatchRecord> },
}

impl CursorDecision {
    pub fn new_matches(&self) -> &[MatchRecord] {
        match self {
            CursorDecision::CursorFound { new_matches, .. } => new_matches,
            CursorDecision::CursorNotFound { new_matches } => new_matches,
        }
    }

    pub fn into_new_matches(self) -> Vec<MatchRecord> {
        match self {
            CursorDecision::CursorFound { new_matches, .. } => new_matches,
            CursorDecision::CursorNotFound { new_matches } => new_matches,
        }
    }

    pub fn has_new_matches(&self) -> bool {
        !self.new_matches().is_empty()
    }

    /// 新的游标值：最新一场新比赛的 id
    pub fn newest_id(&self) -> Option<&str> {
        self.new_matches().first().map(MatchRecord::match_id)
    }

    pub fn cursor_found(&self) -> bool {
        matches!(self, CursorDecision::CursorFound { .. })
    }
}

/// 同步游标
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncCursor {
    newest_match_id: Option<String>,
}

impl SyncCursor {
    pub fn new(newest_match_id: Option<String>) -> Self {
        Self { newest_match_id }
    }

    pub fn from_roster(roster: &RosterDocument) -> Self {
        Self::new(roster.newest_match_id.clone())
    }

    pub fn value(&self) -> Option<&str> {
        self.newest_match_id.as_deref()
    }

    /// 按游标切分（输入须从新到旧排序）
    pub fn partition(&self, relevant: &[MatchRecord]) -> CursorDecision {
        let position = self
            .newest_match_id
            .as_deref()
            .and_then(|cursor| relevant.iter().position(|m| m.match_id() == cursor));

        match position {
            Some(position) => {
                debug!("🔍 找到分界点: cursor={:?}, position={}", self.newest_match_id, position);
                CursorDecision::CursorFound {
                    new_matches: relevant[..position].to_vec(),
                    position,
                }
            }
            None => {
                if !relevant.is_empty() {
                    info!(
                        "游标不在拉取窗口内，全部 {} 场比赛视为新比赛: cursor={:?}",
                        relevant.len(),
                        self.newest_match_id
                    );
                }
                CursorDecision::CursorNotFound {
                    new_matches: relevant.to_vec(),
                }
            }
        }
    }

    /// 检查哪些相关比赛的文件没有落盘（例如之前的运行中途失败）
    ///
    /// 串行检查，每次读取前节流；检查失败的比赛按漏存处理，重新写入是幂等的。
    pub async fn sweep_missing<F>(
        &self,
        store: &dyn DocumentStore,
        pacer: &ReadPacer,
        relevant: &[MatchRecord],
        path_for: F,
    ) -> Vec<MatchRecord>
    where
        F: Fn(&str) -> String,
    {
        let mut missing = Vec::new();
        for record in relevant {
            let path = path_for(record.match_id());
            pacer.pace().await;
            match store.exists(&path).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("比赛文件缺失: {}", path);
                    missing.push(record.clone());
                }
                Err(e) => {
                    warn!("检查比赛文件失败，按缺失处理: path={}, error={}", path, e);
                    missing.push(record.clone());
                }
            }
        }
        missing
    }
}
