/// 比赛同步模块
///
/// 职责：
/// - 筛选与名单相关的比赛（RosterFilter）
/// - 根据游标判断哪些比赛是新的，并检查漏存的比赛文件（SyncCursor）
/// - 从全部比赛记录重新计算排行榜（StatsAggregator）
/// - 提交名单、比赛文件、排行榜，批量失败时逐个写入（CommitCoordinator）
/// - 编排一次完整同步（SyncEngine）

pub mod aggregator;
pub mod commit_coordinator;
pub mod cursor;
pub mod roster_filter;
pub mod sync_engine;

pub use aggregator::{compute_leaderboard, StatsAggregator};
pub use commit_coordinator::{CommitCoordinator, CommitPath, CommitPlan, CommitReport};
pub use cursor::{CursorDecision, SyncCursor};
pub use roster_filter::{ExclusionReason, FilterDecision, RosterFilter};
pub use sync_engine::{SyncEngine, SyncOutcome};

/// 同步状态
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SyncState {
    Idle,
    LoadingRoster,
    FetchingFeed,
    Filtering,
    DecidingCursor,
    /// 没有新比赛，仍会检查漏存文件和未初始化的排行榜
    NoNewMatches,
    /// 补存漏掉的比赛文件
    Backfilling,
    Committing,
    Done,
    /// 同步失败
    Failed {
        /// 错误消息
        error: String,
    },
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Done | SyncState::Failed { .. })
    }
}
