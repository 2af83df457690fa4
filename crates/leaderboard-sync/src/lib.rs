//! Leaderboard Sync - 自定义对局排行榜同步
//!
//! 从比赛数据源拉取最近的比赛，筛选出名单内玩家的自定义对局，
//! 写入版本化文档存储，并从全部比赛记录重新计算排行榜：
//! - 📋 名单筛选：模式、参赛人数、参赛者必须全部在名单内
//! - 🔖 同步游标：按最近处理的比赛 id 判定新比赛，游标丢失时全部视为新比赛
//! - 🧮 排行榜：击杀 / 死亡 / 助攻 / 对位击杀，每次从零重放
//! - 📦 提交：批量提交优先，失败时逐个写入并报告已写入的文件
//! - 🔧 补存：没有新比赛时检查漏存的比赛文件和未初始化的排行榜
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use leaderboard_sync::{GitHubContentsStore, HenrikFeedClient, SyncConfig, SyncEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SyncConfig::from_json_file("sync.json".as_ref()).await?;
//!     config.validate_github()?;
//!
//!     let store = GitHubContentsStore::new(config.github.clone(), &config.http_client)?;
//!     let feed = HenrikFeedClient::new(config.feed.clone(), &config.http_client)?;
//!     let engine = SyncEngine::new(Arc::new(store), Arc::new(feed), config);
//!
//!     let outcome = engine.synchronize().await?;
//!     if let Some(board) = outcome.leaderboard {
//!         println!("{} 名玩家", board.players.len());
//!     }
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod config;
pub mod entities;
pub mod error;
pub mod events;
pub mod feed;
pub mod rate_limiter;
pub mod store;
pub mod sync;
pub mod version;

// 重新导出核心类型，方便使用
pub use config::{HttpClientConfig, SyncConfig, SyncConfigBuilder};
pub use entities::{KillEvent, LeaderboardDocument, MatchRecord, Player, PlayerSnapshot, RosterDocument};
pub use error::{LeaderboardSyncError, Result};
pub use events::{SyncEvent, SyncEventBus};
pub use feed::{HenrikFeedClient, HenrikFeedConfig, MatchFeedSource, StaticFeed};
pub use rate_limiter::ReadPacer;
pub use store::{
    BatchFile, CommitId, DocumentStore, ExpectedVersion, GitHubContentsStore, GitHubStoreConfig,
    MemoryDocumentStore, SledDocumentStore, StoredDocument, VersionToken,
};
pub use sync::{
    compute_leaderboard, CommitCoordinator, CommitPath, CommitPlan, CommitReport, CursorDecision,
    ExclusionReason, FilterDecision, RosterFilter, StatsAggregator, SyncCursor, SyncEngine, SyncOutcome,
    SyncState,
};
