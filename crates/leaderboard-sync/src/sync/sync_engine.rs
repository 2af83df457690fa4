/// 同步引擎
///
/// 职责：
/// - 编排一次完整同步：读取名单 → 拉取比赛 → 筛选 → 游标判定 → 提交
/// - 没有新比赛时检查漏存的比赛文件和未初始化的排行榜，必要时补存 / 重建
/// - 维护同步状态并广播状态变化
///
/// 一次同步严格串行执行；引擎内部不加锁，调用方需保证同一时间只有一次同步。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::entities::{LeaderboardDocument, MatchRecord, Player, RosterDocument};
use crate::error::{LeaderboardSyncError, Result};
use crate::events::{SyncEvent, SyncEventBus};
use crate::feed::MatchFeedSource;
use crate::rate_limiter::ReadPacer;
use crate::store::{DocumentStore, ExpectedVersion, VersionToken};
use crate::sync::aggregator::StatsAggregator;
use crate::sync::commit_coordinator::{CommitCoordinator, CommitPlan, CommitReport};
use crate::sync::cursor::SyncCursor;
use crate::sync::roster_filter::RosterFilter;
use crate::sync::SyncState;
use crate::version::{BUILD_TIME, CRATE_VERSION};

/// 一次同步的结果
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// 是否发现了新比赛
    pub has_new_matches: bool,
    /// 本次计算出的排行榜；没有写入时为 None。
    /// 调用方应直接使用它，不要在写入后立刻回读存储
    pub leaderboard: Option<LeaderboardDocument>,
    pub new_match_ids: Vec<String>,
    pub backfilled_match_ids: Vec<String>,
    pub leaderboard_rebuilt: bool,
    pub commit: Option<CommitReport>,
    pub final_state: SyncState,
    pub finished_at: DateTime<Utc>,
    /// 有写入时，建议调用方回读存储前等待的时间
    pub settle_delay: Option<Duration>,
}

impl SyncOutcome {
    fn unchanged() -> Self {
        Self {
            has_new_matches: false,
            leaderboard: None,
            new_match_ids: Vec::new(),
            backfilled_match_ids: Vec::new(),
            leaderboard_rebuilt: false,
            commit: None,
            final_state: SyncState::Done,
            finished_at: Utc::now(),
            settle_delay: None,
        }
    }
}

/// 读取到的排行榜
struct LoadedLeaderboard {
    /// 解析失败时为 None
    document: Option<LeaderboardDocument>,
    version: Option<VersionToken>,
}

impl LoadedLeaderboard {
    fn needs_rebuild(&self) -> bool {
        self.document
            .as_ref()
            .map_or(true, LeaderboardDocument::is_uninitialized)
    }

    fn expected(&self) -> ExpectedVersion {
        ExpectedVersion::from_read(self.version.as_ref())
    }
}

/// 同步引擎
pub struct SyncEngine {
    store: Arc<dyn DocumentStore>,
    feed: Arc<dyn MatchFeedSource>,
    config: SyncConfig,
    /// 逐个读取比赛文件时的节流
    pacer: ReadPacer,
    coordinator: CommitCoordinator,
    events: SyncEventBus,
    state: Mutex<SyncState>,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn DocumentStore>, feed: Arc<dyn MatchFeedSource>, config: SyncConfig) -> Self {
        let pacer = ReadPacer::from_millis(config.read_delay_ms);
        let events = SyncEventBus::new(config.event_buffer_size);
        let coordinator = CommitCoordinator::new(store.clone(), config.clone());

        Self {
            store,
            feed,
            config,
            pacer,
            coordinator,
            events,
            state: Mutex::new(SyncState::Idle),
        }
    }

    /// 使用外部事件总线
    pub fn with_event_bus(mut self, events: SyncEventBus) -> Self {
        self.events = events;
        self
    }

    pub fn state(&self) -> SyncState {
        self.state.lock().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// 从比赛记录和名单计算排行榜（不落盘）
    pub fn compute_leaderboard(matches: &[MatchRecord], roster: &[Player]) -> LeaderboardDocument {
        StatsAggregator::compute(matches, roster)
    }

    /// 执行一次同步
    ///
    /// 失败时状态置为 `Failed` 并返回错误；部分提交的情况见 `LeaderboardSyncError::PartialCommit`。
    pub async fn synchronize(&self) -> Result<SyncOutcome> {
        info!("🚀 开始同步 (leaderboard-sync {}, built {})", CRATE_VERSION, BUILD_TIME);
        self.pacer.reset();

        match self.run().await {
            Ok(outcome) => {
                info!(
                    "✅ 同步完成: new={}, backfilled={}, rebuilt={}",
                    outcome.new_match_ids.len(),
                    outcome.backfilled_match_ids.len(),
                    outcome.leaderboard_rebuilt
                );
                Ok(outcome)
            }
            Err(e) => {
                error!("❌ 同步失败: {}", e);
                self.transition(SyncState::Failed { error: e.to_string() });
                Err(e)
            }
        }
    }

    async fn run(&self) -> Result<SyncOutcome> {
        // 1. 读取名单
        self.transition(SyncState::LoadingRoster);
        let (mut roster, roster_version) = self.load_roster().await?;

        // 2. 拉取比赛
        self.transition(SyncState::FetchingFeed);
        let fetched = self.feed.fetch_recent().await?;

        // 3. 筛选
        self.transition(SyncState::Filtering);
        let fetched_count = fetched.len();
        let relevant = RosterFilter::for_roster(&roster, &self.config).filter(fetched);
        info!("📋 筛选结果: fetched={}, relevant={}", fetched_count, relevant.len());
        self.events.emit(SyncEvent::MatchesFiltered {
            fetched: fetched_count,
            relevant: relevant.len(),
        });

        if relevant.is_empty() {
            debug!("没有相关比赛，本次同步不做任何写入");
            self.transition(SyncState::Done);
            return Ok(SyncOutcome::unchanged());
        }

        // 4. 游标判定
        self.transition(SyncState::DecidingCursor);
        let cursor = SyncCursor::from_roster(&roster);
        let decision = cursor.partition(&relevant);

        if !decision.has_new_matches() {
            self.transition(SyncState::NoNewMatches);
            return self.sweep(&cursor, &roster, &relevant).await;
        }

        // 5. 有新比赛：刷新展示信息，推进游标，重算排行榜
        let new_matches = decision.into_new_matches();
        let new_match_ids: Vec<String> = new_matches.iter().map(|m| m.match_id().to_string()).collect();
        info!("🆕 发现 {} 场新比赛: {:?}", new_matches.len(), new_match_ids);

        refresh_player_metadata(&mut roster.players, &new_matches);
        roster.newest_match_id = Some(new_match_ids[0].clone());

        let mut all_matches = new_matches.clone();
        all_matches.extend(self.load_persisted_matches().await?);
        let leaderboard = StatsAggregator::compute(&all_matches, &roster.players);
        let loaded = self.load_leaderboard().await?;

        self.transition(SyncState::Committing);
        let plan = CommitPlan::new(format!(
            "Sync {} new match(es), newest {}",
            new_matches.len(),
            new_match_ids[0]
        ))
        .with_roster(roster, ExpectedVersion::from_read(roster_version.as_ref()))
        .with_matches(new_matches)
        .with_leaderboard(leaderboard.clone(), loaded.expected());

        let report = self.coordinator.commit(plan).await?;
        self.events.emit(SyncEvent::CommitCompleted(report.clone()));

        self.transition(SyncState::Done);
        Ok(SyncOutcome {
            has_new_matches: true,
            leaderboard: Some(leaderboard),
            new_match_ids,
            commit: Some(report),
            settle_delay: Some(self.settle_delay()),
            finished_at: Utc::now(),
            ..SyncOutcome::unchanged()
        })
    }

    /// 没有新比赛：补存漏掉的比赛文件，必要时重建排行榜，不动游标
    async fn sweep(&self, cursor: &SyncCursor, roster: &RosterDocument, relevant: &[MatchRecord]) -> Result<SyncOutcome> {
        let missing = cursor
            .sweep_missing(self.store.as_ref(), &self.pacer, relevant, |id| self.config.match_path(id))
            .await;
        let loaded = self.load_leaderboard().await?;
        let rebuild = loaded.needs_rebuild();

        if missing.is_empty() && !rebuild {
            debug!("没有新比赛，比赛文件和排行榜均完整");
            self.transition(SyncState::Done);
            return Ok(SyncOutcome::unchanged());
        }

        self.transition(SyncState::Backfilling);
        let backfilled_match_ids: Vec<String> = missing.iter().map(|m| m.match_id().to_string()).collect();
        if !missing.is_empty() {
            info!("🔧 补存 {} 场漏存的比赛: {:?}", missing.len(), backfilled_match_ids);
        }
        if rebuild {
            info!("🔧 排行榜未初始化或无法解析，重新计算");
        }

        let mut all_matches = missing.clone();
        all_matches.extend(self.load_persisted_matches().await?);
        let leaderboard = StatsAggregator::compute(&all_matches, &roster.players);

        // 重建结果与存储中一致（例如比赛里没有任何击杀）时不再重复提交
        if missing.is_empty() && loaded.document.as_ref() == Some(&leaderboard) {
            debug!("重建后的排行榜与现有内容一致，跳过提交");
            self.transition(SyncState::Done);
            return Ok(SyncOutcome::unchanged());
        }

        let message = if missing.is_empty() {
            "Rebuild leaderboard".to_string()
        } else {
            format!("Backfill {} match(es)", missing.len())
        };
        let plan = CommitPlan::new(message)
            .with_matches(missing)
            .with_leaderboard(leaderboard.clone(), loaded.expected());

        let report = self.coordinator.commit(plan).await?;
        self.events.emit(SyncEvent::CommitCompleted(report.clone()));
        if !backfilled_match_ids.is_empty() {
            self.events.emit(SyncEvent::BackfillCompleted {
                persisted: backfilled_match_ids.clone(),
            });
        }
        if rebuild {
            self.events.emit(SyncEvent::LeaderboardRebuilt {
                players: leaderboard.players.len(),
            });
        }

        self.transition(SyncState::Done);
        Ok(SyncOutcome {
            leaderboard: Some(leaderboard),
            backfilled_match_ids,
            leaderboard_rebuilt: rebuild,
            commit: Some(report),
            settle_delay: Some(self.settle_delay()),
            finished_at: Utc::now(),
            ..SyncOutcome::unchanged()
        })
    }

    /// 读取名单，缺失或无法解析都中止本次同步
    async fn load_roster(&self) -> Result<(RosterDocument, Option<VersionToken>)> {
        let path = &self.config.roster_path;
        let stored = self
            .store
            .read(path)
            .await?
            .ok_or_else(|| LeaderboardSyncError::NotFound(path.clone()))?;

        let roster = RosterDocument::from_slice(path, &stored.content)?;
        debug!(
            "名单已加载: players={}, cursor={:?}",
            roster.players.len(),
            roster.newest_match_id
        );
        Ok((roster, Some(stored.version)))
    }

    /// 读取排行榜；无法解析时按需要重建处理，读取失败则向上返回
    async fn load_leaderboard(&self) -> Result<LoadedLeaderboard> {
        let path = &self.config.leaderboard_path;
        let Some(stored) = self.store.read(path).await? else {
            debug!("排行榜不存在: {}", path);
            return Ok(LoadedLeaderboard {
                document: None,
                version: None,
            });
        };

        let document = match LeaderboardDocument::from_slice(path, &stored.content) {
            Ok(document) => Some(document),
            Err(e) => {
                warn!("⚠️ 排行榜无法解析，将重新计算: {}", e);
                None
            }
        };

        Ok(LoadedLeaderboard {
            document,
            version: Some(stored.version),
        })
    }

    /// 逐个读取已落盘的比赛文件；单个文件读取 / 解析失败时跳过
    async fn load_persisted_matches(&self) -> Result<Vec<MatchRecord>> {
        let paths = self.store.list(&self.config.match_dir).await?;
        let mut matches = Vec::with_capacity(paths.len());

        for path in &paths {
            self.pacer.pace().await;
            match self.store.read(path).await {
                Ok(Some(stored)) => match MatchRecord::from_slice(path, &stored.content) {
                    Ok(record) => matches.push(record),
                    Err(e) => warn!("⚠️ 跳过无法解析的比赛文件: {}", e),
                },
                Ok(None) => warn!("⚠️ 比赛文件已不存在: {}", path),
                Err(e) => warn!("⚠️ 读取比赛文件失败，跳过: path={}, error={}", path, e),
            }
        }

        debug!("已加载 {} / {} 个比赛文件", matches.len(), paths.len());
        Ok(matches)
    }

    fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.config.post_write_settle_ms)
    }

    fn transition(&self, to: SyncState) {
        let from = std::mem::replace(&mut *self.state.lock(), to.clone());
        debug!("同步状态: {:?} -> {:?}", from, to);
        self.events.emit(SyncEvent::StateChanged { from, to });
    }
}

/// 用最新一场提到该玩家的比赛刷新名单中的展示信息（new_matches 从新到旧）
fn refresh_player_metadata(players: &mut [Player], new_matches: &[MatchRecord]) {
    for player in players.iter_mut() {
        let snapshot = new_matches.iter().find_map(|m| m.snapshot_for(&player.puuid));
        if let Some(snapshot) = snapshot {
            if player.refresh_from_snapshot(snapshot) {
                debug!("玩家信息已更新: puuid={}, name={}#{}", player.puuid, player.name, player.tag);
            }
        }
    }
}
