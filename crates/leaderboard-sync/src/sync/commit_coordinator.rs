/// 提交协调器
///
/// 职责：
/// - 把名单、新比赛文件、排行榜作为一次逻辑提交写入存储
/// - 优先走批量提交（整体生效）
/// - 批量提交失败时退化为逐个写入：名单 → 各比赛文件 → 排行榜
///
/// 逐个写入不是原子的，中途失败会留下部分写入的状态，
/// 以 `PartialCommit` 返回已写入的文件列表，由调用方对账。

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::entities::{LeaderboardDocument, MatchRecord, RosterDocument};
use crate::error::{LeaderboardSyncError, Result};
use crate::store::{BatchFile, CommitId, DocumentStore, ExpectedVersion};
use crate::version::commit_trailer;

/// 一次提交的内容
#[derive(Debug, Clone)]
pub struct CommitPlan {
    /// 名单文档及读取时的版本
    pub roster: Option<(RosterDocument, ExpectedVersion)>,
    /// 需要落盘的比赛（不做版本校验，重复写入内容相同）
    pub matches: Vec<MatchRecord>,
    /// 排行榜文档及读取时的版本
    pub leaderboard: Option<(LeaderboardDocument, ExpectedVersion)>,
    pub message: String,
}

impl CommitPlan {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            roster: None,
            matches: Vec::new(),
            leaderboard: None,
            message: message.into(),
        }
    }

    pub fn with_roster(mut self, roster: RosterDocument, expected: ExpectedVersion) -> Self {
        self.roster = Some((roster, expected));
        self
    }

    pub fn with_matches(mut self, matches: Vec<MatchRecord>) -> Self {
        self.matches = matches;
        self
    }

    pub fn with_leaderboard(mut self, leaderboard: LeaderboardDocument, expected: ExpectedVersion) -> Self {
        self.leaderboard = Some((leaderboard, expected));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.roster.is_none() && self.matches.is_empty() && self.leaderboard.is_none()
    }
}

/// 实际走的提交路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitPath {
    /// 批量提交成功
    Batch { commit_id: CommitId },
    /// 批量提交失败，逐个写入全部成功
    Sequential { batch_error: String },
    /// 没有需要写入的内容
    Empty,
}

/// 提交结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub path: CommitPath,
    /// 已写入的文件，按写入顺序
    pub written: Vec<String>,
}

impl CommitReport {
    pub fn is_fallback(&self) -> bool {
        matches!(self.path, CommitPath::Sequential { .. })
    }
}

/// 提交协调器
pub struct CommitCoordinator {
    store: Arc<dyn DocumentStore>,
    config: SyncConfig,
}

impl CommitCoordinator {
    pub fn new(store: Arc<dyn DocumentStore>, config: SyncConfig) -> Self {
        Self { store, config }
    }

    /// 执行提交
    pub async fn commit(&self, plan: CommitPlan) -> Result<CommitReport> {
        if plan.is_empty() {
            debug!("没有需要提交的内容");
            return Ok(CommitReport {
                path: CommitPath::Empty,
                written: Vec::new(),
            });
        }

        // 先全部序列化，序列化失败时不写入任何文件
        let files = self.prepare(&plan)?;
        let message = format!("{}\n\n{}", plan.message, commit_trailer());
        let paths: Vec<String> = files.iter().map(|f| f.path.clone()).collect();

        debug!("开始批量提交: {} 个文件", files.len());
        match self.store.batch_write(files.clone(), &message).await {
            Ok(commit_id) => {
                info!("✅ 批量提交成功: commit={}, files={}", commit_id, paths.len());
                Ok(CommitReport {
                    path: CommitPath::Batch { commit_id },
                    written: paths,
                })
            }
            Err(batch_error) => {
                warn!("⚠️ 批量提交失败，改为逐个写入: {}", batch_error);
                let written = self.write_sequentially(files, &message).await?;
                info!("✅ 逐个写入完成: {} 个文件", written.len());
                Ok(CommitReport {
                    path: CommitPath::Sequential {
                        batch_error: batch_error.to_string(),
                    },
                    written,
                })
            }
        }
    }

    /// 按 名单 → 比赛 → 排行榜 的顺序生成文件
    fn prepare(&self, plan: &CommitPlan) -> Result<Vec<BatchFile>> {
        let mut files = Vec::with_capacity(plan.matches.len() + 2);

        if let Some((roster, expected)) = &plan.roster {
            files.push(BatchFile::new(
                self.config.roster_path.clone(),
                roster.to_pretty_json()?,
                expected.clone(),
            ));
        }

        for record in &plan.matches {
            files.push(BatchFile::new(
                self.config.match_path(record.match_id()),
                record.to_pretty_json()?,
                ExpectedVersion::Any,
            ));
        }

        if let Some((leaderboard, expected)) = &plan.leaderboard {
            files.push(BatchFile::new(
                self.config.leaderboard_path.clone(),
                leaderboard.to_pretty_json()?,
                expected.clone(),
            ));
        }

        Ok(files)
    }

    async fn write_sequentially(&self, files: Vec<BatchFile>, message: &str) -> Result<Vec<String>> {
        let mut written = Vec::with_capacity(files.len());

        for file in files {
            match self.store.write(&file.path, file.content, file.expected, message).await {
                Ok(version) => {
                    debug!("写入成功: path={}, version={}", file.path, version);
                    written.push(file.path);
                }
                Err(e) => {
                    error!(
                        "❌ 逐个写入中途失败: path={}, 已写入 {} 个文件, error={}",
                        file.path,
                        written.len(),
                        e
                    );
                    return Err(LeaderboardSyncError::PartialCommit {
                        written,
                        failed_path: file.path,
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crate::entities::{KillEvent, Player};
    use crate::store::{MemoryDocumentStore, VersionToken};

    fn plan(roster_expected: ExpectedVersion) -> CommitPlan {
        let roster = RosterDocument {
            players: vec![Player::new("a"), Player::new("b")],
            newest_match_id: Some("m2".to_string()),
        };
        let matches = vec![
            MatchRecord::new("m2", "Custom").with_kills(vec![KillEvent::new("a", "b", &[])]),
            MatchRecord::new("m1", "Custom"),
        ];
        let leaderboard = crate::sync::compute_leaderboard(&matches, &roster.players);

        CommitPlan::new("Sync 2 matches")
            .with_roster(roster, roster_expected)
            .with_matches(matches)
            .with_leaderboard(leaderboard, ExpectedVersion::Absent)
    }

    fn coordinator(store: &Arc<MemoryDocumentStore>) -> CommitCoordinator {
        CommitCoordinator::new(store.clone(), SyncConfig::default())
    }

    #[tokio::test]
    async fn test_batch_commit_writes_everything_at_once() {
        let store = Arc::new(MemoryDocumentStore::new());
        let roster_version = store.insert("src/user.json", "{}");

        let report = coordinator(&store)
            .commit(plan(ExpectedVersion::Exact(roster_version)))
            .await
            .unwrap();

        assert!(matches!(report.path, CommitPath::Batch { .. }));
        assert_eq!(
            report.written,
            vec!["src/user.json", "src/match/m2.json", "src/match/m1.json", "src/leaderboard.json"]
        );
        let commits = store.commits();
        assert_eq!(commits.len(), 1);
        assert!(commits[0].1.starts_with("Sync 2 matches"));
        assert!(commits[0].1.contains(&commit_trailer()));

        let roster = RosterDocument::from_slice("src/user.json", &store.get("src/user.json").unwrap()).unwrap();
        assert_eq!(roster.newest_match_id.as_deref(), Some("m2"));
    }

    #[tokio::test]
    async fn test_batch_failure_falls_back_to_sequential_writes() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.fail_batch_writes(true);

        let report = coordinator(&store).commit(plan(ExpectedVersion::Absent)).await.unwrap();

        assert!(report.is_fallback());
        assert_eq!(report.written.len(), 4);
        assert!(store.commits().is_empty());
        assert!(store.contains("src/match/m1.json"));
        assert!(store.contains("src/leaderboard.json"));
    }

    #[tokio::test]
    async fn test_fallback_failure_reports_written_files() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.fail_batch_writes(true);
        store.fail_writes_after(2);

        let err = coordinator(&store).commit(plan(ExpectedVersion::Absent)).await.unwrap_err();

        match &err {
            LeaderboardSyncError::PartialCommit { written, failed_path, .. } => {
                assert_eq!(written, &vec!["src/user.json".to_string(), "src/match/m2.json".to_string()]);
                assert_eq!(failed_path, "src/match/m1.json");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!err.is_conflict());
        assert!(store.contains("src/match/m2.json"));
        assert!(!store.contains("src/leaderboard.json"));
    }

    #[tokio::test]
    async fn test_stale_roster_version_is_a_conflict() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.insert("src/user.json", "{\"players\":[]}");

        let stale = ExpectedVersion::Exact(VersionToken::new("stale"));
        let err = coordinator(&store).commit(plan(stale)).await.unwrap_err();

        assert!(err.is_conflict());
        assert!(err.written_paths().is_empty());
        assert!(!store.contains("src/match/m2.json"));
        assert_eq!(store.get("src/user.json").unwrap(), Bytes::from_static(b"{\"players\":[]}"));
    }

    #[tokio::test]
    async fn test_empty_plan_writes_nothing() {
        let store = Arc::new(MemoryDocumentStore::new());
        let report = coordinator(&store).commit(CommitPlan::new("noop")).await.unwrap();
        assert_eq!(report.path, CommitPath::Empty);
        assert!(store.paths().is_empty());
    }
}
