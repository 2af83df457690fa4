//! 内存文档存储
//!
//! 进程内实现，版本号为内容哈希；批量提交先整体校验再整体写入。
//! 带有故障注入开关，便于测试批量失败、逐个写入中途失败、单文件读取失败等路径。

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

use super::{is_direct_child, BatchFile, CommitId, DocumentStore, ExpectedVersion, StoredDocument, VersionToken};
use crate::error::{LeaderboardSyncError, Result};

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<String, StoredDocument>,
    commits: Vec<(CommitId, String)>,
    fail_batch_writes: bool,
    /// 剩余允许成功的单文件写入次数，None 表示不限
    writes_remaining: Option<usize>,
    failing_reads: HashSet<String>,
    read_count: usize,
}

/// 内存文档存储
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    state: Mutex<MemoryState>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接放入文件（不经过版本校验），返回版本号
    pub fn insert(&self, path: impl Into<String>, content: impl Into<Bytes>) -> VersionToken {
        let content = content.into();
        let version = VersionToken::of_content(&content);
        self.state.lock().files.insert(
            path.into(),
            StoredDocument {
                content,
                version: version.clone(),
            },
        );
        version
    }

    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.state.lock().files.get(path).map(|d| d.content.clone())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state.lock().files.contains_key(path)
    }

    pub fn paths(&self) -> Vec<String> {
        self.state.lock().files.keys().cloned().collect()
    }

    /// 已完成的批量提交（commit id, message）
    pub fn commits(&self) -> Vec<(CommitId, String)> {
        self.state.lock().commits.clone()
    }

    pub fn read_count(&self) -> usize {
        self.state.lock().read_count
    }

    /// 之后的批量提交全部失败
    pub fn fail_batch_writes(&self, fail: bool) {
        self.state.lock().fail_batch_writes = fail;
    }

    /// 再成功 `n` 次单文件写入后，后续写入全部失败
    pub fn fail_writes_after(&self, n: usize) {
        self.state.lock().writes_remaining = Some(n);
    }

    /// 读取该路径时返回瞬时错误
    pub fn fail_reads_for(&self, path: impl Into<String>) {
        self.state.lock().failing_reads.insert(path.into());
    }

    fn conflict(path: &str, expected: &ExpectedVersion, actual: Option<&StoredDocument>) -> LeaderboardSyncError {
        LeaderboardSyncError::VersionConflict {
            path: path.to_string(),
            expected: expected.token(),
            actual: actual.map(|d| d.version.clone()),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn read(&self, path: &str) -> Result<Option<StoredDocument>> {
        let mut state = self.state.lock();
        state.read_count += 1;
        if state.failing_reads.contains(path) {
            return Err(LeaderboardSyncError::Transient(format!("injected read failure: {}", path)));
        }
        Ok(state.files.get(path).cloned())
    }

    async fn write(
        &self,
        path: &str,
        content: Bytes,
        expected: ExpectedVersion,
        _message: &str,
    ) -> Result<VersionToken> {
        let mut state = self.state.lock();

        if let Some(remaining) = state.writes_remaining.as_mut() {
            if *remaining == 0 {
                return Err(LeaderboardSyncError::Transient(format!("injected write failure: {}", path)));
            }
            *remaining -= 1;
        }

        let current = state.files.get(path);
        if !expected.admits(current.map(|d| &d.version)) {
            return Err(Self::conflict(path, &expected, current));
        }

        let version = VersionToken::of_content(&content);
        state.files.insert(
            path.to_string(),
            StoredDocument {
                content,
                version: version.clone(),
            },
        );
        debug!("memory store: wrote {}", path);
        Ok(version)
    }

    async fn batch_write(&self, files: Vec<BatchFile>, message: &str) -> Result<CommitId> {
        let mut state = self.state.lock();

        if state.fail_batch_writes {
            return Err(LeaderboardSyncError::Transient("injected batch failure".to_string()));
        }

        for file in &files {
            let current = state.files.get(&file.path);
            if !file.expected.admits(current.map(|d| &d.version)) {
                return Err(Self::conflict(&file.path, &file.expected, current));
            }
        }

        for file in files {
            let version = VersionToken::of_content(&file.content);
            state.files.insert(
                file.path,
                StoredDocument {
                    content: file.content,
                    version,
                },
            );
        }

        let commit_id = CommitId(uuid::Uuid::new_v4().to_string());
        state.commits.push((commit_id.clone(), message.to_string()));
        Ok(commit_id)
    }

    async fn list(&self, dir: &str) -> Result<Vec<String>> {
        let state = self.state.lock();
        Ok(state
            .files
            .keys()
            .filter(|path| is_direct_child(dir, path))
            .cloned()
            .collect())
    }
}
