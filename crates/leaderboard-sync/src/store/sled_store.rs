//! 基于 sled 的本地文档存储
//!
//! - 版本号为内容哈希
//! - 单文件写入用 compare-and-swap，读取后被他人修改会返回冲突
//! - 批量提交在 sled 事务中执行，整体成功或整体回滚

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Tree};
use tracing::{debug, info};

use super::{is_direct_child, BatchFile, CommitId, DocumentStore, ExpectedVersion, StoredDocument, VersionToken};
use crate::error::{LeaderboardSyncError, Result};

const DOCUMENTS_TREE: &str = "documents";
const COMMITS_TREE: &str = "commits";

/// sled 文档存储
#[derive(Debug, Clone)]
pub struct SledDocumentStore {
    db: Db,
    documents: Tree,
    commits: Tree,
}

impl SledDocumentStore {
    /// 打开（或创建）存储目录
    pub async fn open(path: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| LeaderboardSyncError::IO(format!("创建存储目录失败: {}", e)))?;

        let db = sled::open(path)
            .map_err(|e| LeaderboardSyncError::Storage(format!("打开 sled 数据库失败: {}", e)))?;
        let documents = db.open_tree(DOCUMENTS_TREE)?;
        let commits = db.open_tree(COMMITS_TREE)?;

        info!("sled 文档存储已打开: {}", path.display());
        Ok(Self { db, documents, commits })
    }

    /// 已完成的批量提交数
    pub fn commit_count(&self) -> usize {
        self.commits.len()
    }

    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    fn conflict(path: &str, expected: &ExpectedVersion, current: Option<&[u8]>) -> LeaderboardSyncError {
        LeaderboardSyncError::VersionConflict {
            path: path.to_string(),
            expected: expected.token(),
            actual: current.map(VersionToken::of_content),
        }
    }
}

#[async_trait]
impl DocumentStore for SledDocumentStore {
    async fn read(&self, path: &str) -> Result<Option<StoredDocument>> {
        let value = self.documents.get(path.as_bytes())?;
        Ok(value.map(|v| StoredDocument {
            version: VersionToken::of_content(&v),
            content: Bytes::copy_from_slice(&v),
        }))
    }

    async fn write(
        &self,
        path: &str,
        content: Bytes,
        expected: ExpectedVersion,
        _message: &str,
    ) -> Result<VersionToken> {
        let current = self.documents.get(path.as_bytes())?;
        let current_version = current.as_deref().map(VersionToken::of_content);
        if !expected.admits(current_version.as_ref()) {
            return Err(Self::conflict(path, &expected, current.as_deref()));
        }

        // 校验与写入之间被他人修改则 CAS 失败
        let swapped = self
            .documents
            .compare_and_swap(path.as_bytes(), current.as_deref(), Some(content.to_vec()))?;
        if let Err(cas) = swapped {
            return Err(Self::conflict(path, &expected, cas.current.as_deref()));
        }

        debug!("sled store: wrote {}", path);
        Ok(VersionToken::of_content(&content))
    }

    async fn batch_write(&self, files: Vec<BatchFile>, message: &str) -> Result<CommitId> {
        let result = self.documents.transaction(|tx| {
            for file in &files {
                let current = tx.get(file.path.as_bytes())?;
                let current_version = current.as_deref().map(VersionToken::of_content);
                if !file.expected.admits(current_version.as_ref()) {
                    return Err(ConflictableTransactionError::Abort(Self::conflict(
                        &file.path,
                        &file.expected,
                        current.as_deref(),
                    )));
                }
                tx.insert(file.path.as_bytes(), file.content.to_vec())?;
            }
            Ok(())
        });

        match result {
            Ok(()) => {}
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => return Err(e.into()),
        }

        let commit_id = CommitId(uuid::Uuid::new_v4().to_string());
        self.commits.insert(commit_id.0.as_bytes(), message.as_bytes())?;
        Ok(commit_id)
    }

    async fn list(&self, dir: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let mut paths = Vec::new();
        for entry in self.documents.scan_prefix(prefix.as_bytes()) {
            let (key, _) = entry?;
            let path = String::from_utf8_lossy(&key).into_owned();
            if is_direct_child(dir, &path) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}
