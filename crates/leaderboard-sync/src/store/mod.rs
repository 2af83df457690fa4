//! 文档存储抽象
//!
//! 外部存储只提供：
//! - 带版本号的单文件读写（乐观并发，版本不匹配即冲突）
//! - 多文件批量提交（要么全部生效，要么全部失败）
//! - 目录列举
//!
//! 没有事务，没有锁，所有协调都通过版本号完成。

pub mod github;
pub mod memory;
pub mod sled_store;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

pub use github::{GitHubContentsStore, GitHubStoreConfig};
pub use memory::MemoryDocumentStore;
pub use sled_store::SledDocumentStore;

/// 存储返回的不透明版本号
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// 按内容计算版本号（内存 / sled 存储使用）
    pub fn of_content(content: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(content)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VersionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 写入前对当前版本的要求
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// 文件必须不存在（首次创建）
    Absent,
    /// 文件当前版本必须等于读取时拿到的版本
    Exact(VersionToken),
    /// 不检查版本（只用于不可变的比赛文件）
    Any,
}

impl ExpectedVersion {
    /// 由读取时拿到的版本构造：读到了就精确匹配，没读到就要求不存在
    pub fn from_read(version: Option<&VersionToken>) -> Self {
        match version {
            Some(v) => ExpectedVersion::Exact(v.clone()),
            None => ExpectedVersion::Absent,
        }
    }

    /// 校验当前版本，返回是否满足
    pub fn admits(&self, current: Option<&VersionToken>) -> bool {
        match (self, current) {
            (ExpectedVersion::Any, _) => true,
            (ExpectedVersion::Absent, None) => true,
            (ExpectedVersion::Absent, Some(_)) => false,
            (ExpectedVersion::Exact(expected), Some(actual)) => expected == actual,
            (ExpectedVersion::Exact(_), None) => false,
        }
    }

    pub fn token(&self) -> Option<VersionToken> {
        match self {
            ExpectedVersion::Exact(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// 读取结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub content: Bytes,
    pub version: VersionToken,
}

/// 批量提交中的单个文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFile {
    pub path: String,
    pub content: Bytes,
    pub expected: ExpectedVersion,
}

impl BatchFile {
    pub fn new(path: impl Into<String>, content: impl Into<Bytes>, expected: ExpectedVersion) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            expected,
        }
    }
}

/// 批量提交返回的提交标识
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitId(pub String);

impl std::fmt::Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 版本化文档存储
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 读取文件；不存在返回 `None`
    async fn read(&self, path: &str) -> Result<Option<StoredDocument>>;

    /// 单文件写入，版本不满足时返回 `VersionConflict`
    async fn write(
        &self,
        path: &str,
        content: Bytes,
        expected: ExpectedVersion,
        message: &str,
    ) -> Result<VersionToken>;

    /// 多文件一次提交，任何文件出错都整体失败
    async fn batch_write(&self, files: Vec<BatchFile>, message: &str) -> Result<CommitId>;

    /// 列出目录下的文件路径（不递归）
    async fn list(&self, dir: &str) -> Result<Vec<String>>;

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.read(path).await?.is_some())
    }
}

/// 目录下的直接子文件
pub(crate) fn is_direct_child(dir: &str, path: &str) -> bool {
    let dir = dir.trim_end_matches('/');
    match path.strip_prefix(dir).and_then(|rest| rest.strip_prefix('/')) {
        Some(name) => !name.is_empty() && !name.contains('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_version_admits() {
        let v1 = VersionToken::of_content(b"one");
        let v2 = VersionToken::of_content(b"two");

        assert!(ExpectedVersion::Absent.admits(None));
        assert!(!ExpectedVersion::Absent.admits(Some(&v1)));
        assert!(ExpectedVersion::Exact(v1.clone()).admits(Some(&v1)));
        assert!(!ExpectedVersion::Exact(v1.clone()).admits(Some(&v2)));
        assert!(!ExpectedVersion::Exact(v1.clone()).admits(None));
        assert!(ExpectedVersion::Any.admits(None));
        assert!(ExpectedVersion::Any.admits(Some(&v2)));

        assert_eq!(ExpectedVersion::from_read(Some(&v1)), ExpectedVersion::Exact(v1));
        assert_eq!(ExpectedVersion::from_read(None), ExpectedVersion::Absent);
    }

    #[test]
    fn test_is_direct_child() {
        assert!(is_direct_child("src/match", "src/match/m1.json"));
        assert!(is_direct_child("src/match/", "src/match/m1.json"));
        assert!(!is_direct_child("src/match", "src/match/nested/m1.json"));
        assert!(!is_direct_child("src/match", "src/matches/m1.json"));
        assert!(!is_direct_child("src/match", "src/match"));
    }
}
