use thiserror::Error;

use crate::store::VersionToken;

#[derive(Debug, Error)]
pub enum LeaderboardSyncError {
    /// 网络 / 认证失败，本次运行中止，存储状态不变
    #[error("Transient error: {0}")]
    Transient(String),

    /// 服务端限流（HTTP 429），不做退避重试，直接上报
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// 存储中的 JSON 无法解析
    #[error("Data format error at {path}: {reason}")]
    DataFormat { path: String, reason: String },

    /// 乐观并发版本号不匹配
    #[error("Version conflict at {path}: expected {expected:?}, actual {actual:?}")]
    VersionConflict {
        path: String,
        expected: Option<VersionToken>,
        actual: Option<VersionToken>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    /// 批量提交失败后逐个写入也中途失败，`written` 为已落盘的文件
    #[error("Partial commit: {} file(s) written before {failed_path} failed: {source}", .written.len())]
    PartialCommit {
        written: Vec<String>,
        failed_path: String,
        #[source]
        source: Box<LeaderboardSyncError>,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    IO(String),
}

impl From<serde_json::Error> for LeaderboardSyncError {
    fn from(error: serde_json::Error) -> Self {
        LeaderboardSyncError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for LeaderboardSyncError {
    fn from(error: std::io::Error) -> Self {
        LeaderboardSyncError::IO(error.to_string())
    }
}

impl From<sled::Error> for LeaderboardSyncError {
    fn from(error: sled::Error) -> Self {
        LeaderboardSyncError::Storage(error.to_string())
    }
}

impl From<reqwest::Error> for LeaderboardSyncError {
    fn from(error: reqwest::Error) -> Self {
        LeaderboardSyncError::Transient(error.to_string())
    }
}

impl LeaderboardSyncError {
    /// 构造数据格式错误
    pub fn data_format(path: impl Into<String>, reason: impl ToString) -> Self {
        LeaderboardSyncError::DataFormat {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// 是否为网络 / 认证类的瞬时错误
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LeaderboardSyncError::Transient(_) | LeaderboardSyncError::RateLimited(_)
        )
    }

    /// 是否为版本冲突（包括部分提交中由冲突引起的失败）
    pub fn is_conflict(&self) -> bool {
        match self {
            LeaderboardSyncError::VersionConflict { .. } => true,
            LeaderboardSyncError::PartialCommit { source, .. } => source.is_conflict(),
            _ => false,
        }
    }

    /// 部分提交时已经写入的文件路径，供调用方对账
    pub fn written_paths(&self) -> &[String] {
        match self {
            LeaderboardSyncError::PartialCommit { written, .. } => written,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, LeaderboardSyncError>;
