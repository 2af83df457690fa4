//! 同步配置
//!
//! 默认值与仓库布局一致：
//! - `src/user.json`：名单 + 游标
//! - `src/leaderboard.json`：排行榜
//! - `src/match/{matchid}.json`：比赛记录

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LeaderboardSyncError, Result};
use crate::feed::HenrikFeedConfig;
use crate::store::GitHubStoreConfig;

/// HTTP 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// 连接超时（秒）
    pub connect_timeout_secs: Option<u64>,
    /// 请求超时（秒）
    pub request_timeout_secs: Option<u64>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: Some(30),
            request_timeout_secs: Some(60),
        }
    }
}

/// 同步配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// 名单文档路径
    pub roster_path: String,
    /// 排行榜文档路径
    pub leaderboard_path: String,
    /// 比赛记录目录
    pub match_dir: String,
    /// 连续读取单个比赛文件之间的间隔（毫秒），避免触发存储限流
    pub read_delay_ms: u64,
    /// 允许的对局人数
    pub lineup_sizes: Vec<usize>,
    /// 比赛模式（大小写不敏感）
    pub required_mode: String,
    /// 有新比赛写入后，调用方再次读取存储前建议等待的时间（毫秒）
    pub post_write_settle_ms: u64,
    /// 事件缓冲区大小
    pub event_buffer_size: usize,
    pub github: GitHubStoreConfig,
    pub feed: HenrikFeedConfig,
    pub http_client: HttpClientConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            roster_path: "src/user.json".to_string(),
            leaderboard_path: "src/leaderboard.json".to_string(),
            match_dir: "src/match".to_string(),
            read_delay_ms: 100,
            lineup_sizes: vec![6, 8],
            required_mode: "custom".to_string(),
            post_write_settle_ms: 2000,
            event_buffer_size: 64,
            github: GitHubStoreConfig::default(),
            feed: HenrikFeedConfig::default(),
            http_client: HttpClientConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SyncConfig = serde_json::from_str(json)
            .map_err(|e| LeaderboardSyncError::Config(format!("解析配置失败: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub async fn from_json_file(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LeaderboardSyncError::Config(format!("读取配置文件失败 {}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    /// 比赛文件路径
    pub fn match_path(&self, match_id: &str) -> String {
        format!("{}/{}.json", self.match_dir.trim_end_matches('/'), match_id)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("roster_path", &self.roster_path),
            ("leaderboard_path", &self.leaderboard_path),
            ("match_dir", &self.match_dir),
        ] {
            if value.trim().is_empty() {
                return Err(LeaderboardSyncError::Config(format!("{} 不能为空", name)));
            }
        }
        if self.lineup_sizes.is_empty() {
            return Err(LeaderboardSyncError::Config("lineup_sizes 不能为空".to_string()));
        }
        if self.required_mode.trim().is_empty() {
            return Err(LeaderboardSyncError::Config("required_mode 不能为空".to_string()));
        }
        Ok(())
    }

    /// 使用 GitHub 存储前的额外校验
    pub fn validate_github(&self) -> Result<()> {
        if self.github.repo.trim().is_empty() {
            return Err(LeaderboardSyncError::Config("github.repo 不能为空".to_string()));
        }
        Ok(())
    }
}

/// 同步配置构建器
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn roster_path<S: Into<String>>(mut self, path: S) -> Self {
        self.config.roster_path = path.into();
        self
    }

    pub fn leaderboard_path<S: Into<String>>(mut self, path: S) -> Self {
        self.config.leaderboard_path = path.into();
        self
    }

    pub fn match_dir<S: Into<String>>(mut self, dir: S) -> Self {
        self.config.match_dir = dir.into();
        self
    }

    pub fn read_delay_ms(mut self, delay: u64) -> Self {
        self.config.read_delay_ms = delay;
        self
    }

    pub fn lineup_sizes(mut self, sizes: Vec<usize>) -> Self {
        self.config.lineup_sizes = sizes;
        self
    }

    pub fn required_mode<S: Into<String>>(mut self, mode: S) -> Self {
        self.config.required_mode = mode.into();
        self
    }

    pub fn post_write_settle_ms(mut self, delay: u64) -> Self {
        self.config.post_write_settle_ms = delay;
        self
    }

    pub fn github(mut self, config: GitHubStoreConfig) -> Self {
        self.config.github = config;
        self
    }

    pub fn feed(mut self, config: HenrikFeedConfig) -> Self {
        self.config.feed = config;
        self
    }

    pub fn http_client_config(mut self, config: HttpClientConfig) -> Self {
        self.config.http_client = config;
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
