//! Henrik 比赛接口客户端
//!
//! `GET {base}/valorant/v3/matches/{region}/{name}/{tag}?size=N`，
//! 响应 `{ "status": 200, "data": [ ...比赛... ] }`，data 已按时间从新到旧排序。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::MatchFeedSource;
use crate::config::HttpClientConfig;
use crate::entities::MatchRecord;
use crate::error::{LeaderboardSyncError, Result};

/// Henrik 接口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HenrikFeedConfig {
    pub api_base_url: String,
    pub region: String,
    /// 用于查询比赛列表的玩家名
    pub name: String,
    pub tag: String,
    pub api_key: String,
    /// 每次拉取的比赛数
    pub size: u32,
    /// 服务端模式过滤（可选，本地仍会再筛一次）
    pub mode: Option<String>,
}

impl Default for HenrikFeedConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.henrikdev.xyz".to_string(),
            region: "eu".to_string(),
            name: String::new(),
            tag: String::new(),
            api_key: String::new(),
            size: 10,
            mode: None,
        }
    }
}

/// Henrik 比赛接口客户端
pub struct HenrikFeedClient {
    client: Client,
    config: HenrikFeedConfig,
}

impl HenrikFeedClient {
    pub fn new(config: HenrikFeedConfig, http: &HttpClientConfig) -> Result<Self> {
        let mut builder = Client::builder();

        if let Some(timeout) = http.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }

        if let Some(timeout) = http.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let client = builder
            .build()
            .map_err(|e| LeaderboardSyncError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self { client, config })
    }

    fn matches_url(&self) -> String {
        format!(
            "{}/valorant/v3/matches/{}/{}/{}",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.region,
            self.config.name,
            self.config.tag
        )
    }
}

/// 解析响应信封，单条比赛解析失败时跳过
pub fn parse_match_envelope(body: serde_json::Value) -> Result<Vec<MatchRecord>> {
    let data = body
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| LeaderboardSyncError::data_format("feed", "missing data array"))?;

    let mut matches = Vec::with_capacity(data.len());
    for (index, raw) in data.iter().enumerate() {
        match serde_json::from_value::<MatchRecord>(raw.clone()) {
            Ok(record) => matches.push(record),
            Err(e) => warn!("⚠️ 跳过无法解析的比赛: index={}, error={}", index, e),
        }
    }
    Ok(matches)
}

#[async_trait]
impl MatchFeedSource for HenrikFeedClient {
    async fn fetch_recent(&self) -> Result<Vec<MatchRecord>> {
        let mut query = vec![("size", self.config.size.to_string())];
        if let Some(mode) = &self.config.mode {
            query.push(("mode", mode.clone()));
        }

        let response = self
            .client
            .get(self.matches_url())
            .query(&query)
            .header("Authorization", &self.config.api_key)
            .send()
            .await
            .map_err(|e| LeaderboardSyncError::Transient(format!("获取比赛数据失败: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("❌ 比赛接口返回错误: status={}, body={}", status, body);
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => LeaderboardSyncError::RateLimited(body),
                _ => LeaderboardSyncError::Transient(format!("比赛接口返回 {}", status)),
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LeaderboardSyncError::data_format("feed", e))?;
        let matches = parse_match_envelope(body)?;

        info!("🎮 获取到 {} 场比赛", matches.len());
        Ok(matches)
    }
}
