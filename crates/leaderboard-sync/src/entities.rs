//! 数据实体定义
//!
//! - `Player` / `RosterDocument`：名单文档（user.json），包含同步游标
//! - `MatchRecord`：比赛记录（src/match/{matchid}.json），落盘前去掉 rounds
//! - `LeaderboardDocument`：排行榜（leaderboard.json），完全由比赛记录推导
//!
//! 比赛记录保留所有未识别字段（`extra`），落盘文件与原始数据保持一致。

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{LeaderboardSyncError, Result};

/// 玩家（名单成员）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub puuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tag: String,
    /// 卡面资源（仅展示用）
    #[serde(default)]
    pub card: String,
    #[serde(default)]
    pub kills: u64,
    #[serde(default)]
    pub deaths: u64,
    #[serde(default)]
    pub assists: u64,
    /// 对位击杀：对手 puuid -> 击杀次数
    #[serde(rename = "killsAgainst", default)]
    pub kills_against: BTreeMap<String, u64>,
}

impl Player {
    pub fn new(puuid: impl Into<String>) -> Self {
        Self {
            puuid: puuid.into(),
            name: String::new(),
            tag: String::new(),
            card: String::new(),
            kills: 0,
            deaths: 0,
            assists: 0,
            kills_against: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>, tag: impl Into<String>) -> Self {
        self.name = name.into();
        self.tag = tag.into();
        self
    }

    /// 清空统计字段，只保留身份与展示信息
    pub fn identity(&self) -> Player {
        Player {
            puuid: self.puuid.clone(),
            name: self.name.clone(),
            tag: self.tag.clone(),
            card: self.card.clone(),
            kills: 0,
            deaths: 0,
            assists: 0,
            kills_against: BTreeMap::new(),
        }
    }

    /// 没有任何击杀 / 死亡 / 对位数据
    pub fn has_no_stats(&self) -> bool {
        self.kills == 0 && self.deaths == 0 && self.kills_against.is_empty()
    }

    /// 用比赛快照刷新展示信息，返回是否有变化；快照缺失的字段保持原值
    pub fn refresh_from_snapshot(&mut self, snapshot: &PlayerSnapshot) -> bool {
        let name = snapshot.name.as_deref().unwrap_or(&self.name).to_string();
        let tag = snapshot.tag.as_deref().unwrap_or(&self.tag).to_string();
        let card = snapshot.small_card().unwrap_or(&self.card).to_string();

        let changed = self.name != name || self.tag != tag || self.card != card;
        self.name = name;
        self.tag = tag;
        self.card = card;
        changed
    }
}

/// 名单文档（user.json）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterDocument {
    #[serde(default)]
    pub players: Vec<Player>,
    /// 同步游标：最近一次处理的比赛 id
    #[serde(rename = "newestMatchID", default)]
    pub newest_match_id: Option<String>,
}

impl RosterDocument {
    pub fn from_slice(path: &str, content: &[u8]) -> Result<Self> {
        if content.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(LeaderboardSyncError::data_format(path, "document is empty"));
        }
        serde_json::from_slice(content).map_err(|e| LeaderboardSyncError::data_format(path, e))
    }

    pub fn to_pretty_json(&self) -> Result<Vec<u8>> {
        to_pretty_json(self)
    }

    pub fn puuids(&self) -> HashSet<&str> {
        self.players.iter().map(|p| p.puuid.as_str()).collect()
    }
}

/// 排行榜文档（leaderboard.json）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardDocument {
    #[serde(default)]
    pub players: Vec<Player>,
}

impl LeaderboardDocument {
    pub fn from_slice(path: &str, content: &[u8]) -> Result<Self> {
        serde_json::from_slice(content).map_err(|e| LeaderboardSyncError::data_format(path, e))
    }

    pub fn to_pretty_json(&self) -> Result<Vec<u8>> {
        to_pretty_json(self)
    }

    /// 未初始化：没有玩家，或者所有玩家都没有统计数据
    pub fn is_uninitialized(&self) -> bool {
        self.players.iter().all(Player::has_no_stats)
    }

    pub fn player(&self, puuid: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.puuid == puuid)
    }

    pub fn total_kills(&self) -> u64 {
        self.players.iter().map(|p| p.kills).sum()
    }

    pub fn total_deaths(&self) -> u64 {
        self.players.iter().map(|p| p.deaths).sum()
    }
}

/// 比赛元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchMetadata {
    #[serde(rename = "matchid")]
    pub match_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CardAssets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerAssets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<CardAssets>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 单场比赛中的玩家快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub puuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<PlayerAssets>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlayerSnapshot {
    pub fn small_card(&self) -> Option<&str> {
        self.assets
            .as_ref()
            .and_then(|a| a.card.as_ref())
            .and_then(|c| c.small.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchPlayers {
    #[serde(default)]
    pub all_players: Vec<PlayerSnapshot>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillAssistant {
    #[serde(default)]
    pub assistant_puuid: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 击杀事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillEvent {
    #[serde(default)]
    pub killer_puuid: Option<String>,
    #[serde(default)]
    pub victim_puuid: Option<String>,
    #[serde(default)]
    pub assistants: Vec<KillAssistant>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl KillEvent {
    pub fn new(killer: &str, victim: &str, assistants: &[&str]) -> Self {
        Self {
            killer_puuid: Some(killer.to_string()),
            victim_puuid: Some(victim.to_string()),
            assistants: assistants
                .iter()
                .map(|a| KillAssistant {
                    assistant_puuid: Some(a.to_string()),
                    extra: Map::new(),
                })
                .collect(),
            extra: Map::new(),
        }
    }
}

/// 比赛记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub metadata: MatchMetadata,
    #[serde(default)]
    pub players: MatchPlayers,
    /// 缺失时聚合会跳过该场比赛
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kills: Option<Vec<KillEvent>>,
    /// 回合级明细，落盘前去掉
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rounds: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MatchRecord {
    pub fn new(match_id: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            metadata: MatchMetadata {
                match_id: match_id.into(),
                mode: Some(mode.into()),
                mode_id: None,
                extra: Map::new(),
            },
            players: MatchPlayers::default(),
            kills: Some(Vec::new()),
            rounds: None,
            extra: Map::new(),
        }
    }

    pub fn with_players<'a>(mut self, puuids: impl IntoIterator<Item = &'a str>) -> Self {
        self.players.all_players = puuids
            .into_iter()
            .map(|puuid| PlayerSnapshot {
                puuid: puuid.to_string(),
                name: None,
                tag: None,
                assets: None,
                extra: Map::new(),
            })
            .collect();
        self
    }

    pub fn with_kills(mut self, kills: Vec<KillEvent>) -> Self {
        self.kills = Some(kills);
        self
    }

    pub fn match_id(&self) -> &str {
        &self.metadata.match_id
    }

    pub fn participant_puuids(&self) -> impl Iterator<Item = &str> {
        self.players.all_players.iter().map(|p| p.puuid.as_str())
    }

    pub fn snapshot_for(&self, puuid: &str) -> Option<&PlayerSnapshot> {
        self.players.all_players.iter().find(|p| p.puuid == puuid)
    }

    /// 落盘形态：去掉回合明细
    pub fn for_persistence(&self) -> MatchRecord {
        MatchRecord {
            rounds: None,
            ..self.clone()
        }
    }

    pub fn from_slice(path: &str, content: &[u8]) -> Result<Self> {
        serde_json::from_slice(content).map_err(|e| LeaderboardSyncError::data_format(path, e))
    }

    pub fn to_pretty_json(&self) -> Result<Vec<u8>> {
        to_pretty_json(&self.for_persistence())
    }
}

/// 4 空格缩进的 JSON，与仓库里已有文件格式一致
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}
