//! 名单筛选
//!
//! 只接受：
//! - 模式为 custom（mode 或 mode_id 任一匹配，大小写不敏感）
//! - 所有参赛者都在名单内
//! - 参赛人数为 6 或 8

use std::collections::HashSet;

use tracing::debug;

use crate::config::SyncConfig;
use crate::entities::{MatchRecord, RosterDocument};

/// 排除原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    WrongMode,
    ForeignPlayer(String),
    LineupSize(usize),
}

/// 筛选结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Included,
    Excluded(ExclusionReason),
}

impl FilterDecision {
    pub fn is_included(&self) -> bool {
        matches!(self, FilterDecision::Included)
    }
}

/// 名单筛选器
#[derive(Debug, Clone)]
pub struct RosterFilter {
    roster: HashSet<String>,
    lineup_sizes: Vec<usize>,
    required_mode: String,
}

impl RosterFilter {
    pub fn new<I, S>(roster_puuids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roster: roster_puuids.into_iter().map(Into::into).collect(),
            lineup_sizes: vec![6, 8],
            required_mode: "custom".to_string(),
        }
    }

    pub fn for_roster(roster: &RosterDocument, config: &SyncConfig) -> Self {
        Self::new(roster.players.iter().map(|p| p.puuid.clone()))
            .with_lineup_sizes(config.lineup_sizes.clone())
            .with_mode(config.required_mode.clone())
    }

    pub fn with_lineup_sizes(mut self, sizes: Vec<usize>) -> Self {
        self.lineup_sizes = sizes;
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.required_mode = mode.into();
        self
    }

    fn mode_matches(&self, value: Option<&str>) -> bool {
        value.is_some_and(|v| v.eq_ignore_ascii_case(&self.required_mode))
    }

    pub fn evaluate(&self, record: &MatchRecord) -> FilterDecision {
        let metadata = &record.metadata;
        if !self.mode_matches(metadata.mode.as_deref()) && !self.mode_matches(metadata.mode_id.as_deref()) {
            return FilterDecision::Excluded(ExclusionReason::WrongMode);
        }

        if let Some(foreign) = record.participant_puuids().find(|p| !self.roster.contains(*p)) {
            return FilterDecision::Excluded(ExclusionReason::ForeignPlayer(foreign.to_string()));
        }

        let count = record.players.all_players.len();
        if !self.lineup_sizes.contains(&count) {
            return FilterDecision::Excluded(ExclusionReason::LineupSize(count));
        }

        FilterDecision::Included
    }

    /// 保留相关比赛，维持原有顺序
    pub fn filter(&self, records: Vec<MatchRecord>) -> Vec<MatchRecord> {
        records
            .into_iter()
            .filter(|record| match self.evaluate(record) {
                FilterDecision::Included => {
                    debug!(
                        "✅ 比赛符合条件: match_id={}, players={}",
                        record.match_id(),
                        record.players.all_players.len()
                    );
                    true
                }
                FilterDecision::Excluded(reason) => {
                    debug!("跳过比赛: match_id={}, reason={:?}", record.match_id(), reason);
                    false
                }
            })
            .collect()
    }
}
