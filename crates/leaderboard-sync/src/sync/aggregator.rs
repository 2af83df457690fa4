/// 排行榜聚合器
///
/// 职责：
/// - 从全部比赛记录重新计算每个玩家的击杀 / 死亡 / 助攻和对位击杀
/// - 每次都从零开始重放，不依赖上一次的排行榜
///
/// 聚合与比赛顺序无关；同一场比赛（按 matchid）只计一次。

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::entities::{KillEvent, LeaderboardDocument, MatchRecord, Player};

/// 排行榜聚合器
pub struct StatsAggregator {
    /// 名单玩家（仅身份信息），顺序即输出顺序
    players: Vec<Player>,
    /// puuid -> players 下标
    index: HashMap<String, usize>,
    /// 已计入的比赛
    seen_matches: HashSet<String>,
}

impl StatsAggregator {
    /// 创建聚合器，统计字段全部清零
    pub fn new(roster: &[Player]) -> Self {
        let mut players = Vec::with_capacity(roster.len());
        let mut index = HashMap::with_capacity(roster.len());
        for player in roster {
            if index.contains_key(&player.puuid) {
                warn!("名单中存在重复玩家，忽略: puuid={}", player.puuid);
                continue;
            }
            index.insert(player.puuid.clone(), players.len());
            players.push(player.identity());
        }

        Self {
            players,
            index,
            seen_matches: HashSet::new(),
        }
    }

    /// 一次性计算
    pub fn compute(matches: &[MatchRecord], roster: &[Player]) -> LeaderboardDocument {
        let mut aggregator = Self::new(roster);
        for record in matches {
            aggregator.add_match(record);
        }
        aggregator.finish()
    }

    /// 计入一场比赛，返回是否被计入
    pub fn add_match(&mut self, record: &MatchRecord) -> bool {
        let match_id = record.match_id();
        if !self.seen_matches.insert(match_id.to_string()) {
            debug!("比赛已计入，跳过: {}", match_id);
            return false;
        }

        let Some(kills) = record.kills.as_ref() else {
            warn!("⚠️ 比赛没有击杀列表，跳过: {}", match_id);
            return false;
        };

        for kill in kills {
            self.apply_kill(kill);
        }
        true
    }

    fn apply_kill(&mut self, kill: &KillEvent) {
        let killer = kill.killer_puuid.as_deref().and_then(|p| self.index.get(p).copied());
        let victim = kill.victim_puuid.as_deref().and_then(|p| self.index.get(p).copied());

        if let Some(victim) = victim {
            self.players[victim].deaths += 1;
        }

        // 自杀只算死亡
        if kill.killer_puuid.is_some() && kill.killer_puuid == kill.victim_puuid {
            return;
        }

        if let Some(killer) = killer {
            self.players[killer].kills += 1;
            if let Some(victim) = victim {
                let victim_puuid = self.players[victim].puuid.clone();
                *self.players[killer].kills_against.entry(victim_puuid).or_insert(0) += 1;
            }
        }

        for assistant in &kill.assistants {
            let index = assistant
                .assistant_puuid
                .as_deref()
                .and_then(|p| self.index.get(p).copied());
            if let Some(index) = index {
                self.players[index].assists += 1;
            }
        }
    }

    /// 已计入的比赛数
    pub fn match_count(&self) -> usize {
        self.seen_matches.len()
    }

    pub fn finish(self) -> LeaderboardDocument {
        debug!(
            "排行榜计算完成: players={}, matches={}",
            self.players.len(),
            self.seen_matches.len()
        );
        LeaderboardDocument { players: self.players }
    }
}

/// 从比赛记录和名单计算排行榜（不落盘）
pub fn compute_leaderboard(matches: &[MatchRecord], roster: &[Player]) -> LeaderboardDocument {
    StatsAggregator::compute(matches, roster)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(ids: &[&str]) -> Vec<Player> {
        ids.iter().map(|id| Player::new(*id).with_name(id.to_uppercase(), "000")).collect()
    }

    fn sample_matches() -> Vec<MatchRecord> {
        vec![
            MatchRecord::new("m1", "Custom").with_kills(vec![
                KillEvent::new("a", "b", &["c", "d"]),
                KillEvent::new("b", "a", &[]),
                KillEvent::new("c", "d", &["a"]),
            ]),
            MatchRecord::new("m2", "Custom").with_kills(vec![
                KillEvent::new("a", "b", &["x"]),
                KillEvent::new("x", "c", &["d"]),
                KillEvent::new("d", "y", &[]),
            ]),
        ]
    }

    #[test]
    fn test_kill_matrix_for_single_event() {
        let matches = vec![MatchRecord::new("m1", "Custom").with_kills(vec![KillEvent::new("a", "b", &["c", "d"])])];
        let board = compute_leaderboard(&matches, &roster(&["a", "b", "c", "d"]));

        let a = board.player("a").unwrap();
        assert_eq!(a.kills, 1);
        assert_eq!(a.kills_against.get("b"), Some(&1));
        assert_eq!(board.player("b").unwrap().deaths, 1);
        assert_eq!(board.player("c").unwrap().assists, 1);
        assert_eq!(board.player("d").unwrap().assists, 1);
        assert_eq!(board.player("b").unwrap().kills, 0);
    }

    #[test]
    fn test_self_kill_only_counts_death() {
        let matches = vec![MatchRecord::new("m1", "Custom").with_kills(vec![KillEvent::new("a", "a", &["b"])])];
        let board = compute_leaderboard(&matches, &roster(&["a", "b"]));

        let a = board.player("a").unwrap();
        assert_eq!(a.deaths, 1);
        assert_eq!(a.kills, 0);
        assert!(a.kills_against.is_empty());
        assert_eq!(board.player("b").unwrap().assists, 0);
    }

    #[test]
    fn test_unknown_players_do_not_enter_matrix() {
        let board = compute_leaderboard(&sample_matches(), &roster(&["a", "b", "c", "d"]));

        // x 杀 c：c 死亡 +1，d 助攻 +1，x 不在榜上
        assert_eq!(board.player("c").unwrap().deaths, 1);
        assert!(board.player("x").is_none());
        // d 杀 y：d 击杀 +1，但对位表没有 y
        let d = board.player("d").unwrap();
        assert_eq!(d.kills, 1);
        assert!(d.kills_against.is_empty());
        assert_eq!(d.assists, 2);
    }

    #[test]
    fn test_deaths_are_conserved() {
        let matches = sample_matches();
        let board = compute_leaderboard(&matches, &roster(&["a", "b", "c", "d"]));

        let known = ["a", "b", "c", "d"];
        let expected_deaths = matches
            .iter()
            .flat_map(|m| m.kills.iter().flatten())
            .filter(|k| k.victim_puuid.as_deref().map_or(false, |v| known.contains(&v)))
            .count() as u64;
        assert_eq!(board.total_deaths(), expected_deaths);

        let matrix_total: u64 = board.players.iter().flat_map(|p| p.kills_against.values()).sum();
        assert_eq!(matrix_total, 4);
    }

    #[test]
    fn test_idempotent_and_order_independent() {
        let players = roster(&["a", "b", "c", "d"]);
        let matches = sample_matches();

        let first = compute_leaderboard(&matches, &players).to_pretty_json().unwrap();
        let second = compute_leaderboard(&matches, &players).to_pretty_json().unwrap();
        assert_eq!(first, second);

        let mut reversed = matches.clone();
        reversed.reverse();
        let third = compute_leaderboard(&reversed, &players).to_pretty_json().unwrap();
        assert_eq!(first, third);
    }

    #[test]
    fn test_result_follows_roster_order_and_resets_stats() {
        let mut players = roster(&["d", "a", "c", "b"]);
        players[0].kills = 99;
        players[0].kills_against.insert("a".to_string(), 7);

        let board = compute_leaderboard(&sample_matches(), &players);
        let order: Vec<&str> = board.players.iter().map(|p| p.puuid.as_str()).collect();
        assert_eq!(order, vec!["d", "a", "c", "b"]);
        assert_eq!(board.players[0].kills, 1);
        assert_eq!(board.players[0].name, "D");
    }

    #[test]
    fn test_matches_without_kills_and_duplicates_are_skipped() {
        let mut no_kills = MatchRecord::new("m3", "Custom");
        no_kills.kills = None;

        let mut matches = sample_matches();
        matches.push(no_kills);
        matches.push(sample_matches().remove(0));

        let mut aggregator = StatsAggregator::new(&roster(&["a", "b", "c", "d"]));
        let counted = matches.iter().filter(|m| aggregator.add_match(m)).count();
        assert_eq!(counted, 2);

        let board = aggregator.finish();
        assert_eq!(board, compute_leaderboard(&sample_matches(), &roster(&["a", "b", "c", "d"])));
    }
}
