//! 同步事件
//!
//! 同步状态机的每次迁移、筛选结果、提交结果都会广播出去，
//! 没有订阅者时发送失败属正常情况，不影响同步流程。

use tokio::sync::broadcast;
use tracing::debug;

use crate::sync::{CommitReport, SyncState};

/// 同步事件
#[derive(Debug, Clone)]
pub enum SyncEvent {
    StateChanged { from: SyncState, to: SyncState },
    MatchesFiltered { fetched: usize, relevant: usize },
    CommitCompleted(CommitReport),
    BackfillCompleted { persisted: Vec<String> },
    LeaderboardRebuilt { players: usize },
}

impl SyncEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::StateChanged { .. } => "state_changed",
            SyncEvent::MatchesFiltered { .. } => "matches_filtered",
            SyncEvent::CommitCompleted(_) => "commit_completed",
            SyncEvent::BackfillCompleted { .. } => "backfill_completed",
            SyncEvent::LeaderboardRebuilt { .. } => "leaderboard_rebuilt",
        }
    }
}

/// 事件总线
#[derive(Debug, Clone)]
pub struct SyncEventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl SyncEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 发布事件
    pub fn emit(&self, event: SyncEvent) {
        debug!("Emitting event: {}", event.event_type());
        if let Err(e) = self.sender.send(event) {
            debug!("事件无订阅者: {}", e.0.event_type());
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SyncEventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_without_subscribers_is_harmless() {
        let bus = SyncEventBus::default();
        bus.emit(SyncEvent::MatchesFiltered { fetched: 3, relevant: 1 });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_state_changes() {
        let bus = SyncEventBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit(SyncEvent::StateChanged {
            from: SyncState::Idle,
            to: SyncState::LoadingRoster,
        });

        match rx.recv().await.unwrap() {
            SyncEvent::StateChanged { from, to } => {
                assert_eq!(from, SyncState::Idle);
                assert_eq!(to, SyncState::LoadingRoster);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
