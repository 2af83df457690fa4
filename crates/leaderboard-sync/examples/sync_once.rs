//! 单次同步演示
//!
//! 用法：
//!   cargo run --example sync_once -- sync.json          # GitHub 存储
//!   cargo run --example sync_once -- sync.json ./data   # 本地 sled 存储

use std::path::PathBuf;
use std::sync::Arc;

use leaderboard_sync::{
    DocumentStore, GitHubContentsStore, HenrikFeedClient, SledDocumentStore, SyncConfig, SyncEngine, SyncEvent,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = PathBuf::from(args.next().unwrap_or_else(|| "sync.json".to_string()));
    let local_dir = args.next().map(PathBuf::from);

    let config = SyncConfig::from_json_file(&config_path).await?;

    let store: Arc<dyn DocumentStore> = match &local_dir {
        Some(dir) => Arc::new(SledDocumentStore::open(dir).await?),
        None => {
            config.validate_github()?;
            Arc::new(GitHubContentsStore::new(config.github.clone(), &config.http_client)?)
        }
    };
    let feed = Arc::new(HenrikFeedClient::new(config.feed.clone(), &config.http_client)?);

    let engine = SyncEngine::new(store, feed, config);
    let mut events = engine.subscribe();

    println!("\n==============================================");
    println!("🎮 排行榜同步");
    println!("==============================================\n");

    let result = engine.synchronize().await;

    while let Ok(event) = events.try_recv() {
        match event {
            SyncEvent::StateChanged { from, to } => println!("   {:?} -> {:?}", from, to),
            other => println!("   事件: {}", other.event_type()),
        }
    }

    let outcome = result?;
    println!("\n新比赛: {:?}", outcome.new_match_ids);
    println!("补存比赛: {:?}", outcome.backfilled_match_ids);

    if let Some(board) = &outcome.leaderboard {
        let mut players: Vec<_> = board.players.iter().collect();
        players.sort_by(|a, b| b.kills.cmp(&a.kills));
        for player in players {
            println!(
                "   {:<20} K {:>4}  D {:>4}  A {:>4}",
                format!("{}#{}", player.name, player.tag),
                player.kills,
                player.deaths,
                player.assists
            );
        }
    }

    if let Some(delay) = outcome.settle_delay {
        println!("\n⏳ 回读存储前建议等待 {:?}", delay);
    }

    Ok(())
}
