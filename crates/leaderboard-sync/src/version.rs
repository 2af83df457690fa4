//! 版本与构建元信息
//!
//! - **Crate Version** → Cargo.toml（唯一权威源）
//! - **Build Time** → build.rs 中由 vergen 生成

/// crate semver，来自 Cargo.toml
pub const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// build time（由 vergen 在 build.rs 中生成）
pub const BUILD_TIME: &str = env!("VERGEN_BUILD_TIMESTAMP");

/// 提交信息尾注，标记由哪个版本写入
pub fn commit_trailer() -> String {
    format!("leaderboard-sync {}", CRATE_VERSION)
}
