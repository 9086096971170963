//! Leaderboard broadcast cycle.
//!
//! One cycle, strictly in order:
//!
//! ```text
//! recompute ─► list_all ─► diff(previous, current)
//!     ─► private rank_changed ─► public leaderboard_updated
//!     ─► private achievement_earned ─► swap snapshot
//! ```
//!
//! A failed cycle never swaps, so the next cycle diffs against the same
//! baseline again.

mod config;
mod error;
mod service;

pub use config::{
    BroadcasterConfig, ConfigError, DEFAULT_INTERVAL, DEFAULT_MIN_GAP, DEFAULT_TOP_N,
};
pub use error::BroadcastError;
pub use service::{
    BroadcasterStatus, CycleOutcome, CycleSummary, LeaderboardBroadcaster, SkipReason,
};
