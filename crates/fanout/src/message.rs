//! Wire payloads for the three outbound event kinds.
//!
//! Timestamps are Unix milliseconds.

use achievements::{AchievementKind, AchievementNotification};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use state::{PublicEntry, PublicLeaderboardUpdate, RankChangeEvent};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankChangedPayload {
    pub previous_global_rank: u32,
    pub current_global_rank: u32,
    pub previous_weekly_rank: u32,
    pub current_weekly_rank: u32,
    pub rank_change: i64,
    pub improved: bool,
    pub timestamp: i64,
}

impl From<&RankChangeEvent> for RankChangedPayload {
    fn from(change: &RankChangeEvent) -> Self {
        Self {
            previous_global_rank: change.previous_global_rank,
            current_global_rank: change.current_global_rank,
            previous_weekly_rank: change.previous_weekly_rank,
            current_weekly_rank: change.current_weekly_rank,
            rank_change: change.rank_change,
            improved: change.improved(),
            timestamp: change.observed_at.timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementEarnedPayload {
    pub achievement_kind: AchievementKind,
    pub title: String,
    pub description: String,
    pub timestamp: i64,
}

impl From<&AchievementNotification> for AchievementEarnedPayload {
    fn from(n: &AchievementNotification) -> Self {
        Self {
            achievement_kind: n.kind,
            title: n.title.clone(),
            description: n.description.clone(),
            timestamp: n.observed_at.timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicRow {
    pub user_id: String,
    pub display_name: String,
    pub rank: u32,
    pub pnl: Decimal,
}

impl From<&PublicEntry> for PublicRow {
    fn from(entry: &PublicEntry) -> Self {
        Self {
            user_id: entry.user_id.to_string(),
            display_name: entry.display_name.clone(),
            rank: entry.rank,
            pnl: entry.pnl,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardUpdatedPayload {
    pub top_global: Vec<PublicRow>,
    pub top_weekly: Vec<PublicRow>,
    pub timestamp: i64,
}

impl From<&PublicLeaderboardUpdate> for LeaderboardUpdatedPayload {
    fn from(update: &PublicLeaderboardUpdate) -> Self {
        Self {
            top_global: update.top_global.iter().map(PublicRow::from).collect(),
            top_weekly: update.top_weekly.iter().map(PublicRow::from).collect(),
            timestamp: update.observed_at.timestamp_millis(),
        }
    }
}
