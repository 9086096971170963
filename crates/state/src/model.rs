use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque user identity as handed out by the ranking source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A full ranking row as returned by `RankingSource::list_all`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingRow {
    pub user_id: UserId,
    pub display_name: String,
    pub global_rank: u32,
    pub weekly_rank: u32,
    pub all_time_pnl: Decimal,
    pub weekly_pnl: Decimal,
}

/// A top-N row as returned by `RankingSource::top_global` / `top_weekly`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub user_id: UserId,
    pub display_name: String,
    pub rank: u32,
    pub pnl: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankSnapshotEntry {
    pub user_id: UserId,
    pub global_rank: u32,
    pub weekly_rank: u32,
    pub all_time_pnl: Decimal,
    pub weekly_pnl: Decimal,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("user {0} appears more than once in the ranking")]
    DuplicateUser(UserId),
    #[error("user {user} has a zero {kind} rank; ranks are 1-based")]
    ZeroRank { user: UserId, kind: &'static str },
}

/// The full ranking state observed at one instant, keyed by user.
///
/// Backed by a `BTreeMap` so iteration order, and therefore diff output, is
/// deterministic for identical inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    entries: BTreeMap<UserId, RankSnapshotEntry>,
    captured_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn empty(captured_at: DateTime<Utc>) -> Self {
        Self {
            entries: BTreeMap::new(),
            captured_at,
        }
    }

    /// Build a snapshot from source rows, stamping every entry with `captured_at`.
    pub fn from_rows<I>(rows: I, captured_at: DateTime<Utc>) -> Result<Self, SnapshotError>
    where
        I: IntoIterator<Item = RankingRow>,
    {
        let mut entries = BTreeMap::new();
        for row in rows {
            if row.global_rank == 0 {
                return Err(SnapshotError::ZeroRank {
                    user: row.user_id,
                    kind: "global",
                });
            }
            if row.weekly_rank == 0 {
                return Err(SnapshotError::ZeroRank {
                    user: row.user_id,
                    kind: "weekly",
                });
            }
            if entries.contains_key(&row.user_id) {
                return Err(SnapshotError::DuplicateUser(row.user_id));
            }
            let entry = RankSnapshotEntry {
                user_id: row.user_id.clone(),
                global_rank: row.global_rank,
                weekly_rank: row.weekly_rank,
                all_time_pnl: row.all_time_pnl,
                weekly_pnl: row.weekly_pnl,
                observed_at: captured_at,
            };
            entries.insert(row.user_id, entry);
        }
        Ok(Self {
            entries,
            captured_at,
        })
    }

    pub fn get(&self, user_id: &UserId) -> Option<&RankSnapshotEntry> {
        self.entries.get(user_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RankSnapshotEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

/// Per-user rank movement between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankChangeEvent {
    pub user_id: UserId,
    pub previous_global_rank: u32,
    pub current_global_rank: u32,
    pub previous_weekly_rank: u32,
    pub current_weekly_rank: u32,
    /// `previous_global_rank - current_global_rank`; positive means the user climbed.
    pub rank_change: i64,
    pub observed_at: DateTime<Utc>,
}

impl RankChangeEvent {
    pub fn improved(&self) -> bool {
        self.rank_change > 0
    }
}

/// Entry of the public leaderboard message. Carries nothing beyond the
/// already-public identity, display name, rank and PnL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicEntry {
    pub user_id: UserId,
    pub display_name: String,
    pub rank: u32,
    pub pnl: Decimal,
}

impl From<LeaderboardRow> for PublicEntry {
    fn from(row: LeaderboardRow) -> Self {
        Self {
            user_id: row.user_id,
            display_name: row.display_name,
            rank: row.rank,
            pnl: row.pnl,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicLeaderboardUpdate {
    pub top_global: Vec<PublicEntry>,
    pub top_weekly: Vec<PublicEntry>,
    pub observed_at: DateTime<Utc>,
}

impl PublicLeaderboardUpdate {
    /// Build the public update, keeping at most `top_n` rows per ranking
    /// regardless of how many the source returned.
    pub fn new(
        global: Vec<LeaderboardRow>,
        weekly: Vec<LeaderboardRow>,
        top_n: usize,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            top_global: global.into_iter().take(top_n).map(PublicEntry::from).collect(),
            top_weekly: weekly.into_iter().take(top_n).map(PublicEntry::from).collect(),
            observed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, global: u32, weekly: u32) -> RankingRow {
        RankingRow {
            user_id: UserId::new(id),
            display_name: format!("trader-{id}"),
            global_rank: global,
            weekly_rank: weekly,
            all_time_pnl: Decimal::new(1_250, 2),
            weekly_pnl: Decimal::ZERO,
        }
    }

    fn lb_row(id: &str, rank: u32) -> LeaderboardRow {
        LeaderboardRow {
            user_id: UserId::new(id),
            display_name: format!("trader-{id}"),
            rank,
            pnl: Decimal::from(100 - rank as i64),
        }
    }

    #[test]
    fn snapshot_stamps_entries_with_capture_time() {
        let at = Utc::now();
        let snap = Snapshot::from_rows(vec![row("a", 1, 2), row("b", 2, 1)], at).unwrap();
        assert_eq!(snap.len(), 2);
        assert!(snap.iter().all(|e| e.observed_at == at));
        assert_eq!(snap.captured_at(), at);
    }

    #[test]
    fn snapshot_rejects_duplicate_users() {
        let err = Snapshot::from_rows(vec![row("a", 1, 1), row("a", 2, 2)], Utc::now())
            .expect_err("duplicate should be rejected");
        assert_eq!(err, SnapshotError::DuplicateUser(UserId::new("a")));
    }

    #[test]
    fn snapshot_rejects_zero_ranks() {
        let err = Snapshot::from_rows(vec![row("a", 0, 1)], Utc::now()).unwrap_err();
        assert!(matches!(err, SnapshotError::ZeroRank { kind: "global", .. }));
        let err = Snapshot::from_rows(vec![row("a", 1, 0)], Utc::now()).unwrap_err();
        assert!(matches!(err, SnapshotError::ZeroRank { kind: "weekly", .. }));
    }

    #[test]
    fn public_update_truncates_to_top_n() {
        let global: Vec<_> = (1..=15).map(|r| lb_row(&format!("g{r}"), r)).collect();
        let weekly: Vec<_> = (1..=3).map(|r| lb_row(&format!("w{r}"), r)).collect();
        let update = PublicLeaderboardUpdate::new(global, weekly, 10, Utc::now());
        assert_eq!(update.top_global.len(), 10);
        assert_eq!(update.top_weekly.len(), 3);
        assert_eq!(update.top_global[0].rank, 1);
        assert_eq!(update.top_global[9].rank, 10);
    }

    #[test]
    fn public_entry_serializes_only_public_fields() {
        let entry = PublicEntry::from(lb_row("u1", 1));
        let value = serde_json::to_value(&entry).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["display_name", "pnl", "rank", "user_id"]);
    }
}
