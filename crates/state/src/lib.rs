//! Ranking state: snapshots, the snapshot diff and the live snapshot store.

mod diff;
mod model;
mod source;
mod store;

pub use diff::diff;
pub use model::{
    LeaderboardRow, PublicEntry, PublicLeaderboardUpdate, RankChangeEvent, RankSnapshotEntry,
    RankingRow, Snapshot, SnapshotError, UserId,
};
pub use source::RankingSource;
pub use store::SnapshotStore;
