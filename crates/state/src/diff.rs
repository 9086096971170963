//! Snapshot diff.
//!
//! Compares the previously observed ranking with the current one and emits a
//! `RankChangeEvent` per user whose global or weekly rank moved. Users that
//! only exist in the current snapshot are silent, departures are not modeled.
//!
//! Output is sorted by descending `|rank_change|` with a stable sort, so ties
//! keep the order of iteration over the current snapshot.

use std::cmp::Reverse;

use crate::model::{RankChangeEvent, Snapshot};

pub fn diff(previous: &Snapshot, current: &Snapshot) -> Vec<RankChangeEvent> {
    let observed_at = current.captured_at();
    let mut changes: Vec<RankChangeEvent> = current
        .iter()
        .filter_map(|now| {
            let before = previous.get(&now.user_id)?;
            if before.global_rank == now.global_rank && before.weekly_rank == now.weekly_rank {
                return None;
            }
            Some(RankChangeEvent {
                user_id: now.user_id.clone(),
                previous_global_rank: before.global_rank,
                current_global_rank: now.global_rank,
                previous_weekly_rank: before.weekly_rank,
                current_weekly_rank: now.weekly_rank,
                rank_change: i64::from(before.global_rank) - i64::from(now.global_rank),
                observed_at,
            })
        })
        .collect();

    // slice::sort_by_key is stable
    changes.sort_by_key(|change| Reverse(change.rank_change.unsigned_abs()));
    changes
}
