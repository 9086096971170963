use anyhow::Result;
use async_trait::async_trait;

use crate::model::{LeaderboardRow, RankingRow};

/// Authoritative ranking provider consumed by the broadcast cycle.
#[async_trait]
pub trait RankingSource: Send + Sync {
    /// Recompute global and weekly ranks. An error aborts the whole cycle.
    async fn recompute_ranks(&self) -> Result<()>;

    /// Every ranked user, used to build the current snapshot.
    async fn list_all(&self) -> Result<Vec<RankingRow>>;

    async fn top_global(&self, limit: usize, offset: usize) -> Result<Vec<LeaderboardRow>>;

    async fn top_weekly(&self, limit: usize, offset: usize) -> Result<Vec<LeaderboardRow>>;
}
