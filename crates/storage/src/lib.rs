use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use state::{LeaderboardRow, RankingRow, RankingSource, UserId};
use tracing::{debug, info};

mod url;

pub use url::{parse_sqlite_url, prepare_sqlite_url, SqliteTarget};

pub const INIT_SQL: &str = include_str!("../../../scripts/init_db.sql");


#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct TraderRecord {
    user_id: String,
    display_name: String,
    global_rank: i64,
    weekly_rank: i64,
    all_time_pnl: String,
    weekly_pnl: String,
}

#[derive(sqlx::FromRow)]
struct PnlRecord {
    user_id: String,
    all_time_pnl: String,
    weekly_pnl: String,
}

#[derive(sqlx::FromRow)]
struct BoardRecord {
    user_id: String,
    display_name: String,
    rank: i64,
    pnl: String,
}

fn rank(value: i64, user_id: &str) -> Result<u32> {
    u32::try_from(value).with_context(|| format!("rank {value} out of range for {user_id}"))
}

fn pnl(value: &str, user_id: &str) -> Result<Decimal> {
    Decimal::from_str(value).with_context(|| format!("invalid pnl `{value}` for {user_id}"))
}

/// 1-based position per entry: exact `Decimal` PnL descending, ties by user
/// id ascending.
fn rank_positions(entries: &[(String, Decimal)]) -> Vec<u32> {
    let mut order: Vec<usize> = (0..entries.len()).collect();
    order.sort_by(|&a, &b| {
        entries[b]
            .1
            .cmp(&entries[a].1)
            .then_with(|| entries[a].0.cmp(&entries[b].0))
    });
    let mut ranks = vec![0; entries.len()];
    for (position, index) in order.into_iter().enumerate() {
        ranks[index] = u32::try_from(position + 1).unwrap_or(u32::MAX);
    }
    ranks
}

impl TryFrom<TraderRecord> for RankingRow {
    type Error = anyhow::Error;

    fn try_from(r: TraderRecord) -> Result<Self> {
        Ok(RankingRow {
            global_rank: rank(r.global_rank, &r.user_id)?,
            weekly_rank: rank(r.weekly_rank, &r.user_id)?,
            all_time_pnl: pnl(&r.all_time_pnl, &r.user_id)?,
            weekly_pnl: pnl(&r.weekly_pnl, &r.user_id)?,
            display_name: r.display_name,
            user_id: UserId::new(r.user_id),
        })
    }
}

impl TryFrom<BoardRecord> for LeaderboardRow {
    type Error = anyhow::Error;

    fn try_from(r: BoardRecord) -> Result<Self> {
        Ok(LeaderboardRow {
            rank: rank(r.rank, &r.user_id)?,
            pnl: pnl(&r.pnl, &r.user_id)?,
            display_name: r.display_name,
            user_id: UserId::new(r.user_id),
        })
    }
}

impl Store {
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)?.create_if_missing(true);
        // every connection to `sqlite::memory:` is a separate database
        let max_connections = match parse_sqlite_url(path)? {
            SqliteTarget::Memory => 1,
            SqliteTarget::File(_) => 5,
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        run_init_sql(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn insert_run(&self, run_id: &str, git_sha: Option<&str>) -> Result<()> {
        let host = hostname::get()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        sqlx::query(
            "INSERT OR REPLACE INTO runs (run_id, started_at_ms, git_sha, host) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(run_id)
        .bind(Utc::now().timestamp_millis())
        .bind(git_sha)
        .bind(host)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn log_incident(
        &self,
        run_id: &str,
        severity: &str,
        kind: &str,
        message: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO incidents (run_id, ts_ms, severity, kind, message) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(run_id)
        .bind(Utc::now().timestamp_millis())
        .bind(severity)
        .bind(kind)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert or refresh a trader's PnL. Ranks are left for `recompute_ranks`.
    pub async fn upsert_trader(
        &self,
        user_id: &UserId,
        display_name: &str,
        all_time_pnl: Decimal,
        weekly_pnl: Decimal,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO traders (user_id, display_name, all_time_pnl, weekly_pnl, updated_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT (user_id) DO UPDATE SET \
                display_name = excluded.display_name, \
                all_time_pnl = excluded.all_time_pnl, \
                weekly_pnl = excluded.weekly_pnl, \
                updated_at_ms = excluded.updated_at_ms",
        )
        .bind(user_id.as_str())
        .bind(display_name)
        .bind(all_time_pnl.to_string())
        .bind(weekly_pnl.to_string())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn board(
        &self,
        rank_column: &str,
        pnl_column: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LeaderboardRow>> {
        let sql = format!(
            "SELECT user_id, display_name, {rank_column} AS rank, {pnl_column} AS pnl \
             FROM traders WHERE {rank_column} IS NOT NULL \
             ORDER BY {rank_column} ASC LIMIT ?1 OFFSET ?2"
        );
        let records: Vec<BoardRecord> = sqlx::query_as(&sql)
            .bind(i64::try_from(limit)?)
            .bind(i64::try_from(offset)?)
            .fetch_all(&self.pool)
            .await?;
        records.into_iter().map(LeaderboardRow::try_from).collect()
    }
}

#[async_trait]
impl RankingSource for Store {
    async fn recompute_ranks(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let records: Vec<PnlRecord> =
            sqlx::query_as("SELECT user_id, all_time_pnl, weekly_pnl FROM traders")
                .fetch_all(&mut *tx)
                .await?;

        let mut all_time = Vec::with_capacity(records.len());
        let mut weekly = Vec::with_capacity(records.len());
        for r in &records {
            all_time.push((r.user_id.clone(), pnl(&r.all_time_pnl, &r.user_id)?));
            weekly.push((r.user_id.clone(), pnl(&r.weekly_pnl, &r.user_id)?));
        }
        let global_ranks = rank_positions(&all_time);
        let weekly_ranks = rank_positions(&weekly);

        for (i, r) in records.iter().enumerate() {
            sqlx::query("UPDATE traders SET global_rank = ?1, weekly_rank = ?2 WHERE user_id = ?3")
                .bind(i64::from(global_ranks[i]))
                .bind(i64::from(weekly_ranks[i]))
                .bind(&r.user_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!(rows = records.len(), "ranks recomputed");
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<RankingRow>> {
        let records: Vec<TraderRecord> = sqlx::query_as(
            "SELECT user_id, display_name, global_rank, weekly_rank, all_time_pnl, weekly_pnl \
             FROM traders WHERE global_rank IS NOT NULL AND weekly_rank IS NOT NULL \
             ORDER BY user_id",
        )
        .fetch_all(&self.pool)
        .await?;
        records.into_iter().map(RankingRow::try_from).collect()
    }

    async fn top_global(&self, limit: usize, offset: usize) -> Result<Vec<LeaderboardRow>> {
        self.board("global_rank", "all_time_pnl", limit, offset).await
    }

    async fn top_weekly(&self, limit: usize, offset: usize) -> Result<Vec<LeaderboardRow>> {
        self.board("weekly_rank", "weekly_pnl", limit, offset).await
    }
}

pub async fn init_sqlite(path: &str) -> Result<Store> {
    let store = Store::connect(path).await?;
    info!(path = path, "sqlite initialized");
    Ok(store)
}

async fn run_init_sql(pool: &SqlitePool) -> Result<()> {
    for statement in INIT_SQL.split(';') {
        let trimmed = statement.trim();
        if trimmed.is_empty() {
            continue;
        }
        sqlx::query(trimmed).execute(pool).await?;
    }
    Ok(())
}
