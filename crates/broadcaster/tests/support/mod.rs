#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use broadcaster::{BroadcasterConfig, LeaderboardBroadcaster};
use fanout::{Envelope, EventKind, Transport, TransportError};
use metrics::BroadcastMetrics;
use rust_decimal::Decimal;
use state::{LeaderboardRow, RankingRow, RankingSource, UserId};
use tokio::sync::Notify;

pub fn row(id: &str, global: u32, weekly: u32) -> RankingRow {
    RankingRow {
        user_id: UserId::new(id),
        display_name: format!("Trader {id}"),
        global_rank: global,
        weekly_rank: weekly,
        all_time_pnl: Decimal::from(10_000 - i64::from(global)),
        weekly_pnl: Decimal::from(1_000 - i64::from(weekly)),
    }
}

/// Ranking source whose rows are set by the test. The top-N queries return
/// every row, so capping to N is the broadcaster's job.
#[derive(Default)]
pub struct ScriptedSource {
    rows: Mutex<Vec<RankingRow>>,
    recompute_calls: AtomicUsize,
    fail_recompute: AtomicBool,
    fail_top: AtomicBool,
    hold: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedSource {
    pub fn with_rows(rows: Vec<RankingRow>) -> Arc<Self> {
        let source = Self::default();
        *source.rows.lock().unwrap() = rows;
        Arc::new(source)
    }

    pub fn set_rows(&self, rows: Vec<RankingRow>) {
        *self.rows.lock().unwrap() = rows;
    }

    pub fn recompute_calls(&self) -> usize {
        self.recompute_calls.load(Ordering::SeqCst)
    }

    pub fn fail_recompute(&self, fail: bool) {
        self.fail_recompute.store(fail, Ordering::SeqCst);
    }

    pub fn fail_top_queries(&self, fail: bool) {
        self.fail_top.store(fail, Ordering::SeqCst);
    }

    /// Block `recompute_ranks` until the returned handle is notified.
    pub fn hold_recompute(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(notify.clone());
        notify
    }

    fn leaderboard(&self, key: impl Fn(&RankingRow) -> (u32, Decimal)) -> Vec<LeaderboardRow> {
        let mut rows: Vec<LeaderboardRow> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .map(|r| {
                let (rank, pnl) = key(r);
                LeaderboardRow {
                    user_id: r.user_id.clone(),
                    display_name: r.display_name.clone(),
                    rank,
                    pnl,
                }
            })
            .collect();
        rows.sort_by_key(|r| r.rank);
        rows
    }
}

#[async_trait]
impl RankingSource for ScriptedSource {
    async fn recompute_ranks(&self) -> Result<()> {
        self.recompute_calls.fetch_add(1, Ordering::SeqCst);
        let hold = self.hold.lock().unwrap().take();
        if let Some(notify) = hold {
            notify.notified().await;
        }
        if self.fail_recompute.load(Ordering::SeqCst) {
            bail!("ranking store unavailable");
        }
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<RankingRow>> {
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn top_global(&self, _limit: usize, _offset: usize) -> Result<Vec<LeaderboardRow>> {
        if self.fail_top.load(Ordering::SeqCst) {
            bail!("top query timed out");
        }
        Ok(self.leaderboard(|r| (r.global_rank, r.all_time_pnl)))
    }

    async fn top_weekly(&self, _limit: usize, _offset: usize) -> Result<Vec<LeaderboardRow>> {
        if self.fail_top.load(Ordering::SeqCst) {
            bail!("top query timed out");
        }
        Ok(self.leaderboard(|r| (r.weekly_rank, r.weekly_pnl)))
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    failing: HashSet<String>,
    sent: Mutex<Vec<Envelope>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_for(channels: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: channels.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        })
    }

    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().unwrap().clone()
    }

    pub fn routes(&self) -> Vec<(String, EventKind)> {
        self.sent()
            .into_iter()
            .map(|e| (e.channel, e.event))
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn publish(
        &self,
        channel: &str,
        event: EventKind,
        payload: serde_json::Value,
    ) -> Result<(), TransportError> {
        if self.failing.contains(channel) {
            return Err(TransportError::Rejected {
                channel: channel.to_string(),
                reason: "recipient disconnected".into(),
            });
        }
        self.sent.lock().unwrap().push(Envelope {
            channel: channel.to_string(),
            event,
            payload,
        });
        Ok(())
    }
}

pub fn broadcaster(
    source: Arc<ScriptedSource>,
    config: BroadcasterConfig,
) -> Arc<LeaderboardBroadcaster> {
    broadcaster_with_metrics(source, config).0
}

/// Same as [`broadcaster`], also returning a handle onto its counters.
pub fn broadcaster_with_metrics(
    source: Arc<ScriptedSource>,
    config: BroadcasterConfig,
) -> (Arc<LeaderboardBroadcaster>, BroadcastMetrics) {
    let metrics = BroadcastMetrics::detached().expect("metrics");
    let b = LeaderboardBroadcaster::new(source, config, metrics.clone()).expect("valid config");
    (Arc::new(b), metrics)
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
