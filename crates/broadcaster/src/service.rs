use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use achievements::AchievementDetector;
use chrono::{DateTime, Utc};
use fanout::{DeliveryReport, Fanout, Transport};
use metrics::BroadcastMetrics;
use serde::Serialize;
use state::{diff, PublicLeaderboardUpdate, RankingSource, Snapshot, SnapshotStore};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::{BroadcasterConfig, ConfigError};
use crate::error::BroadcastError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Less than `min_gap` since the start of the last successful cycle.
    TooSoon,
    /// Another cycle holds the single-flight flag.
    InFlight,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::TooSoon => "too_soon",
            SkipReason::InFlight => "in_flight",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub cycle: u64,
    pub changes: usize,
    pub achievements: usize,
    pub rank_deliveries: DeliveryReport,
    pub leaderboard_deliveries: DeliveryReport,
    pub achievement_deliveries: DeliveryReport,
    pub snapshot_size: usize,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleSummary),
    Skipped(SkipReason),
    Failed(BroadcastError),
}

impl CycleOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CycleOutcome::Completed(_))
    }
}

/// Point-in-time view for health checks. Never consulted by the cycle itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcasterStatus {
    pub running: bool,
    pub in_cycle: bool,
    pub last_cycle_start: Option<DateTime<Utc>>,
    pub snapshot_size: usize,
}

/// Clears the single-flight flag when dropped, whatever the cycle outcome.
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Periodically recomputes the ranking, diffs it against the last observed
/// snapshot and fans out private and public notifications.
pub struct LeaderboardBroadcaster {
    source: Arc<dyn RankingSource>,
    config: BroadcasterConfig,
    store: SnapshotStore,
    detector: AchievementDetector,
    fanout: Fanout,
    metrics: BroadcastMetrics,
    running: AtomicBool,
    in_cycle: AtomicBool,
    cycle_seq: AtomicU64,
    last_success_start: Mutex<Option<Instant>>,
    last_cycle_start: RwLock<Option<DateTime<Utc>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl LeaderboardBroadcaster {
    pub fn new(
        source: Arc<dyn RankingSource>,
        config: BroadcasterConfig,
        metrics: BroadcastMetrics,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            source,
            config,
            store: SnapshotStore::new(),
            detector: AchievementDetector::default(),
            fanout: Fanout::new(),
            metrics,
            running: AtomicBool::new(false),
            in_cycle: AtomicBool::new(false),
            cycle_seq: AtomicU64::new(0),
            last_success_start: Mutex::new(None),
            last_cycle_start: RwLock::new(None),
            timer: Mutex::new(None),
        })
    }

    pub fn with_detector(mut self, detector: AchievementDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn config(&self) -> &BroadcasterConfig {
        &self.config
    }

    /// Bind the fan-out sink. Cycles before this still advance the snapshot.
    pub fn initialize(&self, transport: Arc<dyn Transport>) {
        self.fanout.bind(transport);
        info!("broadcaster transport bound");
    }

    /// Run one cycle now and re-arm the interval timer. No-op if already running.
    pub fn start(self: &Arc<Self>) {
        // `running` only changes while the timer slot is held, so it always
        // agrees with whether a timer is installed.
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if self.running.swap(true, Ordering::AcqRel) {
            info!("broadcaster already running");
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                // first tick completes immediately
                ticker.tick().await;
                let Some(this) = weak.upgrade() else {
                    break;
                };
                // cycles run detached so stop() never aborts one mid-flight
                tokio::spawn(async move {
                    this.tick().await;
                });
            }
        });
        if let Some(stale) = timer.replace(handle) {
            stale.abort();
        }
        drop(timer);

        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            min_gap_ms = self.config.min_gap.as_millis() as u64,
            top_n = self.config.top_n,
            "broadcaster started"
        );
    }

    /// Cancel future timer fires. An in-flight cycle runs to completion.
    pub fn stop(&self) {
        let handle = {
            let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
            if !self.running.swap(false, Ordering::AcqRel) {
                debug!("broadcaster not running");
                return;
            }
            timer.take()
        };
        if let Some(handle) = handle {
            handle.abort();
        }
        info!(in_cycle = self.in_cycle.load(Ordering::Acquire), "broadcaster stopped");
    }

    pub fn status(&self) -> BroadcasterStatus {
        BroadcasterStatus {
            running: self.running.load(Ordering::Acquire),
            in_cycle: self.in_cycle.load(Ordering::Acquire),
            last_cycle_start: *self
                .last_cycle_start
                .read()
                .unwrap_or_else(PoisonError::into_inner),
            snapshot_size: self.store.len(),
        }
    }

    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.store.current()
    }

    /// Cycle entry point invoked by every timer fire.
    ///
    /// Gated by the single-flight flag and the minimum gap; both fail toward
    /// skipping. Errors are logged and returned as `CycleOutcome::Failed`,
    /// leaving the previous snapshot in place for the next attempt.
    pub async fn tick(&self) -> CycleOutcome {
        let Some(_guard) = FlightGuard::acquire(&self.in_cycle) else {
            return self.skip(SkipReason::InFlight);
        };
        if self.too_soon() {
            return self.skip(SkipReason::TooSoon);
        }

        let started = Instant::now();
        *self
            .last_cycle_start
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        let cycle = self.cycle_seq.fetch_add(1, Ordering::Relaxed) + 1;

        match self.run_cycle(cycle).await {
            Ok(summary) => {
                *self
                    .last_success_start
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(started);
                self.metrics
                    .cycle_completed(started.elapsed().as_secs_f64());
                info!(
                    cycle,
                    changes = summary.changes,
                    achievements = summary.achievements,
                    failed_deliveries = summary.rank_deliveries.failed
                        + summary.achievement_deliveries.failed
                        + summary.leaderboard_deliveries.failed,
                    snapshot_size = summary.snapshot_size,
                    "broadcast cycle completed"
                );
                CycleOutcome::Completed(summary)
            }
            Err(err) => {
                self.metrics.cycle_failed();
                error!(cycle, error = ?err, "broadcast cycle failed, keeping previous snapshot");
                CycleOutcome::Failed(err)
            }
        }
    }

    fn too_soon(&self) -> bool {
        self.last_success_start
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|last| last.elapsed() < self.config.min_gap)
            .unwrap_or(false)
    }

    fn skip(&self, reason: SkipReason) -> CycleOutcome {
        self.metrics.cycle_skipped(reason.as_str());
        debug!(reason = reason.as_str(), "broadcast cycle skipped");
        CycleOutcome::Skipped(reason)
    }

    async fn run_cycle(&self, cycle: u64) -> Result<CycleSummary, BroadcastError> {
        self.source
            .recompute_ranks()
            .await
            .map_err(BroadcastError::Recompute)?;

        let rows = self
            .source
            .list_all()
            .await
            .map_err(BroadcastError::query("list_all"))?;
        let current = Snapshot::from_rows(rows, Utc::now())?;
        let previous = self.store.current();

        let changes = diff(&previous, &current);
        debug!(cycle, changes = changes.len(), "rank diff computed");

        let rank_deliveries = self.fanout.deliver_rank_changes(&changes).await;
        self.record("rank_changed", &rank_deliveries);

        let top_n = self.config.top_n;
        let global = self
            .source
            .top_global(top_n, 0)
            .await
            .map_err(BroadcastError::query("top_global"))?;
        let weekly = self
            .source
            .top_weekly(top_n, 0)
            .await
            .map_err(BroadcastError::query("top_weekly"))?;
        let update = PublicLeaderboardUpdate::new(global, weekly, top_n, Utc::now());
        let leaderboard_deliveries = self.fanout.deliver_leaderboard(&update).await;
        self.record("leaderboard_updated", &leaderboard_deliveries);

        let notifications = self.detector.detect_all(&changes);
        let achievement_deliveries = self.fanout.deliver_achievements(&notifications).await;
        self.record("achievement_earned", &achievement_deliveries);

        let snapshot_size = current.len();
        self.store.replace(current);
        self.metrics.set_snapshot_size(snapshot_size);

        Ok(CycleSummary {
            cycle,
            changes: changes.len(),
            achievements: notifications.len(),
            rank_deliveries,
            leaderboard_deliveries,
            achievement_deliveries,
            snapshot_size,
        })
    }

    fn record(&self, path: &str, report: &DeliveryReport) {
        self.metrics
            .deliveries(path, report.delivered, report.failed, report.skipped);
    }
}

impl Drop for LeaderboardBroadcaster {
    fn drop(&mut self) {
        if let Some(handle) = self
            .timer
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
