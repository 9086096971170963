//! Delivery of broadcast-cycle events to the real-time transport.
//!
//! Private events go to one channel per user and every send is isolated: a
//! failure is logged and counted, and the batch moves on to the next user.
//! The public leaderboard goes to a single shared channel once per cycle.
//! Until a transport is bound, every delivery path warns and skips.

mod message;
mod transport;

use std::sync::{Arc, PoisonError, RwLock};

use achievements::AchievementNotification;
use serde::Serialize;
use state::{PublicLeaderboardUpdate, RankChangeEvent};
use tracing::{debug, warn};

pub use message::{
    AchievementEarnedPayload, LeaderboardUpdatedPayload, PublicRow, RankChangedPayload,
};
pub use transport::{
    private_channel, ChannelTransport, Envelope, EventKind, Transport, TransportError,
    PUBLIC_CHANNEL,
};

/// Outcome counts for one delivery path in one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl DeliveryReport {
    fn skipped(count: usize) -> Self {
        Self {
            skipped: count,
            ..Self::default()
        }
    }

    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

#[derive(Default)]
pub struct Fanout {
    sink: RwLock<Option<Arc<dyn Transport>>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, transport: Arc<dyn Transport>) {
        let mut guard = self.sink.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(transport);
    }

    pub fn is_bound(&self) -> bool {
        self.sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn deliver_rank_changes(&self, changes: &[RankChangeEvent]) -> DeliveryReport {
        let Some(transport) = self.transport() else {
            warn!(count = changes.len(), "transport not bound, skipping rank change delivery");
            return DeliveryReport::skipped(changes.len());
        };
        let mut report = DeliveryReport::default();
        for change in changes {
            let channel = private_channel(&change.user_id);
            let payload = RankChangedPayload::from(change);
            match send(transport.as_ref(), &channel, EventKind::RankChanged, &payload).await {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(user = %change.user_id, error = %err, "rank change delivery failed");
                }
            }
        }
        debug!(delivered = report.delivered, failed = report.failed, "rank changes delivered");
        report
    }

    pub async fn deliver_achievements(
        &self,
        notifications: &[AchievementNotification],
    ) -> DeliveryReport {
        let Some(transport) = self.transport() else {
            warn!(
                count = notifications.len(),
                "transport not bound, skipping achievement delivery"
            );
            return DeliveryReport::skipped(notifications.len());
        };
        let mut report = DeliveryReport::default();
        for notification in notifications {
            let channel = private_channel(&notification.user_id);
            let payload = AchievementEarnedPayload::from(notification);
            match send(
                transport.as_ref(),
                &channel,
                EventKind::AchievementEarned,
                &payload,
            )
            .await
            {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        user = %notification.user_id,
                        kind = %notification.kind,
                        error = %err,
                        "achievement delivery failed"
                    );
                }
            }
        }
        report
    }

    pub async fn deliver_leaderboard(&self, update: &PublicLeaderboardUpdate) -> DeliveryReport {
        let Some(transport) = self.transport() else {
            warn!("transport not bound, skipping leaderboard update");
            return DeliveryReport::skipped(1);
        };
        let payload = LeaderboardUpdatedPayload::from(update);
        match send(
            transport.as_ref(),
            PUBLIC_CHANNEL,
            EventKind::LeaderboardUpdated,
            &payload,
        )
        .await
        {
            Ok(()) => DeliveryReport {
                delivered: 1,
                ..DeliveryReport::default()
            },
            Err(err) => {
                warn!(error = %err, "leaderboard update delivery failed");
                DeliveryReport {
                    failed: 1,
                    ..DeliveryReport::default()
                }
            }
        }
    }
}

async fn send<T: Serialize>(
    transport: &dyn Transport,
    channel: &str,
    event: EventKind,
    payload: &T,
) -> Result<(), TransportError> {
    let value = serde_json::to_value(payload)?;
    transport.publish(channel, event, value).await
}
