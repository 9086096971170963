use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use state::UserId;

pub const PUBLIC_CHANNEL: &str = "leaderboard";

/// Per-user private channel address. Pure function of the user id.
pub fn private_channel(user_id: &UserId) -> String {
    format!("user:{user_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RankChanged,
    AchievementEarned,
    LeaderboardUpdated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RankChanged => "rank_changed",
            EventKind::AchievementEarned => "achievement_earned",
            EventKind::LeaderboardUpdated => "leaderboard_updated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("channel {channel} rejected the message: {reason}")]
    Rejected { channel: String, reason: String },
    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Publish capability of the real-time layer.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(
        &self,
        channel: &str,
        event: EventKind,
        payload: serde_json::Value,
    ) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub channel: String,
    pub event: EventKind,
    pub payload: serde_json::Value,
}

/// In-process transport backed by a tokio broadcast channel. Subscribers
/// (socket gateways, relays) receive every envelope and filter by channel.
#[derive(Clone)]
pub struct ChannelTransport {
    tx: broadcast::Sender<Envelope>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn publish(
        &self,
        channel: &str,
        event: EventKind,
        payload: serde_json::Value,
    ) -> Result<(), TransportError> {
        let envelope = Envelope {
            channel: channel.to_string(),
            event,
            payload,
        };
        self.tx
            .send(envelope)
            .map(|_| ())
            .map_err(|_| TransportError::Closed)
    }
}
