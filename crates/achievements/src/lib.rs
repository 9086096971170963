//! Achievement rules evaluated against a single rank change.
//!
//! Every rule is a crossing condition: it fires when the user moves from
//! outside a band to inside it, never while they stay inside.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use state::{RankChangeEvent, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementKind {
    #[serde(rename = "top_10_global")]
    Top10Global,
    #[serde(rename = "top_100_global")]
    Top100Global,
    BigClimb,
    WeeklyLeader,
}

impl AchievementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementKind::Top10Global => "top_10_global",
            AchievementKind::Top100Global => "top_100_global",
            AchievementKind::BigClimb => "big_climb",
            AchievementKind::WeeklyLeader => "weekly_leader",
        }
    }
}

impl fmt::Display for AchievementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementNotification {
    pub user_id: UserId,
    pub kind: AchievementKind,
    pub title: String,
    pub description: String,
    pub observed_at: DateTime<Utc>,
}

pub trait AchievementRule: Send + Sync {
    fn kind(&self) -> AchievementKind;

    fn evaluate(&self, change: &RankChangeEvent) -> Option<AchievementNotification>;
}

fn notify(
    change: &RankChangeEvent,
    kind: AchievementKind,
    title: &str,
    description: String,
) -> AchievementNotification {
    AchievementNotification {
        user_id: change.user_id.clone(),
        kind,
        title: title.to_string(),
        description,
        observed_at: change.observed_at,
    }
}

/// Entry into the global top `threshold`.
pub struct GlobalBandEntry {
    pub threshold: u32,
    pub kind: AchievementKind,
    pub title: &'static str,
}

impl AchievementRule for GlobalBandEntry {
    fn kind(&self) -> AchievementKind {
        self.kind
    }

    fn evaluate(&self, change: &RankChangeEvent) -> Option<AchievementNotification> {
        let crossed = change.current_global_rank <= self.threshold
            && change.previous_global_rank > self.threshold;
        crossed.then(|| {
            notify(
                change,
                self.kind,
                self.title,
                format!(
                    "You entered the global top {} at rank #{}",
                    self.threshold, change.current_global_rank
                ),
            )
        })
    }
}

pub struct BigClimb {
    pub min_climb: i64,
}

impl AchievementRule for BigClimb {
    fn kind(&self) -> AchievementKind {
        AchievementKind::BigClimb
    }

    fn evaluate(&self, change: &RankChangeEvent) -> Option<AchievementNotification> {
        (change.rank_change >= self.min_climb).then(|| {
            notify(
                change,
                AchievementKind::BigClimb,
                "Big Climb",
                format!(
                    "You climbed {} places to global rank #{}",
                    change.rank_change, change.current_global_rank
                ),
            )
        })
    }
}

pub struct WeeklyLeader;

impl AchievementRule for WeeklyLeader {
    fn kind(&self) -> AchievementKind {
        AchievementKind::WeeklyLeader
    }

    fn evaluate(&self, change: &RankChangeEvent) -> Option<AchievementNotification> {
        (change.current_weekly_rank == 1 && change.previous_weekly_rank != 1).then(|| {
            notify(
                change,
                AchievementKind::WeeklyLeader,
                "Weekly Leader",
                "You are #1 on this week's leaderboard".to_string(),
            )
        })
    }
}

/// Stateless evaluator: the output depends only on the change it is given.
pub struct AchievementDetector {
    rules: Vec<Box<dyn AchievementRule>>,
}

impl AchievementDetector {
    pub fn new(rules: Vec<Box<dyn AchievementRule>>) -> Self {
        Self { rules }
    }

    pub fn detect(&self, change: &RankChangeEvent) -> Vec<AchievementNotification> {
        self.rules
            .iter()
            .filter_map(|rule| rule.evaluate(change))
            .collect()
    }

    pub fn detect_all(&self, changes: &[RankChangeEvent]) -> Vec<AchievementNotification> {
        changes.iter().flat_map(|change| self.detect(change)).collect()
    }

    pub fn kinds(&self) -> Vec<AchievementKind> {
        self.rules.iter().map(|rule| rule.kind()).collect()
    }
}

impl Default for AchievementDetector {
    fn default() -> Self {
        Self::new(vec![
            Box::new(GlobalBandEntry {
                threshold: 10,
                kind: AchievementKind::Top10Global,
                title: "Top 10 Trader",
            }),
            Box::new(GlobalBandEntry {
                threshold: 100,
                kind: AchievementKind::Top100Global,
                title: "Top 100 Trader",
            }),
            Box::new(BigClimb { min_climb: 50 }),
            Box::new(WeeklyLeader),
        ])
    }
}
