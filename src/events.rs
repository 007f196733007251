//! Outbound notifications for chat, scoreboard and lifecycle consumers

use std::sync::Mutex;

use tracing::info;

use crate::error::InvalidLink;
use crate::territory::{BeaconId, ScoreType, TeamId};

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    LinkCreated {
        game: String,
        a: BeaconId,
        b: BeaconId,
        team: TeamId,
        cost: u32,
    },
    LinkRejected {
        game: String,
        a: BeaconId,
        b: BeaconId,
        team: TeamId,
        reason: InvalidLink,
    },
    TriangleFormed {
        game: String,
        team: TeamId,
        count: usize,
    },
    TriangleFailed {
        game: String,
        team: TeamId,
        count: u32,
    },
    BeaconCaptured {
        game: String,
        beacon: BeaconId,
        team: Option<TeamId>,
    },
    GoalReached {
        game: String,
        team: TeamId,
        score: ScoreType,
    },
    GameEnded {
        game: String,
        winner: Option<TeamId>,
    },
}

impl Notification {
    pub fn game(&self) -> &str {
        match self {
            Notification::LinkCreated { game, .. }
            | Notification::LinkRejected { game, .. }
            | Notification::TriangleFormed { game, .. }
            | Notification::TriangleFailed { game, .. }
            | Notification::BeaconCaptured { game, .. }
            | Notification::GoalReached { game, .. }
            | Notification::GameEnded { game, .. } => game,
        }
    }
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification);

    fn notify_all(&self, notifications: &[Notification]) {
        for notification in notifications {
            self.notify(notification);
        }
    }
}

/// Writes every notification to the log.
#[derive(Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: &Notification) {
        match notification {
            Notification::LinkCreated { game, a, b, team, cost } => {
                info!(%game, %a, %b, %team, cost, "link created")
            }
            Notification::LinkRejected { game, a, b, team, reason } => {
                info!(%game, %a, %b, %team, %reason, "link rejected")
            }
            Notification::TriangleFormed { game, team, count } => {
                info!(%game, %team, count, "triangles formed")
            }
            Notification::TriangleFailed { game, team, count } => {
                info!(%game, %team, count, "triangles failed")
            }
            Notification::BeaconCaptured { game, beacon, team } => {
                info!(%game, %beacon, team = ?team, "beacon ownership changed")
            }
            Notification::GoalReached { game, team, score } => {
                info!(%game, %team, %score, "goal reached")
            }
            Notification::GameEnded { game, winner } => {
                info!(%game, winner = ?winner, "game ended")
            }
        }
    }
}

/// Keeps notifications in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Notification> {
        match self.seen.lock() {
            Ok(mut seen) => std::mem::take(&mut *seen),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: &Notification) {
        let mut seen = match self.seen.lock() {
            Ok(seen) => seen,
            Err(poisoned) => poisoned.into_inner(),
        };
        seen.push(notification.clone());
    }
}
