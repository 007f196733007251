use std::path::PathBuf;

use thiserror::Error;

use crate::region::RegionId;
use crate::territory::{scoring::ScoreType, BeaconId, TeamId};

/// Reasons a link request is refused. All are recoverable and reported back
/// to the player; none mutate the graph.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InvalidLink {
    #[error("a beacon cannot link to itself")]
    SelfLink,
    #[error("beacon {beacon} already has the maximum of {max} links")]
    MaxLinks { beacon: BeaconId, max: usize },
    #[error("beacons {0} and {1} are already linked")]
    AlreadyLinked(BeaconId, BeaconId),
    #[error("link would cross a link owned by team {0}")]
    CrossesEnemyLink(TeamId),
    #[error("beacon {0} is not owned by the linking team")]
    NotOwned(BeaconId),
    #[error("link of {distance} blocks exceeds the limit of {limit}")]
    OutOfRange { distance: u32, limit: u32 },
    #[error("unknown beacon {0}")]
    UnknownBeacon(BeaconId),
}

#[derive(Debug, Error)]
pub enum GameError {
    #[error("no free, safe region could be found for game '{0}'")]
    AllocationFailed(String),
    #[error("a game named '{0}' already exists")]
    NameTaken(String),
    #[error("no game named '{0}'")]
    UnknownGame(String),
    #[error("point ({x}, {z}) is not inside a game region")]
    OutsideGameRegion { x: f64, z: f64 },
    #[error("unknown beacon {0}")]
    UnknownBeacon(BeaconId),
    #[error("unknown team '{0}'")]
    UnknownTeam(String),
    #[error("game '{0}' is not running")]
    NotRunning(String),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("state io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state document is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("state document is corrupt: {0}")]
    Corrupt(String),
}

/// Defects in the engine itself: tests should fail on these, production
/// code heals them by recomputing.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InvariantViolation {
    #[error("regions {0} and {1} overlap")]
    RegionOverlap(RegionId, RegionId),
    #[error("team {team} {score} cached {cached} but recomputed {actual}")]
    ScoreDrift {
        team: TeamId,
        score: ScoreType,
        cached: f64,
        actual: f64,
    },
}
