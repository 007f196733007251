//! Beacons, links and the triangles they close, per game

pub mod graph;
pub mod scoring;
pub mod triangles;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use graph::{Beacon, BeaconGraph, LinkPolicy, LinkResult, LinkSuccess};
pub use scoring::{ScoreType, TeamScore, TerritoryScorer};
pub use triangles::{Triangle, TriangleDetector, TriangleKey, TriangleReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BeaconId(u64);

impl BeaconId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BeaconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque team identity; only compared for equality and ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(String);

impl TeamId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Something that changed in a graph. Scorers and notification sinks are
/// driven by these rather than by rescanning.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    BeaconOwnerChanged {
        beacon: BeaconId,
        from: Option<TeamId>,
        to: Option<TeamId>,
    },
    LinkAdded {
        a: BeaconId,
        b: BeaconId,
        team: TeamId,
    },
    LinkRemoved {
        a: BeaconId,
        b: BeaconId,
        team: TeamId,
    },
    TriangleFormed(Triangle),
    TriangleDestroyed(Triangle),
}
