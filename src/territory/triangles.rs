//! Detection and bookkeeping of same-team 3-cycles

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geometry::{polygon_area, triangles_overlap, Point};

use super::{graph::Beacon, BeaconId, TeamId};

/// Canonical identity of a triangle: its three beacons in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TriangleKey([BeaconId; 3]);

impl TriangleKey {
    pub fn new(a: BeaconId, b: BeaconId, c: BeaconId) -> Self {
        let mut ids = [a, b, c];
        ids.sort();
        Self(ids)
    }

    pub fn beacons(&self) -> [BeaconId; 3] {
        self.0
    }

    pub fn contains(&self, beacon: BeaconId) -> bool {
        self.0.contains(&beacon)
    }

    pub fn contains_edge(&self, a: BeaconId, b: BeaconId) -> bool {
        a != b && self.contains(a) && self.contains(b)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Triangle {
    pub key: TriangleKey,
    pub team: TeamId,
    pub area: f64,
    pub points: [Point; 3],
}

impl Triangle {
    fn overlaps(&self, other: &Triangle) -> bool {
        triangles_overlap(self.points, other.points)
    }

    /// The triangle on `key` if all three of its edges are held by one team.
    fn closed(beacons: &BTreeMap<BeaconId, Beacon>, key: TriangleKey) -> Option<Triangle> {
        let [a, b, c] = key.beacons();
        let (ba, bb, bc) = (beacons.get(&a)?, beacons.get(&b)?, beacons.get(&c)?);
        let team = ba.link_team(b)?;
        if bb.link_team(c) != Some(team) || bc.link_team(a) != Some(team) {
            return None;
        }
        let points = [ba.point(), bb.point(), bc.point()];
        Some(Triangle {
            key,
            team: team.clone(),
            area: polygon_area(points[0], points[1], points[2]),
            points,
        })
    }
}

/// Outcome of closing triangles on one new edge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleReport {
    pub formed: Vec<Triangle>,
    /// Candidates refused because they overlap an existing same-team
    /// triangle, whose area is already scored.
    pub failed: u32,
}

#[derive(Debug, Clone, Default)]
pub struct TriangleDetector {
    registered: BTreeMap<TriangleKey, Triangle>,
}

impl TriangleDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes every triangle through the freshly added edge `a`-`b` owned by
    /// `team`. Candidates are visited in beacon id order so either link
    /// direction yields the same result.
    pub fn on_link_added(
        &mut self,
        beacons: &BTreeMap<BeaconId, Beacon>,
        a: BeaconId,
        b: BeaconId,
        team: &TeamId,
    ) -> TriangleReport {
        let mut report = TriangleReport::default();
        let (Some(beacon_a), Some(beacon_b)) = (beacons.get(&a), beacons.get(&b)) else {
            return report;
        };
        for (&c, team_ac) in beacon_a.links() {
            if c == b || team_ac != team || beacon_b.link_team(c) != Some(team) {
                continue;
            }
            let Some(beacon_c) = beacons.get(&c) else {
                continue;
            };
            let key = TriangleKey::new(a, b, c);
            if self.registered.contains_key(&key) {
                continue;
            }
            let points = [beacon_a.point(), beacon_b.point(), beacon_c.point()];
            let candidate = Triangle {
                key,
                team: team.clone(),
                area: polygon_area(points[0], points[1], points[2]),
                points,
            };
            let overlapping = self
                .registered
                .values()
                .filter(|t| &t.team == team)
                .any(|t| t.overlaps(&candidate));
            if overlapping {
                report.failed += 1;
                continue;
            }
            self.registered.insert(key, candidate.clone());
            report.formed.push(candidate);
        }
        report
    }

    /// Drops and returns every triangle that used the edge `a`-`b`.
    pub fn on_link_removed(&mut self, a: BeaconId, b: BeaconId) -> Vec<Triangle> {
        let doomed: Vec<TriangleKey> = self
            .registered
            .keys()
            .filter(|key| key.contains_edge(a, b))
            .copied()
            .collect();
        doomed
            .into_iter()
            .filter_map(|key| self.registered.remove(&key))
            .collect()
    }

    /// Reinstates a stored triangle. Returns `false`, registering nothing,
    /// when its edges are no longer one team's links.
    pub fn restore(&mut self, beacons: &BTreeMap<BeaconId, Beacon>, key: TriangleKey) -> bool {
        match Triangle::closed(beacons, key) {
            Some(triangle) => {
                self.registered.insert(key, triangle);
                true
            }
            None => false,
        }
    }

    /// Re-derives the registry from scratch, replaying every link in
    /// ascending order. Used when loaded state carries no triangle list.
    pub fn rebuild(&mut self, beacons: &BTreeMap<BeaconId, Beacon>) -> TriangleReport {
        self.registered.clear();
        let mut report = TriangleReport::default();
        for (&a, beacon) in beacons {
            for (&b, team) in beacon.links() {
                if b <= a {
                    continue;
                }
                let step = self.on_link_added(beacons, a, b, team);
                report.failed += step.failed;
                report.formed.extend(step.formed);
            }
        }
        report
    }

    pub fn get(&self, key: &TriangleKey) -> Option<&Triangle> {
        self.registered.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Triangle> {
        self.registered.values()
    }

    pub fn owned_by<'a>(&'a self, team: &'a TeamId) -> impl Iterator<Item = &'a Triangle> + 'a {
        self.registered.values().filter(move |t| &t.team == team)
    }

    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }
}
