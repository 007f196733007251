//! The authoritative beacon/link graph of one game

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::LinkSettings;
use crate::error::{GameError, InvalidLink};
use crate::geometry::{distance, segments_intersect, Point, Segment};

use super::triangles::{Triangle, TriangleDetector, TriangleKey, TriangleReport};
use super::{BeaconId, GraphEvent, TeamId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkPolicy {
    pub max_links: usize,
    pub link_limit: u32,
    pub exp_distance: f64,
}

impl Default for LinkPolicy {
    fn default() -> Self {
        Self::from(&LinkSettings::default())
    }
}

impl From<&LinkSettings> for LinkPolicy {
    fn from(settings: &LinkSettings) -> Self {
        Self {
            max_links: settings.max_links,
            link_limit: settings.link_limit,
            exp_distance: settings.exp_distance,
        }
    }
}

impl LinkPolicy {
    fn range_checked(&self) -> bool {
        self.exp_distance > 0.0
    }

    /// Experience required to build a link of the given length.
    pub fn cost(&self, length: f64) -> u32 {
        if self.range_checked() {
            (length / self.exp_distance) as u32
        } else {
            0
        }
    }
}

/// A capturable node. `links` maps each neighbour to the team owning the
/// edge; the map is mirrored on the neighbour.
#[derive(Debug, Clone, PartialEq)]
pub struct Beacon {
    id: BeaconId,
    point: Point,
    owner: Option<TeamId>,
    links: BTreeMap<BeaconId, TeamId>,
}

impl Beacon {
    pub fn id(&self) -> BeaconId {
        self.id
    }

    pub fn point(&self) -> Point {
        self.point
    }

    pub fn owner(&self) -> Option<&TeamId> {
        self.owner.as_ref()
    }

    pub fn links(&self) -> &BTreeMap<BeaconId, TeamId> {
        &self.links
    }

    pub fn degree(&self) -> usize {
        self.links.len()
    }

    pub fn link_team(&self, other: BeaconId) -> Option<&TeamId> {
        self.links.get(&other)
    }

    pub fn is_linked_to(&self, other: BeaconId) -> bool {
        self.links.contains_key(&other)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkSuccess {
    /// Experience the linking player has to pay.
    pub cost: u32,
    /// Degree of the first beacon after the link.
    pub degree: usize,
    pub triangles_formed: Vec<Triangle>,
    pub triangles_failed: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkResult {
    pub a: BeaconId,
    pub b: BeaconId,
    pub team: TeamId,
    pub outcome: Result<LinkSuccess, InvalidLink>,
    pub events: Vec<GraphEvent>,
}

impl LinkResult {
    fn rejected(a: BeaconId, b: BeaconId, team: &TeamId, reason: InvalidLink) -> Self {
        Self {
            a,
            b,
            team: team.clone(),
            outcome: Err(reason),
            events: Vec::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn rejection(&self) -> Option<&InvalidLink> {
        self.outcome.as_ref().err()
    }

    pub fn triangles_formed(&self) -> usize {
        self.outcome
            .as_ref()
            .map(|ok| ok.triangles_formed.len())
            .unwrap_or(0)
    }

    pub fn triangles_failed(&self) -> u32 {
        self.outcome
            .as_ref()
            .map(|ok| ok.triangles_failed)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BeaconGraph {
    beacons: BTreeMap<BeaconId, Beacon>,
    next_id: u64,
    policy: LinkPolicy,
    triangles: TriangleDetector,
}

impl BeaconGraph {
    pub fn new(policy: LinkPolicy) -> Self {
        Self {
            beacons: BTreeMap::new(),
            next_id: 0,
            policy,
            triangles: TriangleDetector::new(),
        }
    }

    pub fn policy(&self) -> &LinkPolicy {
        &self.policy
    }

    pub fn add_beacon(&mut self, point: Point, owner: Option<TeamId>) -> (BeaconId, Vec<GraphEvent>) {
        let id = BeaconId::new(self.next_id);
        self.next_id += 1;
        let events = self.insert(id, point, owner);
        (id, events)
    }

    /// Inserts a beacon under a known identity, as when restoring state.
    /// Returns `None` if the identity is taken.
    pub fn restore_beacon(
        &mut self,
        id: BeaconId,
        point: Point,
        owner: Option<TeamId>,
    ) -> Option<Vec<GraphEvent>> {
        if self.beacons.contains_key(&id) {
            return None;
        }
        self.next_id = self.next_id.max(id.raw() + 1);
        Some(self.insert(id, point, owner))
    }

    fn insert(&mut self, id: BeaconId, point: Point, owner: Option<TeamId>) -> Vec<GraphEvent> {
        let mut events = Vec::new();
        if owner.is_some() {
            events.push(GraphEvent::BeaconOwnerChanged {
                beacon: id,
                from: None,
                to: owner.clone(),
            });
        }
        self.beacons.insert(
            id,
            Beacon {
                id,
                point,
                owner,
                links: BTreeMap::new(),
            },
        );
        events
    }

    pub fn beacon(&self, id: BeaconId) -> Option<&Beacon> {
        self.beacons.get(&id)
    }

    pub fn beacons(&self) -> impl Iterator<Item = &Beacon> {
        self.beacons.values()
    }

    pub fn beacon_at(&self, point: Point) -> Option<&Beacon> {
        self.beacons.values().find(|b| b.point == point)
    }

    pub fn len(&self) -> usize {
        self.beacons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beacons.is_empty()
    }

    /// Every undirected link once, as `(lower id, higher id, team)`.
    pub fn links(&self) -> impl Iterator<Item = (BeaconId, BeaconId, &TeamId)> {
        self.beacons.iter().flat_map(|(&a, beacon)| {
            beacon
                .links
                .iter()
                .filter(move |(b, _)| **b > a)
                .map(move |(&b, team)| (a, b, team))
        })
    }

    pub fn link_count(&self) -> usize {
        self.links().count()
    }

    pub fn triangles(&self) -> &TriangleDetector {
        &self.triangles
    }

    /// Changes ownership. Links are left alone; clearing them is the
    /// caller's policy.
    pub fn set_owner(&mut self, id: BeaconId, owner: Option<TeamId>) -> Result<Vec<GraphEvent>, GameError> {
        let beacon = self.beacons.get_mut(&id).ok_or(GameError::UnknownBeacon(id))?;
        if beacon.owner == owner {
            return Ok(Vec::new());
        }
        let from = std::mem::replace(&mut beacon.owner, owner.clone());
        Ok(vec![GraphEvent::BeaconOwnerChanged {
            beacon: id,
            from,
            to: owner,
        }])
    }

    /// Validates and commits a link. The first failing rule wins and a
    /// rejection leaves the graph untouched.
    pub fn try_link(&mut self, a: BeaconId, b: BeaconId, team: &TeamId) -> LinkResult {
        if a == b {
            return LinkResult::rejected(a, b, team, InvalidLink::SelfLink);
        }
        let (beacon_a, beacon_b) = match (self.beacons.get(&a), self.beacons.get(&b)) {
            (Some(x), Some(y)) => (x, y),
            (None, _) => return LinkResult::rejected(a, b, team, InvalidLink::UnknownBeacon(a)),
            (_, None) => return LinkResult::rejected(a, b, team, InvalidLink::UnknownBeacon(b)),
        };
        if let Err(reason) = self.validate(beacon_a, beacon_b, team) {
            debug!(%a, %b, %team, %reason, "link rejected");
            return LinkResult::rejected(a, b, team, reason);
        }
        let length = distance(beacon_a.point, beacon_b.point);

        self.connect(a, b, team);
        let report = self.triangles.on_link_added(&self.beacons, a, b, team);
        let degree = self.beacons.get(&a).map(Beacon::degree).unwrap_or(0);

        let mut events = vec![GraphEvent::LinkAdded {
            a,
            b,
            team: team.clone(),
        }];
        events.extend(report.formed.iter().cloned().map(GraphEvent::TriangleFormed));
        debug!(
            %a,
            %b,
            %team,
            formed = report.formed.len(),
            failed = report.failed,
            "link committed"
        );
        LinkResult {
            a,
            b,
            team: team.clone(),
            outcome: Ok(LinkSuccess {
                cost: self.policy.cost(length),
                degree,
                triangles_formed: report.formed,
                triangles_failed: report.failed,
            }),
            events,
        }
    }

    fn validate(&self, a: &Beacon, b: &Beacon, team: &TeamId) -> Result<(), InvalidLink> {
        for beacon in [a, b] {
            if beacon.degree() >= self.policy.max_links {
                return Err(InvalidLink::MaxLinks {
                    beacon: beacon.id,
                    max: self.policy.max_links,
                });
            }
        }
        if a.is_linked_to(b.id) {
            return Err(InvalidLink::AlreadyLinked(a.id, b.id));
        }
        let proposed = Segment::new(a.point, b.point);
        for (c, d, owner) in self.links() {
            if owner == team || c == a.id || c == b.id || d == a.id || d == b.id {
                continue;
            }
            let existing = Segment::new(self.beacons[&c].point, self.beacons[&d].point);
            if segments_intersect(&proposed, &existing) {
                return Err(InvalidLink::CrossesEnemyLink(owner.clone()));
            }
        }
        for beacon in [a, b] {
            if beacon.owner.as_ref() != Some(team) {
                return Err(InvalidLink::NotOwned(beacon.id));
            }
        }
        if self.policy.range_checked() {
            let length = distance(a.point, b.point) as u32;
            if length > self.policy.link_limit {
                return Err(InvalidLink::OutOfRange {
                    distance: length,
                    limit: self.policy.link_limit,
                });
            }
        }
        Ok(())
    }

    fn connect(&mut self, a: BeaconId, b: BeaconId, team: &TeamId) {
        if let Some(beacon) = self.beacons.get_mut(&a) {
            beacon.links.insert(b, team.clone());
        }
        if let Some(beacon) = self.beacons.get_mut(&b) {
            beacon.links.insert(a, team.clone());
        }
    }

    /// Re-adds a stored link without the gameplay rules; triangles are
    /// reinstated afterwards with [`BeaconGraph::restore_triangle`] or
    /// [`BeaconGraph::rebuild_triangles`].
    pub fn restore_link(&mut self, a: BeaconId, b: BeaconId, team: &TeamId) -> Result<(), InvalidLink> {
        if a == b {
            return Err(InvalidLink::SelfLink);
        }
        for id in [a, b] {
            if !self.beacons.contains_key(&id) {
                return Err(InvalidLink::UnknownBeacon(id));
            }
        }
        if self.beacons[&a].is_linked_to(b) {
            return Err(InvalidLink::AlreadyLinked(a, b));
        }
        self.connect(a, b, team);
        Ok(())
    }

    /// Registers a stored triangle as is, skipping the overlap rule that
    /// admitted it during play. `false` if its links are gone.
    pub fn restore_triangle(&mut self, key: TriangleKey) -> bool {
        self.triangles.restore(&self.beacons, key)
    }

    pub fn rebuild_triangles(&mut self) -> TriangleReport {
        self.triangles.rebuild(&self.beacons)
    }

    /// Removes the link between `a` and `b`, dropping the triangles that used
    /// it. No events if the link does not exist.
    pub fn unlink(&mut self, a: BeaconId, b: BeaconId) -> Vec<GraphEvent> {
        let team = match self.beacons.get_mut(&a).and_then(|x| x.links.remove(&b)) {
            Some(team) => team,
            None => return Vec::new(),
        };
        if let Some(beacon) = self.beacons.get_mut(&b) {
            beacon.links.remove(&a);
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let mut events = vec![GraphEvent::LinkRemoved { a: lo, b: hi, team }];
        events.extend(
            self.triangles
                .on_link_removed(a, b)
                .into_iter()
                .map(GraphEvent::TriangleDestroyed),
        );
        events
    }

    pub fn unlink_all(&mut self, id: BeaconId) -> Vec<GraphEvent> {
        let neighbours: Vec<BeaconId> = self
            .beacons
            .get(&id)
            .map(|b| b.links.keys().copied().collect())
            .unwrap_or_default();
        neighbours
            .into_iter()
            .flat_map(|other| self.unlink(id, other))
            .collect()
    }

    pub fn remove_beacon(&mut self, id: BeaconId) -> Result<Vec<GraphEvent>, GameError> {
        if !self.beacons.contains_key(&id) {
            return Err(GameError::UnknownBeacon(id));
        }
        let mut events = self.unlink_all(id);
        events.extend(self.set_owner(id, None)?);
        self.beacons.remove(&id);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red() -> TeamId {
        TeamId::new("red")
    }

    fn blue() -> TeamId {
        TeamId::new("blue")
    }

    fn graph() -> BeaconGraph {
        BeaconGraph::new(LinkPolicy {
            max_links: 6,
            link_limit: 500,
            exp_distance: 5.0,
        })
    }

    fn plant(g: &mut BeaconGraph, x: f64, z: f64, team: &TeamId) -> BeaconId {
        g.add_beacon(Point::new(x, z), Some(team.clone())).0
    }

    #[test]
    fn link_is_symmetric_and_costed() {
        let mut g = graph();
        let a = plant(&mut g, 0.0, 0.0, &red());
        let b = plant(&mut g, 30.0, 40.0, &red());
        let result = g.try_link(a, b, &red());
        let ok = result.outcome.unwrap();
        assert_eq!(ok.cost, 10);
        assert_eq!(ok.degree, 1);
        assert!(g.beacon(a).unwrap().is_linked_to(b));
        assert_eq!(g.beacon(b).unwrap().link_team(a), Some(&red()));
        assert_eq!(g.link_count(), 1);
    }

    #[test]
    fn rejects_in_rule_order() {
        let mut g = graph();
        let a = plant(&mut g, 0.0, 0.0, &red());
        let b = plant(&mut g, 10.0, 0.0, &red());
        assert_eq!(g.try_link(a, a, &red()).rejection(), Some(&InvalidLink::SelfLink));
        assert!(g.try_link(a, b, &red()).success());
        assert_eq!(
            g.try_link(b, a, &red()).rejection(),
            Some(&InvalidLink::AlreadyLinked(b, a))
        );
    }

    #[test]
    fn degree_ceiling_on_either_end() {
        let mut g = BeaconGraph::new(LinkPolicy {
            max_links: 1,
            ..LinkPolicy::default()
        });
        let a = plant(&mut g, 0.0, 0.0, &red());
        let b = plant(&mut g, 10.0, 0.0, &red());
        let c = plant(&mut g, 0.0, 10.0, &red());
        assert!(g.try_link(a, b, &red()).success());
        assert_eq!(
            g.try_link(c, b, &red()).rejection(),
            Some(&InvalidLink::MaxLinks { beacon: b, max: 1 })
        );
    }

    #[test]
    fn ownership_and_range() {
        let mut g = graph();
        let a = plant(&mut g, 0.0, 0.0, &red());
        let b = plant(&mut g, 10.0, 0.0, &blue());
        let far = plant(&mut g, 600.0, 0.0, &red());
        assert_eq!(g.try_link(a, b, &red()).rejection(), Some(&InvalidLink::NotOwned(b)));
        assert_eq!(
            g.try_link(a, far, &red()).rejection(),
            Some(&InvalidLink::OutOfRange {
                distance: 600,
                limit: 500
            })
        );
    }

    #[test]
    fn enemy_crossing_rejected_but_shared_endpoint_allowed() {
        let mut g = graph();
        let a = plant(&mut g, 0.0, 0.0, &red());
        let b = plant(&mut g, 10.0, 10.0, &red());
        let c = plant(&mut g, 0.0, 10.0, &blue());
        let d = plant(&mut g, 10.0, 0.0, &blue());
        assert!(g.try_link(a, b, &red()).success());
        assert_eq!(
            g.try_link(c, d, &blue()).rejection(),
            Some(&InvalidLink::CrossesEnemyLink(red()))
        );
        g.set_owner(a, Some(blue())).unwrap();
        assert!(g.try_link(a, c, &blue()).success());
    }

    #[test]
    fn unlink_destroys_triangles() {
        let mut g = graph();
        let a = plant(&mut g, 0.0, 0.0, &red());
        let b = plant(&mut g, 10.0, 0.0, &red());
        let c = plant(&mut g, 5.0, 10.0, &red());
        g.try_link(a, b, &red());
        g.try_link(b, c, &red());
        assert_eq!(g.try_link(c, a, &red()).triangles_formed(), 1);
        let events = g.unlink(b, a);
        assert!(matches!(events[0], GraphEvent::LinkRemoved { .. }));
        assert!(matches!(events[1], GraphEvent::TriangleDestroyed(_)));
        assert!(g.triangles().is_empty());
        assert!(g.unlink(a, b).is_empty());
    }

    #[test]
    fn stored_triangles_need_their_links() {
        let mut g = graph();
        let a = plant(&mut g, 0.0, 0.0, &red());
        let b = plant(&mut g, 10.0, 0.0, &red());
        let c = plant(&mut g, 5.0, 10.0, &red());
        let d = plant(&mut g, 5.0, -10.0, &blue());
        for (x, y) in [(a, b), (b, c), (c, a)] {
            g.restore_link(x, y, &red()).unwrap();
        }
        g.restore_link(a, d, &blue()).unwrap();
        assert!(g.triangles().is_empty());
        assert!(!g.restore_triangle(TriangleKey::new(a, b, d)));
        assert!(g.restore_triangle(TriangleKey::new(c, a, b)));
        let triangle = g.triangles().get(&TriangleKey::new(a, b, c)).unwrap();
        assert_eq!(triangle.team, red());
        assert_eq!(triangle.area, 50.0);
    }

    #[test]
    fn remove_beacon_clears_links() {
        let mut g = graph();
        let a = plant(&mut g, 0.0, 0.0, &red());
        let b = plant(&mut g, 10.0, 0.0, &red());
        g.try_link(a, b, &red());
        let events = g.remove_beacon(a).unwrap();
        assert_eq!(events.len(), 2);
        assert!(g.beacon(a).is_none());
        assert_eq!(g.beacon(b).unwrap().degree(), 0);
    }
}
