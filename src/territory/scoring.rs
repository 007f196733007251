//! Per-team score caches derived from graph events

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InvariantViolation;

use super::{graph::BeaconGraph, GraphEvent, TeamId};

const AREA_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreType {
    Area,
    Beacons,
    Links,
    Triangles,
}

impl ScoreType {
    pub const ALL: [ScoreType; 4] = [
        ScoreType::Area,
        ScoreType::Beacons,
        ScoreType::Links,
        ScoreType::Triangles,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScoreType::Area => "area",
            ScoreType::Beacons => "beacons",
            ScoreType::Links => "links",
            ScoreType::Triangles => "triangles",
        }
    }
}

impl fmt::Display for ScoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScoreType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScoreType::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown score type '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamScore {
    pub beacons: u64,
    pub links: u64,
    pub triangles: u64,
    pub area: f64,
}

impl TeamScore {
    pub fn beacons(&self) -> f64 {
        self.beacons as f64
    }

    pub fn links(&self) -> f64 {
        self.links as f64
    }

    pub fn triangles(&self) -> f64 {
        self.triangles as f64
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn value(&self, score: ScoreType) -> f64 {
        let accessor: fn(&TeamScore) -> f64 = match score {
            ScoreType::Area => TeamScore::area,
            ScoreType::Beacons => TeamScore::beacons,
            ScoreType::Links => TeamScore::links,
            ScoreType::Triangles => TeamScore::triangles,
        };
        accessor(self)
    }

    fn matches(&self, other: &TeamScore) -> Option<(ScoreType, f64, f64)> {
        ScoreType::ALL.into_iter().find_map(|t| {
            let (cached, actual) = (self.value(t), other.value(t));
            ((cached - actual).abs() > AREA_TOLERANCE).then_some((t, cached, actual))
        })
    }
}

/// Score caches. Every counter must equal a recount over the graph and its
/// registered triangles.
#[derive(Debug, Clone, Default)]
pub struct TerritoryScorer {
    scores: BTreeMap<TeamId, TeamScore>,
}

impl TerritoryScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_teams<'a>(teams: impl IntoIterator<Item = &'a TeamId>) -> Self {
        let mut scorer = Self::new();
        for team in teams {
            scorer.scores.entry(team.clone()).or_default();
        }
        scorer
    }

    fn entry(&mut self, team: &TeamId) -> &mut TeamScore {
        self.scores.entry(team.clone()).or_default()
    }

    pub fn apply(&mut self, event: &GraphEvent) {
        match event {
            GraphEvent::BeaconOwnerChanged { from, to, .. } => {
                if let Some(team) = from {
                    let score = self.entry(team);
                    score.beacons = score.beacons.saturating_sub(1);
                }
                if let Some(team) = to {
                    self.entry(team).beacons += 1;
                }
            }
            GraphEvent::LinkAdded { team, .. } => self.entry(team).links += 1,
            GraphEvent::LinkRemoved { team, .. } => {
                let score = self.entry(team);
                score.links = score.links.saturating_sub(1);
            }
            GraphEvent::TriangleFormed(triangle) => {
                let score = self.entry(&triangle.team);
                score.triangles += 1;
                score.area += triangle.area;
            }
            GraphEvent::TriangleDestroyed(triangle) => {
                let score = self.entry(&triangle.team);
                score.triangles = score.triangles.saturating_sub(1);
                score.area = (score.area - triangle.area).max(0.0);
            }
        }
    }

    pub fn apply_all<'a>(&mut self, events: impl IntoIterator<Item = &'a GraphEvent>) {
        for event in events {
            self.apply(event);
        }
    }

    pub fn score(&self, team: &TeamId) -> TeamScore {
        self.scores.get(team).copied().unwrap_or_default()
    }

    pub fn value(&self, team: &TeamId, score: ScoreType) -> f64 {
        self.score(team).value(score)
    }

    pub fn teams(&self) -> impl Iterator<Item = &TeamId> {
        self.scores.keys()
    }

    pub fn scores(&self) -> &BTreeMap<TeamId, TeamScore> {
        &self.scores
    }

    /// True once the team's counter reaches the threshold.
    pub fn check_goal(&self, team: &TeamId, score: ScoreType, threshold: f64) -> bool {
        self.value(team, score) >= threshold
    }

    /// Pure recount of one team over the graph.
    pub fn tally(team: &TeamId, graph: &BeaconGraph) -> TeamScore {
        let beacons = graph
            .beacons()
            .filter(|b| b.owner() == Some(team))
            .count() as u64;
        let links = graph.links().filter(|(_, _, t)| *t == team).count() as u64;
        let (triangles, area) = graph
            .triangles()
            .owned_by(team)
            .fold((0u64, 0.0f64), |(n, sum), t| (n + 1, sum + t.area));
        TeamScore {
            beacons,
            links,
            triangles,
            area,
        }
    }

    /// Overwrites a team's cache, as when loading a stored snapshot.
    pub fn seed(&mut self, team: &TeamId, score: TeamScore) {
        self.scores.insert(team.clone(), score);
    }

    pub fn recompute(&mut self, team: &TeamId, graph: &BeaconGraph) {
        let tally = Self::tally(team, graph);
        self.scores.insert(team.clone(), tally);
    }

    /// Recounts every known team plus any team found owning graph state.
    pub fn recompute_all(&mut self, graph: &BeaconGraph) {
        let mut teams: Vec<TeamId> = self.scores.keys().cloned().collect();
        teams.extend(graph.beacons().filter_map(|b| b.owner().cloned()));
        teams.extend(graph.links().map(|(_, _, t)| t.clone()));
        teams.sort();
        teams.dedup();
        for team in teams {
            self.recompute(&team, graph);
        }
    }

    pub fn verify(&self, graph: &BeaconGraph) -> Result<(), InvariantViolation> {
        for (team, cached) in &self.scores {
            if let Some((score, cached, actual)) = cached.matches(&Self::tally(team, graph)) {
                return Err(InvariantViolation::ScoreDrift {
                    team: team.clone(),
                    score,
                    cached,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Team with the highest strictly positive value; earlier teams win ties.
    pub fn front_runner<'a>(
        &self,
        score: ScoreType,
        order: impl IntoIterator<Item = &'a TeamId>,
    ) -> Option<TeamId> {
        let mut best: Option<(&TeamId, f64)> = None;
        for team in order {
            let value = self.value(team, score);
            if value > best.map(|(_, v)| v).unwrap_or(0.0) {
                best = Some((team, value));
            }
        }
        best.map(|(team, _)| team.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::territory::graph::LinkPolicy;

    #[test]
    fn score_type_parses_case_insensitively() {
        assert_eq!("AREA".parse::<ScoreType>(), Ok(ScoreType::Area));
        assert_eq!(" links ".parse::<ScoreType>(), Ok(ScoreType::Links));
        assert!("gold".parse::<ScoreType>().is_err());
    }

    #[test]
    fn incremental_matches_tally() {
        let red = TeamId::new("red");
        let mut graph = BeaconGraph::new(LinkPolicy::default());
        let mut scorer = TerritoryScorer::with_teams([&red]);
        let mut ids = Vec::new();
        for (x, z) in [(0.0, 0.0), (10.0, 0.0), (5.0, 10.0)] {
            let (id, events) = graph.add_beacon(Point::new(x, z), Some(red.clone()));
            scorer.apply_all(&events);
            ids.push(id);
        }
        for (a, b) in [(0, 1), (1, 2), (2, 0)] {
            let result = graph.try_link(ids[a], ids[b], &red);
            scorer.apply_all(&result.events);
        }
        let score = scorer.score(&red);
        assert_eq!(score.beacons, 3);
        assert_eq!(score.links, 3);
        assert_eq!(score.triangles, 1);
        assert_eq!(score.area, 50.0);
        assert!(scorer.verify(&graph).is_ok());
        assert!(scorer.check_goal(&red, ScoreType::Area, 50.0));
        assert!(!scorer.check_goal(&red, ScoreType::Triangles, 2.0));
    }

    #[test]
    fn drift_is_detected_and_healed() {
        let red = TeamId::new("red");
        let mut graph = BeaconGraph::new(LinkPolicy::default());
        graph.add_beacon(Point::new(0.0, 0.0), Some(red.clone()));
        let mut scorer = TerritoryScorer::with_teams([&red]);
        assert!(matches!(
            scorer.verify(&graph),
            Err(InvariantViolation::ScoreDrift {
                score: ScoreType::Beacons,
                ..
            })
        ));
        scorer.recompute(&red, &graph);
        assert!(scorer.verify(&graph).is_ok());
    }

    #[test]
    fn front_runner_needs_positive_score() {
        let red = TeamId::new("red");
        let blue = TeamId::new("blue");
        let mut scorer = TerritoryScorer::with_teams([&red, &blue]);
        assert_eq!(scorer.front_runner(ScoreType::Links, [&red, &blue]), None);
        scorer.apply(&GraphEvent::LinkAdded {
            a: crate::territory::BeaconId::new(0),
            b: crate::territory::BeaconId::new(1),
            team: blue.clone(),
        });
        assert_eq!(scorer.front_runner(ScoreType::Links, [&red, &blue]), Some(blue));
    }
}
