//! One running game: its region, beacon graph, scores, teams and clock

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{GameMode, Goal, Settings};
use crate::error::{GameError, InvariantViolation};
use crate::events::Notification;
use crate::geometry::Point;
use crate::persistence::Location;
use crate::region::Region;
use crate::terrain::TerrainQuery;
use crate::territory::{
    BeaconGraph, BeaconId, GraphEvent, LinkPolicy, LinkResult, ScoreType, TeamId, TeamScore,
    TerritoryScorer,
};

/// Opaque player identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameParams {
    pub mode: GameMode,
    pub teams: usize,
    pub goal: Goal,
    pub score_types: Vec<ScoreType>,
    /// Countdown length in seconds; zero runs open-ended.
    pub timer_secs: u64,
}

impl GameParams {
    pub fn defaults(settings: &Settings) -> Self {
        Self::for_mode(settings, settings.game.mode)
    }

    pub fn for_mode(settings: &Settings, mode: GameMode) -> Self {
        let defaults = settings.game.for_mode(mode);
        Self {
            mode,
            teams: settings.game.default_teams,
            goal: defaults.goal,
            score_types: defaults.score_types.clone(),
            timer_secs: defaults.timer_secs,
        }
    }

    pub fn with_teams(mut self, teams: usize) -> Self {
        self.teams = teams.max(1);
        self
    }

    pub fn with_goal(mut self, goal: Goal) -> Self {
        self.goal = goal;
        if !self.score_types.contains(&goal.score) {
            self.score_types.push(goal.score);
        }
        self
    }

    pub fn with_timer(mut self, secs: u64) -> Self {
        self.timer_secs = secs;
        self
    }

    pub fn is_open_ended(&self) -> bool {
        self.timer_secs == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameState {
    Running,
    Paused,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameClock {
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: u64,
    /// Seconds left on a countdown; `None` when open-ended.
    pub remaining_secs: Option<u64>,
}

impl GameClock {
    pub fn start(timer_secs: u64) -> Self {
        Self {
            started_at: Utc::now(),
            elapsed_secs: 0,
            remaining_secs: (timer_secs > 0).then_some(timer_secs),
        }
    }

    /// Advances the clock; true when a countdown has just run out.
    fn advance(&mut self, secs: u64) -> bool {
        self.elapsed_secs += secs;
        match self.remaining_secs.as_mut() {
            Some(remaining) if *remaining > 0 => {
                *remaining = remaining.saturating_sub(secs);
                *remaining == 0
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRoster {
    pub id: TeamId,
    pub spawn: Location,
    pub players: BTreeSet<PlayerId>,
}

/// Unit offsets (x, z) for team spawns, north being negative z.
const SPAWN_DIRECTIONS: [(i32, i32); 8] = [
    (0, -1),
    (0, 1),
    (1, 0),
    (-1, 0),
    (1, -1),
    (-1, -1),
    (1, 1),
    (-1, 1),
];

fn team_names(settings: &Settings, count: usize) -> Vec<TeamId> {
    (0..count.max(1))
        .map(|i| match settings.game.teams.get(i) {
            Some(name) => TeamId::new(name.clone()),
            None => TeamId::new(format!("team{}", i + 1)),
        })
        .collect()
}

/// Spawn point of the team at `index`, a quarter game distance from the
/// region centre, standing on the terrain surface.
pub fn spawn_point(
    region: &Region,
    index: usize,
    game_distance: u32,
    world: &str,
    terrain: &dyn TerrainQuery,
) -> Location {
    let (dx, dz) = SPAWN_DIRECTIONS[index % SPAWN_DIRECTIONS.len()];
    let reach = (game_distance / 4) as i32;
    let (cx, cz) = region.center().block();
    let (x, z) = (cx + dx * reach, cz + dz * reach);
    Location::new(world, x, terrain.highest_solid_y(x, z) + 1, z)
}

pub struct Game {
    name: String,
    region: Region,
    params: GameParams,
    graph: BeaconGraph,
    scorer: TerritoryScorer,
    teams: Vec<TeamRoster>,
    clock: GameClock,
    state: GameState,
    clear_on_recapture: bool,
    goals_announced: BTreeSet<TeamId>,
    outbox: Vec<Notification>,
}

impl Game {
    pub fn new(
        name: impl Into<String>,
        region: Region,
        params: GameParams,
        settings: &Settings,
        terrain: &dyn TerrainQuery,
    ) -> Self {
        let teams = params.teams;
        let params = params.with_teams(teams);
        let teams = team_names(settings, params.teams)
            .into_iter()
            .enumerate()
            .map(|(i, id)| TeamRoster {
                spawn: spawn_point(
                    &region,
                    i,
                    settings.world.game_distance,
                    &settings.world.name,
                    terrain,
                ),
                id,
                players: BTreeSet::new(),
            })
            .collect::<Vec<_>>();
        let scorer = TerritoryScorer::with_teams(teams.iter().map(|t| &t.id));
        Self {
            name: name.into(),
            region,
            clock: GameClock::start(params.timer_secs),
            params,
            graph: BeaconGraph::new(LinkPolicy::from(&settings.links)),
            scorer,
            teams,
            state: GameState::Running,
            clear_on_recapture: settings.links.clear_on_recapture,
            goals_announced: BTreeSet::new(),
            outbox: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn params(&self) -> &GameParams {
        &self.params
    }

    pub fn graph(&self) -> &BeaconGraph {
        &self.graph
    }

    pub(crate) fn graph_mut(&mut self) -> &mut BeaconGraph {
        &mut self.graph
    }

    pub fn scorer(&self) -> &TerritoryScorer {
        &self.scorer
    }

    pub fn score(&self, team: &TeamId) -> TeamScore {
        self.scorer.score(team)
    }

    pub fn clock(&self) -> &GameClock {
        &self.clock
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == GameState::Running
    }

    pub fn teams(&self) -> &[TeamRoster] {
        &self.teams
    }

    pub fn team_ids(&self) -> impl Iterator<Item = &TeamId> {
        self.teams.iter().map(|t| &t.id)
    }

    pub fn contains(&self, point: Point) -> bool {
        self.region.contains(point)
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.outbox)
    }

    /// Exact name first, then the first team whose name starts with `name`,
    /// ignoring case.
    pub fn find_team(&self, name: &str) -> Option<&TeamRoster> {
        let wanted = name.to_lowercase();
        self.teams
            .iter()
            .find(|t| t.id.as_str().to_lowercase() == wanted)
            .or_else(|| {
                self.teams
                    .iter()
                    .find(|t| t.id.as_str().to_lowercase().starts_with(&wanted))
            })
    }

    fn has_team(&self, team: &TeamId) -> bool {
        self.teams.iter().any(|t| &t.id == team)
    }

    fn require_team(&self, team: &TeamId) -> Result<(), GameError> {
        if self.has_team(team) {
            Ok(())
        } else {
            Err(GameError::UnknownTeam(team.to_string()))
        }
    }

    fn ensure_running(&self) -> Result<(), GameError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(GameError::NotRunning(self.name.clone()))
        }
    }

    pub fn team_of(&self, player: &PlayerId) -> Option<&TeamId> {
        self.teams
            .iter()
            .find(|t| t.players.contains(player))
            .map(|t| &t.id)
    }

    /// Puts the player on the smallest team, earlier teams winning ties.
    /// Players already on a team stay there.
    pub fn assign_player(&mut self, player: PlayerId) -> Option<TeamId> {
        if let Some(team) = self.team_of(&player) {
            return Some(team.clone());
        }
        let roster = self.teams.iter_mut().min_by_key(|t| t.players.len())?;
        roster.players.insert(player.clone());
        info!(game = %self.name, %player, team = %roster.id, "player joined");
        Some(roster.id.clone())
    }

    pub fn move_player(&mut self, player: &PlayerId, team: &TeamId) -> Result<(), GameError> {
        self.require_team(team)?;
        self.remove_player(player);
        for roster in &mut self.teams {
            if &roster.id == team {
                roster.players.insert(player.clone());
            }
        }
        Ok(())
    }

    pub fn remove_player(&mut self, player: &PlayerId) -> bool {
        self.teams
            .iter_mut()
            .fold(false, |removed, t| t.players.remove(player) || removed)
    }

    pub fn spawn_of(&self, team: &TeamId) -> Option<&Location> {
        self.teams.iter().find(|t| &t.id == team).map(|t| &t.spawn)
    }

    pub fn set_spawn(&mut self, team: &TeamId, spawn: Location) -> Result<(), GameError> {
        let roster = self
            .teams
            .iter_mut()
            .find(|t| &t.id == team)
            .ok_or_else(|| GameError::UnknownTeam(team.to_string()))?;
        roster.spawn = spawn;
        Ok(())
    }

    /// Plants a beacon, or returns the one already standing at `point`.
    pub fn place_beacon(&mut self, point: Point, owner: Option<TeamId>) -> Result<BeaconId, GameError> {
        self.ensure_running()?;
        if !self.contains(point) {
            return Err(GameError::OutsideGameRegion { x: point.x, z: point.z });
        }
        if let Some(team) = &owner {
            self.require_team(team)?;
        }
        if let Some(existing) = self.graph.beacon_at(point) {
            return Ok(existing.id());
        }
        let (id, events) = self.graph.add_beacon(point, owner);
        self.apply(&events);
        Ok(id)
    }

    /// Gives a beacon to `team`. Its links survive unless the game clears
    /// them on recapture.
    pub fn capture(&mut self, beacon: BeaconId, team: &TeamId) -> Result<(), GameError> {
        self.ensure_running()?;
        self.require_team(team)?;
        let previous = self
            .graph
            .beacon(beacon)
            .ok_or(GameError::UnknownBeacon(beacon))?
            .owner()
            .cloned();
        if previous.as_ref() == Some(team) {
            return Ok(());
        }
        let mut events = Vec::new();
        if self.clear_on_recapture && previous.is_some() {
            events.extend(self.graph.unlink_all(beacon));
        }
        events.extend(self.graph.set_owner(beacon, Some(team.clone()))?);
        self.apply(&events);
        Ok(())
    }

    /// Loses a beacon: its links go and it becomes uncaptured.
    pub fn release(&mut self, beacon: BeaconId) -> Result<(), GameError> {
        self.ensure_running()?;
        if self.graph.beacon(beacon).is_none() {
            return Err(GameError::UnknownBeacon(beacon));
        }
        let mut events = self.graph.unlink_all(beacon);
        events.extend(self.graph.set_owner(beacon, None)?);
        self.apply(&events);
        Ok(())
    }

    pub fn remove_beacon(&mut self, beacon: BeaconId) -> Result<(), GameError> {
        self.ensure_running()?;
        let events = self.graph.remove_beacon(beacon)?;
        self.apply(&events);
        Ok(())
    }

    /// Attempts a link for `team`. Rule rejections are reported in the
    /// result; only game-level problems are errors.
    pub fn try_link(&mut self, a: BeaconId, b: BeaconId, team: &TeamId) -> Result<LinkResult, GameError> {
        self.ensure_running()?;
        self.require_team(team)?;
        let result = self.graph.try_link(a, b, team);
        match &result.outcome {
            Ok(success) => {
                self.outbox.push(Notification::LinkCreated {
                    game: self.name.clone(),
                    a,
                    b,
                    team: team.clone(),
                    cost: success.cost,
                });
                if !success.triangles_formed.is_empty() {
                    self.outbox.push(Notification::TriangleFormed {
                        game: self.name.clone(),
                        team: team.clone(),
                        count: success.triangles_formed.len(),
                    });
                }
                if success.triangles_failed > 0 {
                    self.outbox.push(Notification::TriangleFailed {
                        game: self.name.clone(),
                        team: team.clone(),
                        count: success.triangles_failed,
                    });
                }
            }
            Err(reason) => self.outbox.push(Notification::LinkRejected {
                game: self.name.clone(),
                a,
                b,
                team: team.clone(),
                reason: reason.clone(),
            }),
        }
        self.apply(&result.events);
        Ok(result)
    }

    /// Removes a link; false if there was none.
    pub fn unlink(&mut self, a: BeaconId, b: BeaconId) -> Result<bool, GameError> {
        self.ensure_running()?;
        let events = self.graph.unlink(a, b);
        let removed = !events.is_empty();
        self.apply(&events);
        Ok(removed)
    }

    fn apply(&mut self, events: &[GraphEvent]) {
        self.scorer.apply_all(events);
        for event in events {
            if let GraphEvent::BeaconOwnerChanged { beacon, to, .. } = event {
                self.outbox.push(Notification::BeaconCaptured {
                    game: self.name.clone(),
                    beacon: *beacon,
                    team: to.clone(),
                });
            }
        }
        self.check_goal();
    }

    /// Announces teams reaching a positive goal. Open-ended games end on the
    /// first one.
    fn check_goal(&mut self) {
        let goal = self.params.goal;
        if goal.value == 0 || !self.is_running() {
            return;
        }
        let reached: Vec<TeamId> = self
            .teams
            .iter()
            .map(|t| &t.id)
            .filter(|t| !self.goals_announced.contains(*t))
            .filter(|t| self.scorer.check_goal(t, goal.score, goal.value as f64))
            .cloned()
            .collect();
        for team in reached {
            self.outbox.push(Notification::GoalReached {
                game: self.name.clone(),
                team: team.clone(),
                score: goal.score,
            });
            self.goals_announced.insert(team);
        }
        if self.params.is_open_ended() && !self.goals_announced.is_empty() {
            self.end();
        }
    }

    /// Team leading on the goal's score type, if any team scored.
    pub fn front_runner(&self) -> Option<TeamId> {
        self.scorer
            .front_runner(self.params.goal.score, self.teams.iter().map(|t| &t.id))
    }

    /// Advances the clock of a running game, ending it when a countdown
    /// expires.
    pub fn tick(&mut self, secs: u64) {
        if !self.is_running() {
            return;
        }
        if self.clock.advance(secs) {
            info!(game = %self.name, "countdown expired");
            self.end();
        }
    }

    pub fn pause(&mut self) {
        if self.state == GameState::Running {
            self.state = GameState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == GameState::Paused {
            self.state = GameState::Running;
        }
    }

    /// Ends the game and reports the winner. Ending twice is a no-op.
    pub fn end(&mut self) -> Option<TeamId> {
        if self.state == GameState::Ended {
            return self.front_runner();
        }
        self.state = GameState::Ended;
        let winner = self.front_runner();
        info!(game = %self.name, winner = ?winner, "game over");
        self.outbox.push(Notification::GameEnded {
            game: self.name.clone(),
            winner: winner.clone(),
        });
        winner
    }

    /// Recounts scores if the caches disagree with the graph.
    pub fn heal(&mut self) -> Option<InvariantViolation> {
        match self.scorer.verify(&self.graph) {
            Ok(()) => None,
            Err(violation) => {
                warn!(game = %self.name, %violation, "score cache drift, recomputing");
                self.scorer.recompute_all(&self.graph);
                Some(violation)
            }
        }
    }

    pub(crate) fn restore_state(
        &mut self,
        clock: GameClock,
        state: GameState,
        rosters: BTreeMap<TeamId, (Location, BTreeSet<PlayerId>)>,
    ) {
        self.clock = clock;
        self.state = state;
        for roster in &mut self.teams {
            if let Some((spawn, players)) = rosters.get(&roster.id) {
                roster.spawn = spawn.clone();
                roster.players = players.clone();
            }
        }
    }

    /// Replaces the score caches with a stored snapshot, as loaded, and
    /// recounts them if they disagree with the graph. Teams already at the
    /// goal by the recounted scores are not announced again.
    pub(crate) fn restore_scores(&mut self, snapshot: &BTreeMap<TeamId, TeamScore>) -> Option<InvariantViolation> {
        let mut scorer = TerritoryScorer::with_teams(self.teams.iter().map(|t| &t.id));
        for (team, score) in snapshot {
            scorer.seed(team, *score);
        }
        self.scorer = scorer;
        let drift = self.heal();
        self.goals_announced = self
            .teams
            .iter()
            .filter(|t| {
                self.params.goal.value > 0
                    && self.scorer.check_goal(&t.id, self.params.goal.score, self.params.goal.value as f64)
            })
            .map(|t| t.id.clone())
            .collect();
        drift
    }
}
